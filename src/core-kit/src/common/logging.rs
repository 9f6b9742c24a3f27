use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

/// Sets the logging (tracing) level using RUST_LOG, falling back to the supplied default log settings.
///
/// Only the first call installs a subscriber; later calls are no-ops.
pub fn setup_logging(default_log_settings: &str) {
    let installed = tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| default_log_settings.into()))
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .try_init();
    if installed.is_err() {
        tracing::trace!("Global tracing subscriber already installed; keeping it.");
    }
}
