pub mod logging;
pub mod max_concurrency;

pub use logging::setup_logging;
pub use max_concurrency::{MaxConcurrencyError, max_concurrency, parse_concurrency};
