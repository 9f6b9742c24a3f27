//! Configuration options for a prerender run.

use std::fmt;
use std::path::PathBuf;
use std::sync::Arc;

use core_kit::MaxConcurrencyError;
use data_model_kit::{EntryMismatchDetails, HttpErrorDetails, MissingIdDetails};
use serde::{Deserialize, Deserializer};
use url::Url;

use crate::errors::{Error, Result};

/// Default synthetic origin that render requests claim to come from.
pub const DEFAULT_ORIGIN: &str = "http://prerender.local";

/// What to do when the crawl runs into a problem that need not be fatal.
pub enum Policy<D> {
    /// Fail the run with the details as the error.
    Fail,
    /// Log the details and carry on.
    Warn,
    Ignore,
    /// Hand the details to a callback. Returning an error fails the run.
    Custom(Arc<dyn Fn(&D) -> anyhow::Result<()> + Send + Sync>),
}

impl<D> Policy<D> {
    pub fn custom<F>(handler: F) -> Self
    where
        F: Fn(&D) -> anyhow::Result<()> + Send + Sync + 'static,
    {
        Policy::Custom(Arc::new(handler))
    }
}

impl<D: fmt::Display> Policy<D> {
    /// Applies the policy to `details`, building the run's error with `fail` when it is fatal.
    pub(crate) fn handle(&self, details: D, fail: fn(D) -> Error) -> Result<()> {
        match self {
            Policy::Fail => Err(fail(details)),
            Policy::Warn => {
                tracing::warn!("{details}");
                Ok(())
            }
            Policy::Ignore => Ok(()),
            Policy::Custom(handler) => handler(&details).map_err(|cause| Error::Policy(Arc::new(cause))),
        }
    }
}

impl<D> Default for Policy<D> {
    fn default() -> Self {
        Policy::Fail
    }
}

impl<D> Clone for Policy<D> {
    fn clone(&self) -> Self {
        match self {
            Policy::Fail => Policy::Fail,
            Policy::Warn => Policy::Warn,
            Policy::Ignore => Policy::Ignore,
            Policy::Custom(handler) => Policy::Custom(Arc::clone(handler)),
        }
    }
}

impl<D> fmt::Debug for Policy<D> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Policy::Fail => write!(f, "Fail"),
            Policy::Warn => write!(f, "Warn"),
            Policy::Ignore => write!(f, "Ignore"),
            Policy::Custom(_) => write!(f, "Custom(..)"),
        }
    }
}

#[derive(Deserialize)]
#[serde(rename_all = "lowercase")]
enum PolicyName {
    Fail,
    Warn,
    Ignore,
}

// Callbacks can't come from a config file, only the three named policies.
impl<'de, D> Deserialize<'de> for Policy<D> {
    fn deserialize<De: Deserializer<'de>>(deserializer: De) -> std::result::Result<Self, De::Error> {
        Ok(match PolicyName::deserialize(deserializer)? {
            PolicyName::Fail => Policy::Fail,
            PolicyName::Warn => Policy::Warn,
            PolicyName::Ignore => Policy::Ignore,
        })
    }
}

/// Configuration for one prerender run.
#[derive(Debug, Clone, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct PrerenderOptions {
    /// Maximum number of renders in flight at once
    pub concurrency: usize,
    /// Follow links found in rendered HTML
    pub crawl: bool,
    /// Paths to start from. `*` stands for every prerenderable route without parameters.
    pub entries: Vec<String>,
    /// Origin of the synthetic requests handed to the renderer
    pub origin: String,
    /// Path prefix the app is served under, e.g. `/docs`. Empty for the root.
    pub paths_base: String,
    /// Output goes to `<out_dir>/output/prerendered/{pages,dependencies}`
    pub out_dir: PathBuf,
    /// Files served as-is; paths naming them are never rendered
    pub static_dir: Option<PathBuf>,
    /// Prebuilt client assets (relative to the base), never rendered
    pub client_files: Vec<String>,
    pub handle_http_error: Policy<HttpErrorDetails>,
    pub handle_missing_id: Policy<MissingIdDetails>,
    pub handle_entry_generator_mismatch: Policy<EntryMismatchDetails>,
}

impl Default for PrerenderOptions {
    fn default() -> Self {
        Self {
            concurrency: core_kit::common::max_concurrency::DEFAULT,
            crawl: true,
            entries: vec!["*".to_string()],
            origin: DEFAULT_ORIGIN.to_string(),
            paths_base: String::new(),
            out_dir: PathBuf::from("build"),
            static_dir: None,
            client_files: Vec::new(),
            handle_http_error: Policy::Fail,
            handle_missing_id: Policy::Fail,
            handle_entry_generator_mismatch: Policy::Fail,
        }
    }
}

impl PrerenderOptions {
    /// Creates a new builder for PrerenderOptions.
    pub fn builder() -> PrerenderOptionsBuilder {
        PrerenderOptionsBuilder::default()
    }

    /// Applies `PRERENDER_CONCURRENCY` when it is set.
    pub fn with_env_overrides(mut self) -> Result<Self> {
        match core_kit::max_concurrency() {
            Ok(concurrency) => self.concurrency = concurrency,
            Err(MaxConcurrencyError::MissingEnvVar(_)) => {}
            Err(e) => return Err(Error::Config(e.to_string())),
        }
        Ok(self)
    }

    /// Checks the options before a run starts.
    pub fn validate(&self) -> Result<()> {
        if self.concurrency == 0 {
            return Err(Error::Config("concurrency must be at least 1".to_string()));
        }

        let origin = Url::parse(&self.origin).map_err(|e| Error::Config(format!("origin {}: {e}", self.origin)))?;
        if !matches!(origin.scheme(), "http" | "https") || origin.path() != "/" {
            return Err(Error::Config(format!(
                "origin must be an http(s) origin without a path, got {}",
                self.origin
            )));
        }

        if !self.paths_base.is_empty() && (!self.paths_base.starts_with('/') || self.paths_base.ends_with('/')) {
            return Err(Error::Config(format!(
                "paths base must start with / and not end with /, got {}",
                self.paths_base
            )));
        }

        if let Some(entry) = self.entries.iter().find(|entry| *entry != "*" && !entry.starts_with('/')) {
            return Err(Error::Config(format!("entries must be * or start with /, got {entry}")));
        }

        Ok(())
    }
}

/// Builder for PrerenderOptions.
#[derive(Debug, Clone, Default)]
pub struct PrerenderOptionsBuilder {
    concurrency: Option<usize>,
    crawl: Option<bool>,
    entries: Vec<String>,
    origin: Option<String>,
    paths_base: Option<String>,
    out_dir: Option<PathBuf>,
    static_dir: Option<PathBuf>,
    client_files: Vec<String>,
    handle_http_error: Option<Policy<HttpErrorDetails>>,
    handle_missing_id: Option<Policy<MissingIdDetails>>,
    handle_entry_generator_mismatch: Option<Policy<EntryMismatchDetails>>,
}

impl PrerenderOptionsBuilder {
    /// Sets the number of renders in flight at once.
    pub fn concurrency(mut self, concurrency: usize) -> Self {
        self.concurrency = Some(concurrency);
        self
    }

    pub fn crawl(mut self, crawl: bool) -> Self {
        self.crawl = Some(crawl);
        self
    }

    /// Adds an entry path (or `*`). Without any, the run starts from `*`.
    pub fn entry(mut self, entry: impl Into<String>) -> Self {
        self.entries.push(entry.into());
        self
    }

    pub fn entries<I, S>(mut self, entries: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.entries.extend(entries.into_iter().map(Into::into));
        self
    }

    pub fn origin(mut self, origin: impl Into<String>) -> Self {
        self.origin = Some(origin.into());
        self
    }

    pub fn paths_base(mut self, paths_base: impl Into<String>) -> Self {
        self.paths_base = Some(paths_base.into());
        self
    }

    pub fn out_dir(mut self, out_dir: impl Into<PathBuf>) -> Self {
        self.out_dir = Some(out_dir.into());
        self
    }

    pub fn static_dir(mut self, static_dir: impl Into<PathBuf>) -> Self {
        self.static_dir = Some(static_dir.into());
        self
    }

    /// Adds a prebuilt client asset, relative to the paths base.
    pub fn client_file(mut self, file: impl Into<String>) -> Self {
        self.client_files.push(file.into());
        self
    }

    pub fn handle_http_error(mut self, policy: Policy<HttpErrorDetails>) -> Self {
        self.handle_http_error = Some(policy);
        self
    }

    pub fn handle_missing_id(mut self, policy: Policy<MissingIdDetails>) -> Self {
        self.handle_missing_id = Some(policy);
        self
    }

    pub fn handle_entry_generator_mismatch(mut self, policy: Policy<EntryMismatchDetails>) -> Self {
        self.handle_entry_generator_mismatch = Some(policy);
        self
    }

    /// Builds the PrerenderOptions.
    pub fn build(self) -> PrerenderOptions {
        let defaults = PrerenderOptions::default();
        PrerenderOptions {
            concurrency: self.concurrency.unwrap_or(defaults.concurrency),
            crawl: self.crawl.unwrap_or(defaults.crawl),
            entries: if self.entries.is_empty() {
                defaults.entries
            } else {
                self.entries
            },
            origin: self.origin.unwrap_or(defaults.origin),
            paths_base: self.paths_base.unwrap_or(defaults.paths_base),
            out_dir: self.out_dir.unwrap_or(defaults.out_dir),
            static_dir: self.static_dir,
            client_files: self.client_files,
            handle_http_error: self.handle_http_error.unwrap_or_default(),
            handle_missing_id: self.handle_missing_id.unwrap_or_default(),
            handle_entry_generator_mismatch: self.handle_entry_generator_mismatch.unwrap_or_default(),
        }
    }
}
