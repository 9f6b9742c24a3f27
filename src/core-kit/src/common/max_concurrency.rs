use std::env::VarError;
use std::num::ParseIntError;

/// Environment variable that overrides how many renders run at once.
pub const ENV_VAR: &str = "PRERENDER_CONCURRENCY";

/// The default maximum concurrency value.
pub const DEFAULT: usize = 1;

/// Retrieves the value of the environment variable as a usize for max concurrency.
/// Uses `usize` because the value bounds a task queue's in-flight count.
pub fn max_concurrency() -> Result<usize, MaxConcurrencyError> {
    let raw = std::env::var(ENV_VAR)?;
    parse_concurrency(&raw)
}

/// Parses a concurrency value. Zero is rejected: a queue that can run nothing never drains.
pub fn parse_concurrency(raw: &str) -> Result<usize, MaxConcurrencyError> {
    match raw.trim().parse::<usize>()? {
        0 => Err(MaxConcurrencyError::NonPositive),
        v => Ok(v),
    }
}

#[derive(Debug)]
pub enum MaxConcurrencyError {
    ParseIntError(ParseIntError),
    NonPositive,
    MissingEnvVar(VarError),
}

impl std::error::Error for MaxConcurrencyError {}

impl From<ParseIntError> for MaxConcurrencyError {
    fn from(error: ParseIntError) -> Self {
        Self::ParseIntError(error)
    }
}

impl From<VarError> for MaxConcurrencyError {
    fn from(error: VarError) -> Self {
        Self::MissingEnvVar(error)
    }
}

impl std::fmt::Display for MaxConcurrencyError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> Result<(), std::fmt::Error> {
        match self {
            Self::ParseIntError(e) => write!(f, "Failed to parse {} as an integer: {}", ENV_VAR, e),
            Self::NonPositive => write!(f, "{} must be a positive number", ENV_VAR),
            Self::MissingEnvVar(e) => write!(f, "Environment variable {} is missing: {}", ENV_VAR, e),
        }
    }
}
