//! Error types for route compilation, route resolution and the developer CLI.

use thiserror::Error;

/// Main error type for the functional core.
#[derive(Debug, Error)]
pub enum Error {
    /// The route identifier is malformed. Always fatal: raised while building, never while matching.
    #[error("Invalid route {id}: {reason}")]
    InvalidRoute { id: String, reason: String },

    /// A required parameter was not supplied when resolving a route identifier into a path.
    #[error("Missing parameter '{name}' in route {id}")]
    MissingParameter { id: String, name: String },

    /// A parameter value would produce an invalid path when substituted.
    #[error("Parameter '{name}' in route {id} cannot start or end with a slash -- this would cause an invalid route like foo//bar")]
    InvalidParameter { id: String, name: String },

    /// A route references a param matcher that was never registered.
    #[error("Route {id} references unknown matcher '{matcher}'")]
    UnknownMatcher { id: String, matcher: String },

    /// A pathname or parameter value contains percent escapes that don't decode to UTF-8.
    #[error("Invalid percent-encoding in '{0}'")]
    InvalidEncoding(String),

    /// Regex error
    #[error("Regex error: {0}")]
    RegexError(#[from] regex::Error),

    /// io Errors occur when the CLI reads input files.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl Error {
    pub(crate) fn invalid_route(id: &str, reason: impl Into<String>) -> Self {
        Error::InvalidRoute {
            id: id.to_string(),
            reason: reason.into(),
        }
    }
}

/// Type alias for Result with the core Error.
pub type Result<T> = std::result::Result<T, Error>;
