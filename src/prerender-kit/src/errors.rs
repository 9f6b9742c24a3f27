use std::sync::Arc;

use core_kit::QueueError;
use data_model_kit::{EntryMismatchDetails, HttpErrorDetails, MissingIdDetails};
use thiserror::Error;

/// Everything that can end a prerender run.
///
/// Clone so that a task's failure can reach both its own handle and the queue's completion.
#[derive(Debug, Clone, Error)]
pub enum Error {
    /// The renderer itself failed for `path`.
    #[error("Failed to render {path}: {cause}")]
    Render { path: String, cause: Arc<anyhow::Error> },

    #[error("{0}")]
    HttpError(HttpErrorDetails),

    #[error("{0}")]
    MissingId(MissingIdDetails),

    #[error("{0}")]
    EntryGeneratorMismatch(EntryMismatchDetails),

    /// Routes marked `prerender = true` that the crawl never reached.
    #[error(
        "The following routes were marked as prerenderable, but were not prerendered because they were not found while crawling your app:\n{}",
        bullet_list(.0)
    )]
    NotPrerendered(Vec<String>),

    #[error("{message}: {cause}")]
    Io { message: String, cause: Arc<std::io::Error> },

    /// A custom policy callback escalated.
    #[error("{0}")]
    Policy(Arc<anyhow::Error>),

    #[error("Invalid route: {0}")]
    Route(String),

    #[error("Prerender queue failed: {0}")]
    Queue(String),

    #[error("Invalid prerender configuration: {0}")]
    Config(String),
}

impl Error {
    pub(crate) fn io(message: impl Into<String>, cause: std::io::Error) -> Self {
        Error::Io {
            message: message.into(),
            cause: Arc::new(cause),
        }
    }
}

impl From<core_kit::Error> for Error {
    fn from(error: core_kit::Error) -> Self {
        Self::Route(error.to_string())
    }
}

impl From<QueueError<Error>> for Error {
    fn from(error: QueueError<Error>) -> Self {
        match error {
            QueueError::Task(err) => err,
            other => Self::Queue(other.to_string()),
        }
    }
}

fn bullet_list(items: &[String]) -> String {
    items.iter().map(|item| format!("  - {item}")).collect::<Vec<_>>().join("\n")
}

pub type Result<T> = std::result::Result<T, Error>;
