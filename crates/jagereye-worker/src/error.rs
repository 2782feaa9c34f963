//! Error types for worker operations.

use jagereye_error::CommonError;
use thiserror::Error;

/// Result type alias for worker operations.
pub type Result<T> = std::result::Result<T, WorkerError>;

/// Boxed cause of a runtime failure.
pub type BoxError = Box<dyn std::error::Error + Send + Sync + 'static>;

/// Errors that can occur during worker operations.
#[derive(Debug, Error)]
pub enum WorkerError {
    /// Common errors (not found, invalid state, etc.).
    #[error(transparent)]
    Common(#[from] CommonError),

    /// The container engine failed or did not answer in time.
    #[error("runtime error: {operation} {id}: {source}")]
    Runtime {
        operation: &'static str,
        id: String,
        #[source]
        source: BoxError,
    },

    /// The status store failed.
    #[error("status store error: {0}")]
    Store(String),

    /// A status record could not be encoded or decoded.
    #[error("status record codec error: {0}")]
    Codec(#[from] serde_json::Error),
}

impl WorkerError {
    /// Creates a runtime error for `operation` on container `id`.
    #[must_use]
    pub fn runtime(operation: &'static str, id: impl Into<String>, source: impl Into<BoxError>) -> Self {
        Self::Runtime {
            operation,
            id: id.into(),
            source: source.into(),
        }
    }

    /// Creates a status store error.
    #[must_use]
    pub fn store(message: impl ToString) -> Self {
        Self::Store(message.to_string())
    }

    /// Returns true if this is a not found error.
    #[must_use]
    pub const fn is_not_found(&self) -> bool {
        matches!(self, Self::Common(e) if e.is_not_found())
    }

    /// Returns true if this is a runtime error.
    #[must_use]
    pub const fn is_runtime(&self) -> bool {
        matches!(self, Self::Runtime { .. })
    }
}
