//! Common error types shared across jagereye crates.

use thiserror::Error;

/// Common errors that occur across multiple jagereye crates.
///
/// Crate-specific errors wrap this type with `#[from]`.
#[derive(Debug, Error)]
pub enum CommonError {
    /// Resource not found.
    ///
    /// Used when a worker, container or image does not exist.
    #[error("not found: {0}")]
    NotFound(String),

    /// Invalid state transition.
    ///
    /// An operation was attempted on a worker whose lifecycle state does
    /// not allow it (for example restarting a removed worker).
    #[error("invalid state: {0}")]
    InvalidState(String),

    /// Operation timeout.
    #[error("timeout: {0}")]
    Timeout(String),

    /// Internal error.
    #[error("internal error: {0}")]
    Internal(String),
}

impl CommonError {
    /// Creates a new not found error.
    #[must_use]
    pub fn not_found(resource: impl Into<String>) -> Self {
        Self::NotFound(resource.into())
    }

    /// Creates a new invalid state error.
    #[must_use]
    pub fn invalid_state(msg: impl Into<String>) -> Self {
        Self::InvalidState(msg.into())
    }

    /// Creates a new timeout error.
    #[must_use]
    pub fn timeout(msg: impl Into<String>) -> Self {
        Self::Timeout(msg.into())
    }

    /// Creates a new internal error.
    #[must_use]
    pub fn internal(msg: impl Into<String>) -> Self {
        Self::Internal(msg.into())
    }

    /// Returns true if this is a not found error.
    #[must_use]
    pub const fn is_not_found(&self) -> bool {
        matches!(self, Self::NotFound(_))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_not_found_error() {
        let err = CommonError::not_found("worker worker_abc");
        assert!(err.is_not_found());
        assert_eq!(err.to_string(), "not found: worker worker_abc");
    }

    #[test]
    fn test_timeout_error() {
        let err = CommonError::timeout("docker stop after 30s");
        assert!(!err.is_not_found());
        assert_eq!(err.to_string(), "timeout: docker stop after 30s");
    }

    #[test]
    fn test_invalid_state_error() {
        let err = CommonError::invalid_state("worker already removed");
        assert_eq!(err.to_string(), "invalid state: worker already removed");
    }
}
