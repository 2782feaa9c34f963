//! Error types for bus operations.

use jagereye_error::CommonError;
use jagereye_protocol::ProtocolError;
use thiserror::Error;

/// Result type alias for bus operations.
pub type Result<T> = std::result::Result<T, BusError>;

/// Errors that can occur during bus operations.
#[derive(Debug, Error)]
pub enum BusError {
    /// Common errors (not found, internal, etc.).
    #[error(transparent)]
    Common(#[from] CommonError),

    /// Could not connect to the bus server.
    #[error("connect failed: {0}")]
    Connect(String),

    /// Publishing to a subject failed.
    #[error("publish to {subject} failed: {message}")]
    Publish { subject: String, message: String },

    /// Subscribing to a subject failed.
    #[error("subscribe to {subject} failed: {message}")]
    Subscribe { subject: String, message: String },

    /// A message could not be encoded.
    #[error(transparent)]
    Protocol(#[from] ProtocolError),
}

impl BusError {
    /// Creates a new publish error.
    #[must_use]
    pub fn publish(subject: impl Into<String>, message: impl ToString) -> Self {
        Self::Publish {
            subject: subject.into(),
            message: message.to_string(),
        }
    }

    /// Creates a new subscribe error.
    #[must_use]
    pub fn subscribe(subject: impl Into<String>, message: impl ToString) -> Self {
        Self::Subscribe {
            subject: subject.into(),
            message: message.to_string(),
        }
    }
}
