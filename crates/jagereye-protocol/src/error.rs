//! Protocol decoding errors.

use crate::reply::ErrorCode;
use thiserror::Error;

/// Result type alias for protocol operations.
pub type Result<T> = std::result::Result<T, ProtocolError>;

/// Errors raised while encoding or decoding bus messages.
#[derive(Debug, Error)]
pub enum ProtocolError {
    /// The body is not a valid message envelope.
    #[error("malformed message: {0}")]
    Malformed(#[from] serde_json::Error),

    /// The envelope names a command this side does not know.
    #[error("unsupported command: {0}")]
    UnsupportedCommand(String),

    /// The command is known but its params do not match.
    #[error("invalid params for {command}: {source}")]
    InvalidParams {
        command: String,
        #[source]
        source: serde_json::Error,
    },
}

impl ProtocolError {
    /// Returns the wire error code reported for this failure.
    ///
    /// Every decoding failure is a validation error and maps to
    /// `NON_SUPPORTED_CMD`.
    #[must_use]
    pub const fn error_code(&self) -> ErrorCode {
        ErrorCode::NonSupportedCmd
    }
}
