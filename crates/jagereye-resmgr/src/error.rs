//! Error types for the resource manager.

use jagereye_bus::BusError;
use jagereye_error::CommonError;
use jagereye_protocol::ProtocolError;
use jagereye_worker::WorkerError;
use thiserror::Error;

/// Result type alias for resource manager operations.
pub type Result<T> = std::result::Result<T, ResMgrError>;

/// Errors that can occur in the resource manager.
#[derive(Debug, Error)]
pub enum ResMgrError {
    /// Common errors.
    #[error(transparent)]
    Common(#[from] CommonError),

    /// Bus error.
    #[error("bus error: {0}")]
    Bus(#[from] BusError),

    /// Worker lifecycle error.
    #[error("worker error: {0}")]
    Worker(#[from] WorkerError),

    /// Message encoding error.
    #[error("protocol error: {0}")]
    Protocol(#[from] ProtocolError),

    /// Configuration could not be loaded.
    #[error("configuration error: {0}")]
    Config(Box<figment::Error>),
}

impl From<figment::Error> for ResMgrError {
    fn from(err: figment::Error) -> Self {
        Self::Config(Box::new(err))
    }
}
