//! Common error types for jagereye.
//!
//! This crate provides the error variants shared by the bus, worker and
//! resource-manager crates so that each of them can wrap a single common
//! type instead of redefining lookup, state and timeout failures.
//!
//! # Crate-Specific Errors
//!
//! ```rust,ignore
//! use jagereye_error::CommonError;
//! use thiserror::Error;
//!
//! #[derive(Debug, Error)]
//! pub enum MyError {
//!     #[error(transparent)]
//!     Common(#[from] CommonError),
//!
//!     #[error("my specific error: {0}")]
//!     Specific(String),
//! }
//! ```

mod common;

pub use common::CommonError;

/// Result type alias using `CommonError`.
pub type Result<T> = std::result::Result<T, CommonError>;
