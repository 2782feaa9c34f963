//! # jagereye-protocol
//!
//! Messages exchanged between the brain (control plane) and the resource
//! manager over the publish/subscribe bus.
//!
//! ```text
//!   brain ──── ch_brain_res ────▶ resource manager
//!     ▲   { command, params, ticketId? }      │
//!     │                                       │
//!     └──── reply subject / ch_res_brain ◀────┘
//!         { command, params, ticketId?, response | error }
//! ```
//!
//! Requests travel as the loosely typed [`Request`] envelope so that a reply
//! can always echo exactly what was received. [`Command`] is the closed,
//! strongly typed view decoded from it.

#![warn(clippy::all, clippy::pedantic, clippy::nursery)]
#![allow(clippy::module_name_repetitions)]

pub mod channel;
pub mod command;
pub mod error;
pub mod reply;
pub mod request;
pub mod worker;

pub use channel::{
    CH_BRAIN_TO_RES, CH_RES_TO_BRAIN, DEFAULT_REQUEST_TIMEOUT, REMOVE_REQUEST_TIMEOUT,
};
pub use command::{
    Command, CommandKind, CreateWorkerParams, RemoveWorkerParams, RestartWorkersParams,
};
pub use error::{ProtocolError, Result};
pub use reply::{
    CreateWorkerResponse, ErrorCode, RemoveWorkerResponse, Reply, ReplyError, ReplyOutcome,
    RestartWorkersResponse,
};
pub use request::Request;
pub use worker::{WorkerId, WorkerRecord, WorkerStatus};
