//! # jagereye-resmgr
//!
//! The resource manager: receives worker commands from the brain over the
//! bus, runs them against the container engine and the status store, and
//! replies.
//!
//! ```text
//!  ResourceClient ──▶ Bus ──▶ CommandProcessor ──▶ LifecycleManager
//!        ▲                          │                 │          │
//!        │                          ▼                 ▼          ▼
//!        └──────── replies ◀─── Admission      StatusStore  ContainerRuntime
//! ```
//!
//! Commands are `CREATE_WORKER`, `RESTART_WORKERS` and `REMOVE_WORKER`.
//! Creation replies `CREATING` immediately and finishes in the background;
//! restart is fire-and-forget unless restart replies are enabled; removal
//! always replies.

#![warn(clippy::all, clippy::pedantic, clippy::nursery)]
#![allow(clippy::module_name_repetitions)]

pub mod admission;
pub mod client;
pub mod config;
pub mod error;
pub mod manager;
pub mod processor;

pub use admission::{Admission, AlwaysAdmit, CapacityAdmission};
pub use client::ResourceClient;
pub use config::{Capabilities, Config};
pub use error::{ResMgrError, Result};
pub use manager::{Backends, ResourceManager, RunningManager};
pub use processor::CommandProcessor;
