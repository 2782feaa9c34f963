//! # jagereye-worker
//!
//! Worker lifecycle for the resource manager.
//!
//! - [`StatusStore`]: one `{status}` record per worker (memory or Redis)
//! - [`ContainerRuntime`] / [`ImageCatalog`]: container engine seam
//!   (memory or Docker)
//! - [`LifecycleManager`]: create, restart and remove on top of both
//!
//! ```text
//! ┌──────────────────────────────────────────┐
//! │             LifecycleManager             │
//! └──────────┬─────────────────────┬─────────┘
//!            ▼                     ▼
//!   ┌────────────────┐    ┌──────────────────┐
//!   │  StatusStore   │    │ ContainerRuntime │
//!   │ memory | redis │    │ memory | docker  │
//!   └────────────────┘    └──────────────────┘
//! ```

#![warn(clippy::all, clippy::pedantic, clippy::nursery)]
#![allow(clippy::module_name_repetitions)]

#[cfg(feature = "docker")]
pub mod docker;
pub mod error;
pub mod lifecycle;
pub mod memory;
#[cfg(feature = "redis")]
pub mod redis_store;
pub mod runtime;
pub mod status;

#[cfg(feature = "docker")]
pub use docker::{DockerOptions, DockerRuntime};
pub use error::{Result, WorkerError};
pub use lifecycle::LifecycleManager;
pub use memory::{MemoryRuntime, RuntimeCall, RuntimeOp};
#[cfg(feature = "redis")]
pub use redis_store::RedisStatusStore;
pub use runtime::{
    BindMount, ContainerHandle, ContainerInspect, ContainerRuntime, ContainerSpec,
    ContainerTemplate, ImageCatalog, LogConfig, SyslogTarget,
};
pub use status::{KEY_PREFIX, MemoryStatusStore, StatusStore, worker_key};
