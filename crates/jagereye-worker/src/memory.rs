//! In-memory container runtime.
//!
//! Keeps containers as plain state and records every call, so lifecycle
//! and command handling can be exercised without a container engine.
//! Individual operations can be made to fail or to stall.

use crate::error::{Result, WorkerError};
use crate::runtime::{ContainerHandle, ContainerInspect, ContainerRuntime, ContainerSpec, ImageCatalog};
use async_trait::async_trait;
use jagereye_error::CommonError;
use jagereye_protocol::WorkerId;
use std::collections::{HashMap, HashSet};
use std::sync::RwLock;
use std::time::Duration;

/// Container operation, as recorded in the call log.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RuntimeOp {
    Create,
    Start,
    Stop,
    Remove,
    Inspect,
}

impl RuntimeOp {
    /// Returns the operation name.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Create => "create",
            Self::Start => "start",
            Self::Stop => "stop",
            Self::Remove => "remove",
            Self::Inspect => "inspect",
        }
    }
}

/// A recorded runtime call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RuntimeCall {
    pub op: RuntimeOp,
    pub id: WorkerId,
}

/// A container held by [`MemoryRuntime`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MemoryContainer {
    pub spec: ContainerSpec,
    pub running: bool,
}

#[derive(Debug, Default)]
struct State {
    images: HashSet<String>,
    containers: HashMap<WorkerId, MemoryContainer>,
    calls: Vec<RuntimeCall>,
    failures: HashSet<RuntimeOp>,
    delays: HashMap<RuntimeOp, Duration>,
}

/// Container runtime and image catalog held in memory.
#[derive(Debug, Default)]
pub struct MemoryRuntime {
    state: RwLock<State>,
}

impl MemoryRuntime {
    /// Creates a runtime with no images.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a runtime that knows the given images.
    #[must_use]
    pub fn with_images<I, S>(images: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let runtime = Self::new();
        for image in images {
            runtime.add_image(image);
        }
        runtime
    }

    /// Registers an image.
    pub fn add_image(&self, image: impl Into<String>) {
        if let Ok(mut state) = self.state.write() {
            state.images.insert(image.into());
        }
    }

    /// Makes every call of `op` fail until [`clear_faults`](Self::clear_faults).
    pub fn fail(&self, op: RuntimeOp) {
        if let Ok(mut state) = self.state.write() {
            state.failures.insert(op);
        }
    }

    /// Makes every call of `op` wait `delay` before doing anything.
    pub fn delay(&self, op: RuntimeOp, delay: Duration) {
        if let Ok(mut state) = self.state.write() {
            state.delays.insert(op, delay);
        }
    }

    /// Removes injected failures and delays.
    pub fn clear_faults(&self) {
        if let Ok(mut state) = self.state.write() {
            state.failures.clear();
            state.delays.clear();
        }
    }

    /// Returns the container of a worker.
    #[must_use]
    pub fn container(&self, id: &WorkerId) -> Option<MemoryContainer> {
        self.state.read().ok()?.containers.get(id).cloned()
    }

    /// Returns the number of containers.
    #[must_use]
    pub fn container_count(&self) -> usize {
        self.state
            .read()
            .map(|s| s.containers.len())
            .unwrap_or_default()
    }

    /// Returns every container call made so far, oldest first.
    #[must_use]
    pub fn calls(&self) -> Vec<RuntimeCall> {
        self.state.read().map(|s| s.calls.clone()).unwrap_or_default()
    }

    /// Returns the operations called for one worker, oldest first.
    #[must_use]
    pub fn ops_for(&self, id: &WorkerId) -> Vec<RuntimeOp> {
        self.calls()
            .into_iter()
            .filter(|c| &c.id == id)
            .map(|c| c.op)
            .collect()
    }

    /// Logs the call, then applies any injected delay or failure.
    async fn enter(&self, op: RuntimeOp, id: &WorkerId) -> Result<()> {
        let (delay, fail) = {
            let mut state = self.lock()?;
            state.calls.push(RuntimeCall {
                op,
                id: id.clone(),
            });
            (state.delays.get(&op).copied(), state.failures.contains(&op))
        };

        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }
        if fail {
            return Err(WorkerError::runtime(
                op.as_str(),
                id.as_str(),
                CommonError::internal("injected failure"),
            ));
        }
        Ok(())
    }

    fn lock(&self) -> Result<std::sync::RwLockWriteGuard<'_, State>> {
        self.state
            .write()
            .map_err(|_| CommonError::internal("lock poisoned").into())
    }

    fn missing(op: RuntimeOp, id: &WorkerId) -> WorkerError {
        WorkerError::runtime(
            op.as_str(),
            id.as_str(),
            CommonError::not_found(format!("no such container: {id}")),
        )
    }
}

#[async_trait]
impl ContainerRuntime for MemoryRuntime {
    async fn create_container(&self, spec: &ContainerSpec) -> Result<ContainerHandle> {
        self.enter(RuntimeOp::Create, &spec.id).await?;
        let mut state = self.lock()?;

        if !state.images.contains(&spec.image) {
            return Err(WorkerError::runtime(
                "create",
                spec.id.as_str(),
                CommonError::not_found(format!("no such image: {}", spec.image)),
            ));
        }
        if state.containers.contains_key(&spec.id) {
            return Err(WorkerError::runtime(
                "create",
                spec.id.as_str(),
                CommonError::invalid_state("container name already in use"),
            ));
        }

        state.containers.insert(
            spec.id.clone(),
            MemoryContainer {
                spec: spec.clone(),
                running: false,
            },
        );
        Ok(ContainerHandle {
            engine_id: spec.id.to_string(),
        })
    }

    async fn start_container(&self, id: &WorkerId) -> Result<()> {
        self.enter(RuntimeOp::Start, id).await?;
        let mut state = self.lock()?;
        let container = state
            .containers
            .get_mut(id)
            .ok_or_else(|| Self::missing(RuntimeOp::Start, id))?;
        container.running = true;
        Ok(())
    }

    async fn stop_container(&self, id: &WorkerId) -> Result<()> {
        self.enter(RuntimeOp::Stop, id).await?;
        let mut state = self.lock()?;
        let container = state
            .containers
            .get_mut(id)
            .ok_or_else(|| Self::missing(RuntimeOp::Stop, id))?;
        container.running = false;
        Ok(())
    }

    async fn remove_container(&self, id: &WorkerId) -> Result<()> {
        self.enter(RuntimeOp::Remove, id).await?;
        self.lock()?.containers.remove(id);
        Ok(())
    }

    async fn inspect(&self, id: &WorkerId) -> Result<ContainerInspect> {
        self.enter(RuntimeOp::Inspect, id).await?;
        let state = self.lock()?;
        let container = state
            .containers
            .get(id)
            .ok_or_else(|| Self::missing(RuntimeOp::Inspect, id))?;
        Ok(ContainerInspect {
            running: container.running,
        })
    }
}

#[async_trait]
impl ImageCatalog for MemoryRuntime {
    async fn image_exists(&self, image: &str) -> Result<bool> {
        Ok(self.lock()?.images.contains(image))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::runtime::ContainerTemplate;

    fn spec(id: &WorkerId) -> ContainerSpec {
        ContainerTemplate::new("/tmp").spec(id, "tripwire")
    }

    #[tokio::test]
    async fn test_container_lifecycle() {
        let runtime = MemoryRuntime::with_images(["tripwire"]);
        let id = WorkerId::generate();

        runtime.create_container(&spec(&id)).await.unwrap();
        assert!(!runtime.inspect(&id).await.unwrap().running);

        runtime.start_container(&id).await.unwrap();
        assert!(runtime.inspect(&id).await.unwrap().running);

        runtime.stop_container(&id).await.unwrap();
        assert!(!runtime.container(&id).unwrap().running);

        runtime.remove_container(&id).await.unwrap();
        assert!(runtime.container(&id).is_none());
        // Already gone.
        runtime.remove_container(&id).await.unwrap();
    }

    #[tokio::test]
    async fn test_restart_running_stops_first() {
        let runtime = MemoryRuntime::with_images(["tripwire"]);
        let id = WorkerId::generate();
        runtime.create_container(&spec(&id)).await.unwrap();
        runtime.start_container(&id).await.unwrap();

        runtime.restart_container(&id).await.unwrap();

        assert_eq!(
            runtime.ops_for(&id),
            vec![
                RuntimeOp::Create,
                RuntimeOp::Start,
                RuntimeOp::Inspect,
                RuntimeOp::Stop,
                RuntimeOp::Start
            ]
        );
        assert!(runtime.container(&id).unwrap().running);
    }

    #[tokio::test]
    async fn test_restart_stopped_only_starts() {
        let runtime = MemoryRuntime::with_images(["tripwire"]);
        let id = WorkerId::generate();
        runtime.create_container(&spec(&id)).await.unwrap();

        runtime.restart_container(&id).await.unwrap();

        assert_eq!(
            runtime.ops_for(&id),
            vec![RuntimeOp::Create, RuntimeOp::Inspect, RuntimeOp::Start]
        );
    }

    #[tokio::test]
    async fn test_unknown_image_and_duplicate_name() {
        let runtime = MemoryRuntime::with_images(["tripwire"]);
        let id = WorkerId::generate();

        let mut other = spec(&id);
        other.image = "missing".to_string();
        assert!(runtime.create_container(&other).await.unwrap_err().is_runtime());

        runtime.create_container(&spec(&id)).await.unwrap();
        assert!(runtime.create_container(&spec(&id)).await.is_err());
    }

    #[tokio::test]
    async fn test_injected_failure() {
        let runtime = MemoryRuntime::with_images(["tripwire"]);
        let id = WorkerId::generate();
        runtime.fail(RuntimeOp::Create);

        let err = runtime.create_container(&spec(&id)).await.unwrap_err();
        assert!(err.is_runtime());
        assert_eq!(runtime.container_count(), 0);

        runtime.clear_faults();
        runtime.create_container(&spec(&id)).await.unwrap();
    }

    #[tokio::test]
    async fn test_image_catalog() {
        let runtime = MemoryRuntime::with_images(["tripwire"]);
        assert!(runtime.image_exists("tripwire").await.unwrap());
        assert!(!runtime.image_exists("intrusion").await.unwrap());
        assert!(runtime.calls().is_empty());
    }
}
