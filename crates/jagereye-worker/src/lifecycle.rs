//! Worker lifecycle manager.
//!
//! Drives the status store and the container runtime together. Each
//! operation writes the pre-state, calls the runtime, then writes the
//! post-state; nothing is retried here.
//!
//! ```text
//!   ∅ ──▶ CREATING ──▶ RUNNING ──▶ (deleted)
//!            │           ↺ restart
//!            └──▶ FAILED ──────────▶ (deleted)
//! ```

use crate::error::Result;
use crate::runtime::{ContainerRuntime, ContainerTemplate};
use crate::status::StatusStore;
use jagereye_error::CommonError;
use jagereye_protocol::{WorkerId, WorkerStatus};
use std::sync::Arc;

/// Creates, restarts and removes workers.
#[derive(Clone)]
pub struct LifecycleManager {
    store: Arc<dyn StatusStore>,
    runtime: Arc<dyn ContainerRuntime>,
    template: ContainerTemplate,
}

impl LifecycleManager {
    /// Creates a lifecycle manager.
    pub fn new(
        store: Arc<dyn StatusStore>,
        runtime: Arc<dyn ContainerRuntime>,
        template: ContainerTemplate,
    ) -> Self {
        Self {
            store,
            runtime,
            template,
        }
    }

    /// Returns the current status of a worker.
    ///
    /// # Errors
    ///
    /// Returns an error if the status store fails.
    pub async fn status(&self, id: &WorkerId) -> Result<Option<WorkerStatus>> {
        Ok(self.store.get(id).await?.map(|r| r.status))
    }

    /// Creates and starts the container of a new worker.
    ///
    /// Writes `CREATING`, then `RUNNING` once the container runs. On a
    /// runtime failure the worker is marked `FAILED` and the error returned.
    /// If the worker was removed while its container was being created,
    /// the container is torn down again and no status is written.
    ///
    /// # Errors
    ///
    /// Returns an error if the runtime or the status store fails.
    pub async fn create(&self, id: &WorkerId, image: &str) -> Result<()> {
        self.store.set_status(id, WorkerStatus::Creating).await?;
        tracing::debug!(worker_id = %id, image, "worker creating");

        let spec = self.template.spec(id, image);
        let launched = async {
            self.runtime.create_container(&spec).await?;
            self.runtime.start_container(id).await
        }
        .await;

        if let Err(e) = launched {
            tracing::error!(worker_id = %id, image, error = %e, "worker creation failed");
            if let Err(store_err) = self.advance(id, WorkerStatus::Failed).await {
                tracing::warn!(worker_id = %id, error = %store_err, "failed to mark worker as failed");
            }
            return Err(e);
        }

        if !self.advance(id, WorkerStatus::Running).await? {
            tracing::warn!(worker_id = %id, "worker removed during creation, tearing down container");
            if let Err(e) = self.runtime.remove_container(id).await {
                tracing::warn!(worker_id = %id, error = %e, "failed to tear down container");
            }
            return Err(CommonError::invalid_state(format!("worker {id} removed during creation")).into());
        }

        tracing::info!(worker_id = %id, image, "worker running");
        Ok(())
    }

    /// Restarts the container of an existing worker and marks it `RUNNING`.
    ///
    /// # Errors
    ///
    /// Returns a not found error if the worker has no status record, an
    /// invalid state error if it cannot return to `RUNNING` or was removed
    /// while restarting, or the runtime error.
    pub async fn restart(&self, id: &WorkerId) -> Result<()> {
        let current = self
            .store
            .get(id)
            .await?
            .ok_or_else(|| CommonError::not_found(format!("worker {id}")))?
            .status;

        if !current.can_transition_to(WorkerStatus::Running) {
            return Err(CommonError::invalid_state(format!(
                "cannot restart worker {id} in state {current}"
            ))
            .into());
        }

        self.runtime.restart_container(id).await.inspect_err(|e| {
            tracing::error!(worker_id = %id, error = %e, "worker restart failed");
        })?;

        if !self.advance(id, WorkerStatus::Running).await? {
            tracing::warn!(worker_id = %id, "worker removed during restart");
            return Err(CommonError::invalid_state(format!("worker {id} removed during restart")).into());
        }
        tracing::info!(worker_id = %id, "worker restarted");
        Ok(())
    }

    /// Force-removes the container of a worker and deletes its record.
    ///
    /// Removing an unknown or already removed worker succeeds. Returns the
    /// status the worker had before removal, or `None` if this call did not
    /// delete the record itself (it was absent, or a concurrent removal got
    /// there first).
    ///
    /// # Errors
    ///
    /// Returns an error if the runtime or the status store fails; the
    /// record is kept when the runtime fails.
    pub async fn remove(&self, id: &WorkerId) -> Result<Option<WorkerStatus>> {
        let previous = self.status(id).await?;
        if previous.is_none() {
            tracing::debug!(worker_id = %id, "removing worker without status record");
        }

        self.runtime.remove_container(id).await.inspect_err(|e| {
            tracing::error!(worker_id = %id, error = %e, "worker removal failed");
        })?;
        let deleted = self.store.delete(id).await?;
        let previous = previous.filter(|_| deleted);

        tracing::info!(worker_id = %id, previous = ?previous, "worker removed");
        Ok(previous)
    }

    /// Writes `next` if the worker still has a record that may move to it.
    ///
    /// Returns whether the write happened.
    async fn advance(&self, id: &WorkerId, next: WorkerStatus) -> Result<bool> {
        let Some(record) = self.store.get(id).await? else {
            return Ok(false);
        };
        if !record.status.can_transition_to(next) {
            tracing::warn!(worker_id = %id, from = %record.status, to = %next, "illegal status transition skipped");
            return Ok(false);
        }
        self.store.set_status(id, next).await?;
        Ok(true)
    }
}

impl std::fmt::Debug for LifecycleManager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LifecycleManager")
            .field("template", &self.template)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::WorkerError;
    use crate::memory::{MemoryRuntime, RuntimeOp};
    use crate::status::MemoryStatusStore;
    use std::time::Duration;

    const IMAGE: &str = "jagereye/worker_tripwire";

    struct Fixture {
        store: Arc<MemoryStatusStore>,
        runtime: Arc<MemoryRuntime>,
        manager: LifecycleManager,
    }

    fn fixture() -> Fixture {
        let store = Arc::new(MemoryStatusStore::new());
        let runtime = Arc::new(MemoryRuntime::with_images([IMAGE]));
        let manager = LifecycleManager::new(
            store.clone(),
            runtime.clone(),
            ContainerTemplate::new("/tmp"),
        );
        Fixture {
            store,
            runtime,
            manager,
        }
    }

    #[tokio::test]
    async fn test_create_marks_running() {
        let f = fixture();
        let id = WorkerId::generate();

        f.manager.create(&id, IMAGE).await.unwrap();

        assert_eq!(
            f.store.history(&id),
            vec![WorkerStatus::Creating, WorkerStatus::Running]
        );
        assert!(f.runtime.container(&id).unwrap().running);
        assert_eq!(f.runtime.ops_for(&id), vec![RuntimeOp::Create, RuntimeOp::Start]);
    }

    #[tokio::test]
    async fn test_create_failure_marks_failed() {
        let f = fixture();
        let id = WorkerId::generate();
        f.runtime.fail(RuntimeOp::Start);

        let err = f.manager.create(&id, IMAGE).await.unwrap_err();

        assert!(err.is_runtime());
        assert_eq!(
            f.store.history(&id),
            vec![WorkerStatus::Creating, WorkerStatus::Failed]
        );
        assert_eq!(f.manager.status(&id).await.unwrap(), Some(WorkerStatus::Failed));
    }

    #[tokio::test]
    async fn test_restart_running_worker() {
        let f = fixture();
        let id = WorkerId::generate();
        f.manager.create(&id, IMAGE).await.unwrap();

        f.manager.restart(&id).await.unwrap();

        assert_eq!(
            f.store.history(&id),
            vec![
                WorkerStatus::Creating,
                WorkerStatus::Running,
                WorkerStatus::Running
            ]
        );
        assert_eq!(
            f.runtime.ops_for(&id)[2..],
            [RuntimeOp::Inspect, RuntimeOp::Stop, RuntimeOp::Start]
        );
    }

    #[tokio::test]
    async fn test_restart_unknown_worker() {
        let f = fixture();
        let id = WorkerId::generate();

        let err = f.manager.restart(&id).await.unwrap_err();

        assert!(err.is_not_found());
        assert!(f.runtime.calls().is_empty());
    }

    #[tokio::test]
    async fn test_restart_failed_worker_is_rejected() {
        let f = fixture();
        let id = WorkerId::generate();
        f.store.set_status(&id, WorkerStatus::Failed).await.unwrap();

        let err = f.manager.restart(&id).await.unwrap_err();

        assert!(matches!(err, WorkerError::Common(CommonError::InvalidState(_))));
        assert_eq!(f.manager.status(&id).await.unwrap(), Some(WorkerStatus::Failed));
    }

    #[tokio::test]
    async fn test_restart_runtime_failure_keeps_status() {
        let f = fixture();
        let id = WorkerId::generate();
        f.manager.create(&id, IMAGE).await.unwrap();
        f.runtime.fail(RuntimeOp::Inspect);

        assert!(f.manager.restart(&id).await.unwrap_err().is_runtime());
        assert_eq!(f.store.history(&id).len(), 2);
    }

    #[tokio::test]
    async fn test_remove_deletes_record() {
        let f = fixture();
        let id = WorkerId::generate();
        f.manager.create(&id, IMAGE).await.unwrap();

        let previous = f.manager.remove(&id).await.unwrap();

        assert_eq!(previous, Some(WorkerStatus::Running));
        assert_eq!(f.manager.status(&id).await.unwrap(), None);
        assert!(f.runtime.container(&id).is_none());
    }

    #[tokio::test]
    async fn test_remove_twice_succeeds() {
        let f = fixture();
        let id = WorkerId::generate();
        f.manager.create(&id, IMAGE).await.unwrap();

        f.manager.remove(&id).await.unwrap();
        let previous = f.manager.remove(&id).await.unwrap();

        assert_eq!(previous, None);
        assert_eq!(
            f.runtime.ops_for(&id).iter().filter(|op| **op == RuntimeOp::Remove).count(),
            2
        );
    }

    #[tokio::test]
    async fn test_remove_runtime_failure_keeps_record() {
        let f = fixture();
        let id = WorkerId::generate();
        f.manager.create(&id, IMAGE).await.unwrap();
        f.runtime.fail(RuntimeOp::Remove);

        assert!(f.manager.remove(&id).await.unwrap_err().is_runtime());
        assert_eq!(f.manager.status(&id).await.unwrap(), Some(WorkerStatus::Running));
    }

    #[tokio::test]
    async fn test_remove_failed_worker() {
        let f = fixture();
        let id = WorkerId::generate();
        f.runtime.fail(RuntimeOp::Start);
        let _ = f.manager.create(&id, IMAGE).await;
        f.runtime.clear_faults();

        assert_eq!(f.manager.remove(&id).await.unwrap(), Some(WorkerStatus::Failed));
        assert_eq!(f.manager.status(&id).await.unwrap(), None);
    }

    #[tokio::test(start_paused = true)]
    async fn test_concurrent_removes_report_previous_once() {
        let f = fixture();
        let id = WorkerId::generate();
        f.manager.create(&id, IMAGE).await.unwrap();
        f.runtime.delay(RuntimeOp::Remove, Duration::from_millis(50));

        let (a, b) = tokio::join!(f.manager.remove(&id), f.manager.remove(&id));
        let mut previous = vec![a.unwrap(), b.unwrap()];
        previous.sort_by_key(Option::is_some);

        assert_eq!(previous, vec![None, Some(WorkerStatus::Running)]);
        assert_eq!(f.manager.status(&id).await.unwrap(), None);
    }

    /// Runtime whose restart completes only after the worker's record was
    /// deleted, as when a removal finishes while the container restarts.
    struct RemovedWhileRestarting {
        inner: Arc<MemoryRuntime>,
        store: Arc<MemoryStatusStore>,
    }

    #[async_trait::async_trait]
    impl ContainerRuntime for RemovedWhileRestarting {
        async fn create_container(
            &self,
            spec: &crate::runtime::ContainerSpec,
        ) -> Result<crate::runtime::ContainerHandle> {
            self.inner.create_container(spec).await
        }

        async fn start_container(&self, id: &WorkerId) -> Result<()> {
            self.inner.start_container(id).await?;
            self.store.delete(id).await?;
            Ok(())
        }

        async fn stop_container(&self, id: &WorkerId) -> Result<()> {
            self.inner.stop_container(id).await
        }

        async fn remove_container(&self, id: &WorkerId) -> Result<()> {
            self.inner.remove_container(id).await
        }

        async fn inspect(&self, id: &WorkerId) -> Result<crate::runtime::ContainerInspect> {
            self.inner.inspect(id).await
        }
    }

    #[tokio::test]
    async fn test_restart_does_not_revive_removed_worker() {
        let f = fixture();
        let id = WorkerId::generate();
        f.manager.create(&id, IMAGE).await.unwrap();

        let manager = LifecycleManager::new(
            f.store.clone(),
            Arc::new(RemovedWhileRestarting {
                inner: f.runtime.clone(),
                store: f.store.clone(),
            }),
            ContainerTemplate::new("/tmp"),
        );
        let err = manager.restart(&id).await.unwrap_err();

        assert!(matches!(err, WorkerError::Common(CommonError::InvalidState(_))));
        assert_eq!(f.manager.status(&id).await.unwrap(), None);
        assert_eq!(
            f.store.history(&id),
            vec![
                WorkerStatus::Creating,
                WorkerStatus::Running,
                WorkerStatus::Removed
            ]
        );
    }

    #[tokio::test(start_paused = true)]
    async fn test_remove_during_creation_is_not_undone() {
        let f = fixture();
        let id = WorkerId::generate();
        f.runtime.delay(RuntimeOp::Start, Duration::from_millis(50));

        let creating = {
            let manager = f.manager.clone();
            let id = id.clone();
            tokio::spawn(async move { manager.create(&id, IMAGE).await })
        };
        tokio::time::sleep(Duration::from_millis(10)).await;
        f.manager.remove(&id).await.unwrap();

        assert!(creating.await.unwrap().is_err());
        assert_eq!(f.manager.status(&id).await.unwrap(), None);
        assert_eq!(
            f.store.history(&id),
            vec![WorkerStatus::Creating, WorkerStatus::Removed]
        );
        assert!(f.runtime.container(&id).is_none());
    }
}
