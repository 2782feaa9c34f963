//! Shared harness for resource manager integration tests.

#![allow(dead_code)]

use jagereye_bus::MemoryBus;
use jagereye_protocol::{WorkerId, WorkerStatus};
use jagereye_resmgr::{Backends, Config, ResourceClient, ResourceManager, RunningManager};
use jagereye_worker::{MemoryRuntime, MemoryStatusStore, StatusStore};
use std::sync::Arc;
use tokio::time::Duration;

pub const IMAGE: &str = "jagereye/worker_tripwire";

/// A resource manager on in-memory backends, plus handles to inspect them.
pub struct Harness {
    pub bus: MemoryBus,
    pub store: Arc<MemoryStatusStore>,
    pub runtime: Arc<MemoryRuntime>,
    pub client: ResourceClient,
    running: RunningManager,
}

impl Harness {
    /// Starts a resource manager with `config`.
    pub async fn start(config: Config) -> Self {
        let bus = MemoryBus::new();
        let store = Arc::new(MemoryStatusStore::new());
        let runtime = Arc::new(MemoryRuntime::with_images([IMAGE]));

        let backends = Backends {
            bus: Arc::new(bus.clone()),
            store: store.clone(),
            runtime: runtime.clone(),
            catalog: runtime.clone(),
        };
        let running = ResourceManager::new(&config, backends)
            .start()
            .await
            .expect("Failed to start resource manager");
        let client = ResourceClient::new(Arc::new(bus.clone()));

        Self {
            bus,
            store,
            runtime,
            client,
            running,
        }
    }

    /// Starts a resource manager with the default configuration.
    pub async fn with_defaults() -> Self {
        Self::start(Config::default()).await
    }

    /// Waits until the worker's status equals `expected` (`None` = no record).
    pub async fn wait_for_status(&self, id: &WorkerId, expected: Option<WorkerStatus>) {
        for _ in 0..200 {
            let current = self.store.get(id).await.unwrap().map(|r| r.status);
            if current == expected {
                return;
            }
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
        panic!("worker {id} never reached {expected:?}");
    }

    /// Stops the resource manager, waiting for in-flight work.
    pub async fn stop(self) {
        self.running.stop().await.unwrap();
    }
}

/// Returns true if `history` is a legal sequence of worker statuses.
pub fn is_legal_history(history: &[WorkerStatus]) -> bool {
    history.first() == Some(&WorkerStatus::Creating)
        && history.windows(2).all(|w| w[0].can_transition_to(w[1]))
}
