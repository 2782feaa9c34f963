//! Resource manager wiring.

use crate::admission::{Admission, AlwaysAdmit, CapacityAdmission};
use crate::config::Config;
use crate::error::{ResMgrError, Result};
use crate::processor::CommandProcessor;
use jagereye_bus::{Bus, MemoryBus};
use jagereye_worker::{
    ContainerRuntime, ImageCatalog, LifecycleManager, MemoryRuntime, MemoryStatusStore,
    StatusStore,
};
use std::sync::Arc;
use tokio::sync::oneshot;
use tokio::task::JoinHandle;

/// Connections the resource manager runs on.
#[derive(Clone)]
pub struct Backends {
    pub bus: Arc<dyn Bus>,
    pub store: Arc<dyn StatusStore>,
    pub runtime: Arc<dyn ContainerRuntime>,
    pub catalog: Arc<dyn ImageCatalog>,
}

impl Backends {
    /// In-process backends that know the given worker images.
    pub fn in_memory<I, S>(images: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let runtime = Arc::new(MemoryRuntime::with_images(images));
        Self {
            bus: Arc::new(MemoryBus::new()),
            store: Arc::new(MemoryStatusStore::new()),
            runtime: runtime.clone(),
            catalog: runtime,
        }
    }

    /// Connects to NATS, Redis and the local Docker engine.
    ///
    /// # Errors
    ///
    /// Returns an error if any of them is unreachable.
    #[cfg(all(feature = "nats", feature = "redis", feature = "docker"))]
    pub async fn connect(config: &Config) -> Result<Self> {
        let bus = jagereye_bus::NatsBus::connect(&config.bus.url).await?;
        let store = jagereye_worker::RedisStatusStore::connect(&config.store.url)
            .await?
            .with_prefix(config.store.key_prefix.clone());
        let docker = Arc::new(jagereye_worker::DockerRuntime::connect(config.docker_options()).await?);

        Ok(Self {
            bus: Arc::new(bus),
            store: Arc::new(store),
            runtime: docker.clone(),
            catalog: docker,
        })
    }
}

impl std::fmt::Debug for Backends {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Backends").finish_non_exhaustive()
    }
}

/// The resource manager service.
#[derive(Debug, Clone)]
pub struct ResourceManager {
    processor: CommandProcessor,
}

impl ResourceManager {
    /// Wires a resource manager from configuration and backends.
    #[must_use]
    pub fn new(config: &Config, backends: Backends) -> Self {
        let lifecycle = LifecycleManager::new(
            backends.store,
            backends.runtime,
            config.container_template(),
        );
        let admission: Arc<dyn Admission> = match config.admission.max_workers {
            Some(max) => Arc::new(CapacityAdmission::new(max)),
            None => Arc::new(AlwaysAdmit),
        };
        let processor = CommandProcessor::new(backends.bus, lifecycle, backends.catalog)
            .with_admission(admission)
            .with_capabilities(config.capabilities)
            .with_subjects(&config.bus.command_subject, &config.bus.reply_subject);

        Self { processor }
    }

    /// Returns the command processor.
    #[must_use]
    pub const fn processor(&self) -> &CommandProcessor {
        &self.processor
    }

    /// Serves commands until `shutdown` resolves.
    ///
    /// # Errors
    ///
    /// Returns an error if the command subscription fails.
    pub async fn run(&self, shutdown: impl std::future::Future<Output = ()>) -> Result<()> {
        self.processor.run(shutdown).await
    }

    /// Subscribes to commands and serves them on a background task.
    ///
    /// Commands published after this returns are handled.
    ///
    /// # Errors
    ///
    /// Returns an error if the command subscription fails.
    pub async fn start(&self) -> Result<RunningManager> {
        let subscription = self.processor.subscribe().await?;
        let (stop, stopped) = oneshot::channel::<()>();
        let processor = self.processor.clone();
        let task = tokio::spawn(async move {
            processor
                .serve(subscription, async move {
                    let _ = stopped.await;
                })
                .await;
        });

        Ok(RunningManager { stop, task })
    }
}

/// A resource manager serving on a background task.
#[derive(Debug)]
pub struct RunningManager {
    stop: oneshot::Sender<()>,
    task: JoinHandle<()>,
}

impl RunningManager {
    /// Stops intake and waits for in-flight commands to finish.
    ///
    /// # Errors
    ///
    /// Returns an error if the serving task panicked.
    pub async fn stop(self) -> Result<()> {
        let _ = self.stop.send(());
        self.task
            .await
            .map_err(|e| ResMgrError::Common(jagereye_error::CommonError::internal(e.to_string())))
    }
}
