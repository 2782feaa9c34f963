//! Docker container runtime (via bollard).

use crate::error::{Result, WorkerError};
use crate::runtime::{ContainerHandle, ContainerInspect, ContainerRuntime, ContainerSpec, ImageCatalog};
use async_trait::async_trait;
use bollard::Docker;
use bollard::container::{
    Config, CreateContainerOptions, InspectContainerOptions, RemoveContainerOptions,
    StartContainerOptions, StopContainerOptions,
};
use bollard::errors::Error as DockerError;
use bollard::models::{HostConfig, HostConfigLogConfig};
use jagereye_error::CommonError;
use jagereye_protocol::WorkerId;
use std::future::Future;
use std::time::Duration;

/// Docker settings for worker containers.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DockerOptions {
    /// Network mode, e.g. `host`.
    pub network_mode: Option<String>,
    /// OCI runtime, e.g. `nvidia` for GPU workers.
    pub gpu_runtime: Option<String>,
    /// Grace period before a stopping container is killed.
    pub stop_timeout: Duration,
    /// Upper bound on any single engine call.
    pub operation_timeout: Duration,
}

impl Default for DockerOptions {
    fn default() -> Self {
        Self {
            network_mode: Some("host".to_string()),
            gpu_runtime: Some("nvidia".to_string()),
            stop_timeout: Duration::from_secs(10),
            operation_timeout: Duration::from_secs(30),
        }
    }
}

/// Container runtime backed by the local Docker engine.
#[derive(Debug, Clone)]
pub struct DockerRuntime {
    docker: Docker,
    options: DockerOptions,
}

impl DockerRuntime {
    /// Connects to the local Docker engine and checks that it answers.
    ///
    /// # Errors
    ///
    /// Returns a runtime error if the engine is unreachable.
    pub async fn connect(options: DockerOptions) -> Result<Self> {
        let docker = Docker::connect_with_local_defaults()
            .map_err(|e| WorkerError::runtime("connect", "docker", e))?;
        let runtime = Self { docker, options };

        runtime
            .bounded("ping", "docker", runtime.docker.ping())
            .await?;

        tracing::info!(
            network_mode = ?runtime.options.network_mode,
            gpu_runtime = ?runtime.options.gpu_runtime,
            "Docker runtime initialized"
        );
        Ok(runtime)
    }

    /// Runs one engine call under the operation timeout.
    async fn bounded<T, F>(&self, operation: &'static str, id: &str, call: F) -> Result<T>
    where
        F: Future<Output = std::result::Result<T, DockerError>> + Send,
    {
        match tokio::time::timeout(self.options.operation_timeout, call).await {
            Ok(Ok(value)) => Ok(value),
            Ok(Err(e)) => Err(WorkerError::runtime(operation, id, e)),
            Err(_) => Err(WorkerError::runtime(
                operation,
                id,
                CommonError::timeout(format!(
                    "no answer from Docker within {:?}",
                    self.options.operation_timeout
                )),
            )),
        }
    }

    fn host_config(&self, spec: &ContainerSpec) -> HostConfig {
        HostConfig {
            binds: Some(spec.mounts.iter().map(|m| m.to_bind()).collect()),
            network_mode: self.options.network_mode.clone(),
            runtime: self.options.gpu_runtime.clone(),
            log_config: spec.log.as_ref().map(|log| HostConfigLogConfig {
                typ: Some(log.driver.clone()),
                config: Some(log.options.clone()),
            }),
            ..Default::default()
        }
    }
}

const fn is_not_found(err: &DockerError) -> bool {
    matches!(
        err,
        DockerError::DockerResponseServerError {
            status_code: 404,
            ..
        }
    )
}

#[async_trait]
impl ContainerRuntime for DockerRuntime {
    async fn create_container(&self, spec: &ContainerSpec) -> Result<ContainerHandle> {
        let options = CreateContainerOptions {
            name: spec.id.to_string(),
            platform: None,
        };
        let config = Config {
            image: Some(spec.image.clone()),
            env: Some(spec.env_pairs()),
            host_config: Some(self.host_config(spec)),
            ..Default::default()
        };

        let created = self
            .bounded(
                "create",
                spec.id.as_str(),
                self.docker.create_container(Some(options), config),
            )
            .await?;

        for warning in &created.warnings {
            tracing::warn!(worker_id = %spec.id, warning = %warning, "Docker create warning");
        }
        Ok(ContainerHandle {
            engine_id: created.id,
        })
    }

    async fn start_container(&self, id: &WorkerId) -> Result<()> {
        self.bounded(
            "start",
            id.as_str(),
            self.docker
                .start_container(id.as_str(), None::<StartContainerOptions<String>>),
        )
        .await
    }

    async fn stop_container(&self, id: &WorkerId) -> Result<()> {
        let options = StopContainerOptions {
            t: i64::try_from(self.options.stop_timeout.as_secs()).unwrap_or(i64::MAX),
        };
        self.bounded(
            "stop",
            id.as_str(),
            self.docker.stop_container(id.as_str(), Some(options)),
        )
        .await
    }

    async fn remove_container(&self, id: &WorkerId) -> Result<()> {
        let options = RemoveContainerOptions {
            force: true,
            ..Default::default()
        };
        self.bounded("remove", id.as_str(), async {
            match self.docker.remove_container(id.as_str(), Some(options)).await {
                Err(e) if is_not_found(&e) => {
                    tracing::debug!(worker_id = %id, "container already gone");
                    Ok(())
                }
                other => other,
            }
        })
        .await
    }

    async fn inspect(&self, id: &WorkerId) -> Result<ContainerInspect> {
        let info = self
            .bounded(
                "inspect",
                id.as_str(),
                self.docker
                    .inspect_container(id.as_str(), None::<InspectContainerOptions>),
            )
            .await?;

        let running = info
            .state
            .and_then(|state| state.running)
            .unwrap_or(false);
        Ok(ContainerInspect { running })
    }
}

#[async_trait]
impl ImageCatalog for DockerRuntime {
    async fn image_exists(&self, image: &str) -> Result<bool> {
        self.bounded("inspect_image", image, async {
            match self.docker.inspect_image(image).await {
                Ok(_) => Ok(true),
                Err(e) if is_not_found(&e) => Ok(false),
                Err(e) => Err(e),
            }
        })
        .await
    }
}
