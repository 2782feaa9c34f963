//! Container runtime seam.
//!
//! Workers run as containers named after their worker id, so every
//! operation after creation addresses the container by [`WorkerId`].

use crate::error::Result;
use async_trait::async_trait;
use jagereye_protocol::WorkerId;
use std::collections::HashMap;
use std::path::PathBuf;

/// Directory name shared between the host and every worker.
pub const SHARED_DIR_NAME: &str = "jagereye_shared";

/// Mount point of the shared directory inside worker containers.
pub const CONTAINER_SHARED_DIR: &str = "/root/jagereye_shared";

/// Host directory bind-mounted into a container.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BindMount {
    pub host: PathBuf,
    pub container: String,
}

impl BindMount {
    /// Renders the mount in `host:container` form.
    #[must_use]
    pub fn to_bind(&self) -> String {
        format!("{}:{}", self.host.display(), self.container)
    }
}

/// Container log driver and its options.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LogConfig {
    pub driver: String,
    pub options: HashMap<String, String>,
}

/// Remote syslog endpoint that worker output is forwarded to.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SyslogTarget {
    pub host: String,
    pub port: u16,
    pub facility: String,
}

impl SyslogTarget {
    /// Builds the syslog log driver config for one worker.
    #[must_use]
    pub fn log_config(&self, id: &WorkerId) -> LogConfig {
        let options = HashMap::from([
            (
                "syslog-address".to_string(),
                format!("udp://{}:{}", self.host, self.port),
            ),
            ("syslog-facility".to_string(), self.facility.clone()),
            // Log collectors key on this exact tag format.
            ("tag".to_string(), format!("{id} - thrid-party pid:")),
        ]);
        LogConfig {
            driver: "syslog".to_string(),
            options,
        }
    }
}

/// What to create for one worker.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ContainerSpec {
    /// Worker id, also the container name.
    pub id: WorkerId,
    /// Image to run.
    pub image: String,
    /// `KEY=value` pairs.
    pub env: Vec<(String, String)>,
    pub mounts: Vec<BindMount>,
    pub log: Option<LogConfig>,
}

impl ContainerSpec {
    /// Renders the environment in `KEY=value` form.
    #[must_use]
    pub fn env_pairs(&self) -> Vec<String> {
        self.env.iter().map(|(k, v)| format!("{k}={v}")).collect()
    }
}

/// Host settings applied to every worker container.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ContainerTemplate {
    /// Host directory that holds [`SHARED_DIR_NAME`].
    pub shared_root: PathBuf,
    /// Where the shared directory appears inside the container.
    pub container_shared_dir: String,
    pub syslog: Option<SyslogTarget>,
}

impl ContainerTemplate {
    /// Creates a template sharing `<shared_root>/jagereye_shared`.
    #[must_use]
    pub fn new(shared_root: impl Into<PathBuf>) -> Self {
        Self {
            shared_root: shared_root.into(),
            container_shared_dir: CONTAINER_SHARED_DIR.to_string(),
            syslog: None,
        }
    }

    /// Forwards worker output to a syslog endpoint.
    #[must_use]
    pub fn with_syslog(mut self, syslog: SyslogTarget) -> Self {
        self.syslog = Some(syslog);
        self
    }

    /// Host side of the shared directory.
    #[must_use]
    pub fn host_shared_dir(&self) -> PathBuf {
        self.shared_root.join(SHARED_DIR_NAME)
    }

    /// Builds the container spec for a worker running `image`.
    #[must_use]
    pub fn spec(&self, id: &WorkerId, image: &str) -> ContainerSpec {
        ContainerSpec {
            id: id.clone(),
            image: image.to_string(),
            env: vec![("worker_id".to_string(), id.to_string())],
            mounts: vec![BindMount {
                host: self.host_shared_dir(),
                container: self.container_shared_dir.clone(),
            }],
            log: self.syslog.as_ref().map(|s| s.log_config(id)),
        }
    }
}

/// Result of inspecting a container.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ContainerInspect {
    pub running: bool,
}

/// Engine-assigned handle of a created container.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ContainerHandle {
    pub engine_id: String,
}

/// Container engine operations.
///
/// Every failure, including an engine that does not answer in time, is a
/// [`WorkerError::Runtime`](crate::WorkerError::Runtime). No operation
/// succeeds partially.
#[async_trait]
pub trait ContainerRuntime: Send + Sync {
    /// Creates (but does not start) a container.
    async fn create_container(&self, spec: &ContainerSpec) -> Result<ContainerHandle>;

    /// Starts a created or stopped container.
    async fn start_container(&self, id: &WorkerId) -> Result<()>;

    /// Stops a running container.
    async fn stop_container(&self, id: &WorkerId) -> Result<()>;

    /// Force-removes a container. Removing an absent container succeeds.
    async fn remove_container(&self, id: &WorkerId) -> Result<()>;

    /// Inspects a container.
    async fn inspect(&self, id: &WorkerId) -> Result<ContainerInspect>;

    /// Restarts a container.
    ///
    /// A running container is stopped then started, a stopped one is only
    /// started. The inspect and the actions are not atomic.
    async fn restart_container(&self, id: &WorkerId) -> Result<()> {
        if self.inspect(id).await?.running {
            self.stop_container(id).await?;
        }
        self.start_container(id).await
    }
}

/// Lookup of the images workers can be created from.
#[async_trait]
pub trait ImageCatalog: Send + Sync {
    /// Returns true if the image exists locally.
    async fn image_exists(&self, image: &str) -> Result<bool>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_spec_for_worker() {
        let id = WorkerId::from_string("worker_abc");
        let template = ContainerTemplate::new("/data").with_syslog(SyslogTarget {
            host: "127.0.0.1".to_string(),
            port: 514,
            facility: "local1".to_string(),
        });

        let spec = template.spec(&id, "jagereye/worker_tripwire");

        assert_eq!(spec.image, "jagereye/worker_tripwire");
        assert_eq!(spec.env_pairs(), vec!["worker_id=worker_abc".to_string()]);
        assert_eq!(
            spec.mounts[0].to_bind(),
            "/data/jagereye_shared:/root/jagereye_shared"
        );

        let log = spec.log.unwrap();
        assert_eq!(log.driver, "syslog");
        assert_eq!(log.options["syslog-address"], "udp://127.0.0.1:514");
        assert_eq!(log.options["syslog-facility"], "local1");
        assert_eq!(log.options["tag"], "worker_abc - thrid-party pid:");
    }

    #[test]
    fn test_spec_without_syslog() {
        let spec = ContainerTemplate::new("/home/me").spec(&WorkerId::from_string("worker_1"), "img");
        assert!(spec.log.is_none());
    }
}
