//! Configuration management.
//!
//! Configuration is loaded from multiple sources with the following priority:
//!
//! 1. Environment variables (`JAGEREYE_*`, nested keys split on `__`)
//! 2. User config file (`~/.config/jagereye/res_mgr.toml`)
//! 3. System config file (`/etc/jagereye/res_mgr.toml`)
//! 4. Default values
//!
//! ## Example Configuration File
//!
//! ```toml
//! [bus]
//! url = "nats://127.0.0.1:4222"
//!
//! [store]
//! url = "redis://127.0.0.1:6379"
//!
//! [docker]
//! network_mode = "host"
//! gpu_runtime = "nvidia"
//! operation_timeout_secs = 30
//!
//! [shared]
//! root = "/data"
//!
//! [logging]
//! level = "info"
//!
//! [logging.syslog]
//! host = "127.0.0.1"
//! port = 514
//!
//! [capabilities]
//! restart_replies = true
//! failure_replies = true
//!
//! [admission]
//! max_workers = 8
//! ```

use figment::{
    Figment,
    providers::{Env, Format, Serialized, Toml},
};
use jagereye_protocol::{CH_BRAIN_TO_RES, CH_RES_TO_BRAIN};
use jagereye_worker::{ContainerTemplate, KEY_PREFIX, SyslogTarget};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Resource manager configuration.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub bus: BusConfig,
    pub store: StoreConfig,
    pub docker: DockerConfig,
    pub shared: SharedConfig,
    pub logging: LoggingConfig,
    pub capabilities: Capabilities,
    pub admission: AdmissionConfig,
}

impl Config {
    /// Loads configuration from files and environment.
    ///
    /// # Errors
    ///
    /// Returns an error if configuration cannot be loaded.
    pub fn load() -> Result<Self, figment::Error> {
        Figment::new()
            .merge(Serialized::defaults(Self::default()))
            .merge(Toml::file(system_config_path()))
            .merge(Toml::file(user_config_path()))
            .merge(Env::prefixed("JAGEREYE_").split("__"))
            .extract()
    }

    /// Loads configuration from a specific file.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be read or parsed.
    pub fn load_from(path: impl AsRef<Path>) -> Result<Self, figment::Error> {
        Figment::new()
            .merge(Serialized::defaults(Self::default()))
            .merge(Toml::file(path))
            .merge(Env::prefixed("JAGEREYE_").split("__"))
            .extract()
    }

    /// Host directory holding `jagereye_shared`.
    ///
    /// Falls back to `$SHARED_ROOT`, then the home directory.
    #[must_use]
    pub fn shared_root(&self) -> PathBuf {
        self.shared
            .root
            .clone()
            .or_else(|| std::env::var_os("SHARED_ROOT").map(PathBuf::from))
            .or_else(dirs::home_dir)
            .unwrap_or_else(|| PathBuf::from("/root"))
    }

    /// Host settings applied to every worker container.
    #[must_use]
    pub fn container_template(&self) -> ContainerTemplate {
        let mut template = ContainerTemplate::new(self.shared_root());
        template.container_shared_dir.clone_from(&self.shared.container_dir);
        match &self.logging.syslog {
            Some(syslog) => template.with_syslog(SyslogTarget {
                host: syslog.host.clone(),
                port: syslog.port,
                facility: syslog.facility.clone(),
            }),
            None => template,
        }
    }

    /// Docker runtime options.
    #[cfg(feature = "docker")]
    #[must_use]
    pub fn docker_options(&self) -> jagereye_worker::DockerOptions {
        jagereye_worker::DockerOptions {
            network_mode: self.docker.network_mode.clone(),
            gpu_runtime: self.docker.gpu_runtime.clone(),
            stop_timeout: Duration::from_secs(self.docker.stop_timeout_secs),
            operation_timeout: self.docker.operation_timeout(),
        }
    }
}

/// Message bus configuration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct BusConfig {
    /// NATS server URL.
    pub url: String,
    /// Subject commands arrive on.
    pub command_subject: String,
    /// Subject replies go to when a command names no reply subject.
    pub reply_subject: String,
}

impl Default for BusConfig {
    fn default() -> Self {
        Self {
            url: "nats://127.0.0.1:4222".to_string(),
            command_subject: CH_BRAIN_TO_RES.to_string(),
            reply_subject: CH_RES_TO_BRAIN.to_string(),
        }
    }
}

/// Status store configuration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct StoreConfig {
    /// Redis URL.
    pub url: String,
    /// Prefix of worker status keys.
    pub key_prefix: String,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            url: "redis://127.0.0.1:6379".to_string(),
            key_prefix: KEY_PREFIX.to_string(),
        }
    }
}

/// Docker engine configuration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct DockerConfig {
    /// Network mode of worker containers.
    pub network_mode: Option<String>,
    /// OCI runtime of worker containers. Unset runs the engine default.
    pub gpu_runtime: Option<String>,
    /// Grace period in seconds before a stopping worker is killed.
    pub stop_timeout_secs: u64,
    /// Upper bound in seconds on any single engine call.
    pub operation_timeout_secs: u64,
}

impl Default for DockerConfig {
    fn default() -> Self {
        Self {
            network_mode: Some("host".to_string()),
            gpu_runtime: Some("nvidia".to_string()),
            stop_timeout_secs: 10,
            operation_timeout_secs: 30,
        }
    }
}

impl DockerConfig {
    /// Upper bound on any single engine call.
    #[must_use]
    pub const fn operation_timeout(&self) -> Duration {
        Duration::from_secs(self.operation_timeout_secs)
    }
}

/// Host/container shared directory.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SharedConfig {
    /// Host directory holding `jagereye_shared`.
    pub root: Option<PathBuf>,
    /// Mount point inside worker containers.
    pub container_dir: String,
}

impl Default for SharedConfig {
    fn default() -> Self {
        Self {
            root: None,
            container_dir: jagereye_worker::runtime::CONTAINER_SHARED_DIR.to_string(),
        }
    }
}

/// Logging configuration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Log level filter for the resource manager itself.
    pub level: String,
    /// Where worker container output is forwarded.
    pub syslog: Option<SyslogConfig>,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            syslog: None,
        }
    }
}

/// Syslog endpoint for worker containers.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SyslogConfig {
    pub host: String,
    pub port: u16,
    pub facility: String,
}

impl Default for SyslogConfig {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".to_string(),
            port: 514,
            facility: "local1".to_string(),
        }
    }
}

/// Optional reply paths.
///
/// Both are off by default, which keeps restarts and asynchronous creation
/// failures silent on the bus.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Capabilities {
    /// Reply to `RESTART_WORKERS` with the restarted and failed ids.
    pub restart_replies: bool,
    /// Follow a `CREATING` reply with `NOT_AVAILABLE` when creation fails.
    pub failure_replies: bool,
}

/// Worker admission.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct AdmissionConfig {
    /// Maximum number of live workers. Unset admits every request.
    pub max_workers: Option<usize>,
}

fn user_config_path() -> PathBuf {
    dirs::config_dir()
        .unwrap_or_else(|| PathBuf::from("~/.config"))
        .join("jagereye")
        .join("res_mgr.toml")
}

fn system_config_path() -> PathBuf {
    PathBuf::from("/etc/jagereye/res_mgr.toml")
}
