//! Typed commands.

use crate::error::{ProtocolError, Result};
use crate::request::Request;
use crate::worker::WorkerId;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};

/// Command names understood by the resource manager.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum CommandKind {
    CreateWorker,
    RestartWorkers,
    RemoveWorker,
}

impl CommandKind {
    /// Returns the wire name.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::CreateWorker => "CREATE_WORKER",
            Self::RestartWorkers => "RESTART_WORKERS",
            Self::RemoveWorker => "REMOVE_WORKER",
        }
    }

    /// Parses a wire name.
    #[must_use]
    pub fn from_name(name: &str) -> Option<Self> {
        match name {
            "CREATE_WORKER" => Some(Self::CreateWorker),
            "RESTART_WORKERS" => Some(Self::RestartWorkers),
            "REMOVE_WORKER" => Some(Self::RemoveWorker),
            _ => None,
        }
    }
}

impl std::fmt::Display for CommandKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Params of `CREATE_WORKER`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateWorkerParams {
    /// Image (worker template) to run.
    pub worker_name: String,
}

/// Params of `RESTART_WORKERS`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RestartWorkersParams {
    pub worker_ids: Vec<WorkerId>,
}

/// Params of `REMOVE_WORKER`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RemoveWorkerParams {
    pub worker_id: WorkerId,
}

/// A decoded command.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    CreateWorker(CreateWorkerParams),
    RestartWorkers(RestartWorkersParams),
    RemoveWorker(RemoveWorkerParams),
}

impl Command {
    /// Builds a `CREATE_WORKER` command.
    #[must_use]
    pub fn create_worker(worker_name: impl Into<String>) -> Self {
        Self::CreateWorker(CreateWorkerParams {
            worker_name: worker_name.into(),
        })
    }

    /// Builds a `RESTART_WORKERS` command.
    #[must_use]
    pub fn restart_workers(worker_ids: impl IntoIterator<Item = WorkerId>) -> Self {
        Self::RestartWorkers(RestartWorkersParams {
            worker_ids: worker_ids.into_iter().collect(),
        })
    }

    /// Builds a `REMOVE_WORKER` command.
    #[must_use]
    pub const fn remove_worker(worker_id: WorkerId) -> Self {
        Self::RemoveWorker(RemoveWorkerParams { worker_id })
    }

    /// Returns the command name.
    #[must_use]
    pub const fn kind(&self) -> CommandKind {
        match self {
            Self::CreateWorker(_) => CommandKind::CreateWorker,
            Self::RestartWorkers(_) => CommandKind::RestartWorkers,
            Self::RemoveWorker(_) => CommandKind::RemoveWorker,
        }
    }

    /// Decodes the typed command from a request envelope.
    ///
    /// # Errors
    ///
    /// Returns [`ProtocolError::UnsupportedCommand`] for unknown names and
    /// [`ProtocolError::InvalidParams`] when params do not match the command.
    pub fn from_request(request: &Request) -> Result<Self> {
        let kind = CommandKind::from_name(&request.command)
            .ok_or_else(|| ProtocolError::UnsupportedCommand(request.command.clone()))?;

        Ok(match kind {
            CommandKind::CreateWorker => Self::CreateWorker(params(kind, &request.params)?),
            CommandKind::RestartWorkers => Self::RestartWorkers(params(kind, &request.params)?),
            CommandKind::RemoveWorker => Self::RemoveWorker(params(kind, &request.params)?),
        })
    }

    /// Wraps the command in a request envelope.
    #[must_use]
    pub fn into_request(self) -> Request {
        let kind = self.kind();
        // Params are plain strings and lists of strings; serializing them
        // cannot fail.
        let params = match self {
            Self::CreateWorker(p) => serde_json::to_value(p),
            Self::RestartWorkers(p) => serde_json::to_value(p),
            Self::RemoveWorker(p) => serde_json::to_value(p),
        }
        .unwrap_or_default();

        Request {
            command: kind.as_str().to_string(),
            params,
            ticket_id: None,
        }
    }
}

fn params<T: DeserializeOwned>(kind: CommandKind, value: &serde_json::Value) -> Result<T> {
    T::deserialize(value).map_err(|source| ProtocolError::InvalidParams {
        command: kind.as_str().to_string(),
        source,
    })
}
