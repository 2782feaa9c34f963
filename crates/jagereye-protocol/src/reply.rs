//! Reply envelope and response payloads.

use crate::error::Result;
use crate::request::Request;
use crate::worker::{WorkerId, WorkerStatus};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};

/// Error codes carried in `error.code`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ErrorCode {
    /// The requested worker image does not exist.
    NonExistedName,
    /// No capacity for another worker.
    OutOfResource,
    /// Unknown command or params that do not match it.
    NonSupportedCmd,
    /// The referenced worker does not exist.
    NotFound,
    /// The operation could not be carried out by the runtime.
    NotAvailable,
}

/// Body of a failed reply.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ReplyError {
    pub code: ErrorCode,
    /// Worker the failure refers to, when the request did not name it
    /// (asynchronous creation failures).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub worker_id: Option<WorkerId>,
}

/// Either a success payload or an error.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ReplyOutcome {
    Response(serde_json::Value),
    Error(ReplyError),
}

/// A reply: the original request echoed, plus its outcome.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Reply {
    #[serde(flatten)]
    pub request: Request,
    #[serde(flatten)]
    pub outcome: ReplyOutcome,
}

impl Reply {
    /// Builds a success reply.
    ///
    /// # Errors
    ///
    /// Returns an error if the payload cannot be serialized.
    pub fn response(request: Request, payload: &impl Serialize) -> Result<Self> {
        Ok(Self {
            request,
            outcome: ReplyOutcome::Response(serde_json::to_value(payload)?),
        })
    }

    /// Builds an error reply.
    #[must_use]
    pub fn error(request: Request, code: ErrorCode) -> Self {
        Self {
            request,
            outcome: ReplyOutcome::Error(ReplyError {
                code,
                worker_id: None,
            }),
        }
    }

    /// Builds an error reply that names the affected worker.
    #[must_use]
    pub fn worker_error(request: Request, code: ErrorCode, worker_id: WorkerId) -> Self {
        Self {
            request,
            outcome: ReplyOutcome::Error(ReplyError {
                code,
                worker_id: Some(worker_id),
            }),
        }
    }

    /// Returns the error code, if this is an error reply.
    #[must_use]
    pub const fn error_code(&self) -> Option<ErrorCode> {
        match &self.outcome {
            ReplyOutcome::Error(e) => Some(e.code),
            ReplyOutcome::Response(_) => None,
        }
    }

    /// Decodes the success payload as `T`.
    ///
    /// Returns `None` for error replies.
    ///
    /// # Errors
    ///
    /// Returns an error if the payload does not match `T`.
    pub fn response_as<T: DeserializeOwned>(&self) -> Result<Option<T>> {
        match &self.outcome {
            ReplyOutcome::Response(value) => Ok(Some(T::deserialize(value)?)),
            ReplyOutcome::Error(_) => Ok(None),
        }
    }

    /// Decodes a reply body.
    ///
    /// # Errors
    ///
    /// Returns an error if the body is not a reply.
    pub fn decode(body: &[u8]) -> Result<Self> {
        Ok(serde_json::from_slice(body)?)
    }

    /// Encodes the reply as JSON.
    ///
    /// # Errors
    ///
    /// Returns an error if serialization fails.
    pub fn encode(&self) -> Result<Vec<u8>> {
        Ok(serde_json::to_vec(self)?)
    }
}

/// Response to `CREATE_WORKER`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateWorkerResponse {
    pub worker_id: WorkerId,
    pub status: WorkerStatus,
}

/// Response to `REMOVE_WORKER`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RemoveWorkerResponse {
    pub status: WorkerStatus,
}

/// Response to `RESTART_WORKERS`, sent only when restart replies are
/// enabled on the resource manager.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RestartWorkersResponse {
    pub restarted: Vec<WorkerId>,
    pub failed: Vec<WorkerId>,
}
