//! Caller-side client for the resource manager.

use crate::error::Result;
use jagereye_bus::{Bus, RequestOptions, RequestOutcome, Requester};
use jagereye_protocol::{CH_BRAIN_TO_RES, Command, WorkerId};
use std::sync::Arc;
use std::time::Duration;

/// Sends worker commands and collects their replies.
///
/// Each request carries a fresh `ticketId`, and waits with the deadline
/// of its command kind unless a timeout is forced.
#[derive(Debug, Clone)]
pub struct ResourceClient {
    requester: Requester,
    timeout: Option<Duration>,
}

impl ResourceClient {
    /// Creates a client publishing on the default command subject.
    pub fn new(bus: Arc<dyn Bus>) -> Self {
        Self::with_subject(bus, CH_BRAIN_TO_RES)
    }

    /// Creates a client publishing on `subject`.
    pub fn with_subject(bus: Arc<dyn Bus>, subject: impl Into<String>) -> Self {
        Self {
            requester: Requester::new(bus, subject),
            timeout: None,
        }
    }

    /// Uses `timeout` for every request.
    #[must_use]
    pub const fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    /// Asks for a new worker running `worker_name`.
    ///
    /// # Errors
    ///
    /// Returns an error if the request cannot be sent.
    pub async fn create_worker(&self, worker_name: &str) -> Result<RequestOutcome> {
        self.send(Command::create_worker(worker_name)).await
    }

    /// Asks for workers to be restarted.
    ///
    /// Only answered when the resource manager has restart replies
    /// enabled; otherwise the outcome is a timeout.
    ///
    /// # Errors
    ///
    /// Returns an error if the request cannot be sent.
    pub async fn restart_workers(
        &self,
        worker_ids: impl IntoIterator<Item = WorkerId>,
    ) -> Result<RequestOutcome> {
        self.send(Command::restart_workers(worker_ids)).await
    }

    /// Asks for a worker to be removed.
    ///
    /// # Errors
    ///
    /// Returns an error if the request cannot be sent.
    pub async fn remove_worker(&self, worker_id: WorkerId) -> Result<RequestOutcome> {
        self.send(Command::remove_worker(worker_id)).await
    }

    /// Sends any command and waits for its outcome.
    ///
    /// # Errors
    ///
    /// Returns an error if the request cannot be sent.
    pub async fn send(&self, command: Command) -> Result<RequestOutcome> {
        let mut options = RequestOptions::for_command(command.kind());
        if let Some(timeout) = self.timeout {
            options = options.with_timeout(timeout);
        }

        let request = command
            .into_request()
            .with_ticket(uuid::Uuid::new_v4().to_string());
        tracing::debug!(
            command = %request.command,
            ticket_id = ?request.ticket_id,
            "sending command"
        );

        Ok(self.requester.request(&request, options).await?)
    }
}
