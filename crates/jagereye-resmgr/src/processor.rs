//! Command processor.
//!
//! Listens on the command subject, decodes each command (failing closed
//! on anything it cannot read), drives the lifecycle manager and publishes
//! replies. Every command is handled on its own task, so a slow container
//! engine never blocks the intake of further commands.

use crate::admission::{Admission, AlwaysAdmit};
use crate::config::Capabilities;
use crate::error::Result;
use bytes::Bytes;
use jagereye_bus::{Bus, Message, Subscription};
use jagereye_protocol::{
    CH_BRAIN_TO_RES, CH_RES_TO_BRAIN, Command, CreateWorkerParams, CreateWorkerResponse,
    ErrorCode, RemoveWorkerParams, RemoveWorkerResponse, Reply, Request, RestartWorkersParams,
    RestartWorkersResponse, WorkerId, WorkerStatus,
};
use jagereye_error::CommonError;
use jagereye_worker::{ImageCatalog, LifecycleManager, WorkerError};
use serde::Serialize;
use std::future::Future;
use std::sync::{Arc, Mutex};
use tokio::task::JoinSet;

/// Handles worker commands received over the bus.
#[derive(Clone)]
pub struct CommandProcessor {
    bus: Arc<dyn Bus>,
    lifecycle: LifecycleManager,
    catalog: Arc<dyn ImageCatalog>,
    admission: Arc<dyn Admission>,
    capabilities: Capabilities,
    command_subject: String,
    reply_subject: String,
    tasks: Arc<Mutex<JoinSet<()>>>,
}

impl CommandProcessor {
    /// Creates a processor on the default subjects, admitting every
    /// creation and with optional replies off.
    pub fn new(
        bus: Arc<dyn Bus>,
        lifecycle: LifecycleManager,
        catalog: Arc<dyn ImageCatalog>,
    ) -> Self {
        Self {
            bus,
            lifecycle,
            catalog,
            admission: Arc::new(AlwaysAdmit),
            capabilities: Capabilities::default(),
            command_subject: CH_BRAIN_TO_RES.to_string(),
            reply_subject: CH_RES_TO_BRAIN.to_string(),
            tasks: Arc::new(Mutex::new(JoinSet::new())),
        }
    }

    /// Sets the admission gate.
    #[must_use]
    pub fn with_admission(mut self, admission: Arc<dyn Admission>) -> Self {
        self.admission = admission;
        self
    }

    /// Enables optional reply paths.
    #[must_use]
    pub const fn with_capabilities(mut self, capabilities: Capabilities) -> Self {
        self.capabilities = capabilities;
        self
    }

    /// Sets the command subject and the fallback reply subject.
    #[must_use]
    pub fn with_subjects(
        mut self,
        command_subject: impl Into<String>,
        reply_subject: impl Into<String>,
    ) -> Self {
        self.command_subject = command_subject.into();
        self.reply_subject = reply_subject.into();
        self
    }

    /// Subject commands are read from.
    #[must_use]
    pub fn command_subject(&self) -> &str {
        &self.command_subject
    }

    /// Subscribes to the command subject.
    ///
    /// # Errors
    ///
    /// Returns an error if the subscription fails.
    pub async fn subscribe(&self) -> Result<Subscription> {
        Ok(self.bus.subscribe(&self.command_subject).await?)
    }

    /// Subscribes and serves commands until `shutdown` resolves.
    ///
    /// # Errors
    ///
    /// Returns an error if the subscription fails.
    pub async fn run(&self, shutdown: impl Future<Output = ()>) -> Result<()> {
        let subscription = self.subscribe().await?;
        self.serve(subscription, shutdown).await;
        Ok(())
    }

    /// Serves commands from `subscription` until `shutdown` resolves or the
    /// subscription ends, then waits for in-flight work.
    pub async fn serve(&self, mut subscription: Subscription, shutdown: impl Future<Output = ()>) {
        tokio::pin!(shutdown);
        tracing::info!(subject = subscription.subject(), "command processor listening");

        loop {
            tokio::select! {
                () = &mut shutdown => {
                    tracing::info!("command processor stopping");
                    break;
                }
                message = subscription.next() => {
                    let Some(message) = message else {
                        tracing::warn!("command subscription ended");
                        break;
                    };
                    let this = self.clone();
                    self.spawn(async move { this.handle(message).await });
                }
            }
        }

        drop(subscription);
        self.drain().await;
    }

    /// Waits for every in-flight handler and background creation.
    pub async fn drain(&self) {
        loop {
            let mut tasks = match self.tasks.lock() {
                Ok(mut tasks) => std::mem::take(&mut *tasks),
                Err(_) => return,
            };
            if tasks.is_empty() {
                return;
            }
            while let Some(joined) = tasks.join_next().await {
                if let Err(e) = joined {
                    tracing::error!(error = %e, "command task panicked");
                }
            }
        }
    }

    /// Handles one command message.
    pub async fn handle(&self, message: Message) {
        let reply_to = message
            .reply
            .unwrap_or_else(|| self.reply_subject.clone());

        let request = match Request::decode(&message.payload) {
            Ok(request) => request,
            Err(e) => {
                tracing::warn!(error = %e, "undecodable command");
                self.reply(&reply_to, Reply::error(Request::default(), e.error_code()))
                    .await;
                return;
            }
        };

        tracing::info!(
            command = %request.command,
            ticket_id = ?request.ticket_id,
            "command received"
        );

        let command = match request.command() {
            Ok(command) => command,
            Err(e) => {
                tracing::warn!(command = %request.command, error = %e, "command rejected");
                let code = e.error_code();
                self.reply(&reply_to, Reply::error(request, code)).await;
                return;
            }
        };

        match command {
            Command::CreateWorker(params) => self.create_worker(request, params, reply_to).await,
            Command::RestartWorkers(params) => {
                self.restart_workers(request, params, reply_to).await;
            }
            Command::RemoveWorker(params) => self.remove_worker(request, params, reply_to).await,
        }
    }

    async fn create_worker(&self, request: Request, params: CreateWorkerParams, reply_to: String) {
        match self.catalog.image_exists(&params.worker_name).await {
            Ok(true) => {}
            Ok(false) => {
                tracing::info!(worker_name = %params.worker_name, "unknown worker image");
                self.reply(&reply_to, Reply::error(request, ErrorCode::NonExistedName))
                    .await;
                return;
            }
            Err(e) => {
                tracing::error!(worker_name = %params.worker_name, error = %e, "image lookup failed");
                self.reply(&reply_to, Reply::error(request, ErrorCode::NotAvailable))
                    .await;
                return;
            }
        }

        if !self.admission.try_admit() {
            tracing::info!(worker_name = %params.worker_name, "no capacity for another worker");
            self.reply(&reply_to, Reply::error(request, ErrorCode::OutOfResource))
                .await;
            return;
        }

        let worker_id = WorkerId::generate();
        self.respond(
            &reply_to,
            request.clone(),
            &CreateWorkerResponse {
                worker_id: worker_id.clone(),
                status: WorkerStatus::Creating,
            },
        )
        .await;

        // The accepted reply is out before the first status write.
        let this = self.clone();
        self.spawn(async move {
            let Err(e) = this.lifecycle.create(&worker_id, &params.worker_name).await else {
                return;
            };
            this.admission.release();
            // Removed mid-creation: the caller already has its REMOVED reply.
            if matches!(e, WorkerError::Common(CommonError::InvalidState(_))) {
                return;
            }
            if this.capabilities.failure_replies {
                this.reply(
                    &reply_to,
                    Reply::worker_error(request, ErrorCode::NotAvailable, worker_id),
                )
                .await;
            }
        });
    }

    async fn restart_workers(
        &self,
        request: Request,
        params: RestartWorkersParams,
        reply_to: String,
    ) {
        let results = futures::future::join_all(params.worker_ids.into_iter().map(|id| async move {
            let result = self.lifecycle.restart(&id).await;
            (id, result)
        }))
        .await;

        let mut summary = RestartWorkersResponse::default();
        for (id, result) in results {
            match result {
                Ok(()) => summary.restarted.push(id),
                Err(e) => {
                    tracing::warn!(worker_id = %id, error = %e, "worker not restarted");
                    summary.failed.push(id);
                }
            }
        }
        tracing::info!(
            restarted = summary.restarted.len(),
            failed = summary.failed.len(),
            "restart finished"
        );

        if self.capabilities.restart_replies {
            self.respond(&reply_to, request, &summary).await;
        }
    }

    async fn remove_worker(&self, request: Request, params: RemoveWorkerParams, reply_to: String) {
        match self.lifecycle.remove(&params.worker_id).await {
            Ok(previous) => {
                // Failed creations gave their slot back already.
                if previous == Some(WorkerStatus::Running) {
                    self.admission.release();
                }
                self.respond(
                    &reply_to,
                    request,
                    &RemoveWorkerResponse {
                        status: WorkerStatus::Removed,
                    },
                )
                .await;
            }
            Err(e) => {
                tracing::error!(worker_id = %params.worker_id, error = %e, "remove failed");
                self.reply(&reply_to, Reply::error(request, ErrorCode::NotAvailable))
                    .await;
            }
        }
    }

    async fn respond(&self, subject: &str, request: Request, payload: &impl Serialize) {
        match Reply::response(request, payload) {
            Ok(reply) => self.reply(subject, reply).await,
            Err(e) => tracing::error!(error = %e, "failed to build reply"),
        }
    }

    async fn reply(&self, subject: &str, reply: Reply) {
        let payload = match reply.encode() {
            Ok(payload) => payload,
            Err(e) => {
                tracing::error!(error = %e, "failed to encode reply");
                return;
            }
        };

        match self.bus.publish(subject, Bytes::from(payload)).await {
            Ok(()) => tracing::debug!(
                subject,
                command = %reply.request.command,
                error_code = ?reply.error_code(),
                "reply published"
            ),
            Err(e) => tracing::error!(subject, error = %e, "failed to publish reply"),
        }
    }

    fn spawn<F>(&self, task: F)
    where
        F: Future<Output = ()> + Send + 'static,
    {
        match self.tasks.lock() {
            Ok(mut tasks) => {
                while tasks.try_join_next().is_some() {}
                tasks.spawn(task);
            }
            Err(_) => {
                tokio::spawn(task);
            }
        }
    }
}

impl std::fmt::Debug for CommandProcessor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CommandProcessor")
            .field("command_subject", &self.command_subject)
            .field("reply_subject", &self.reply_subject)
            .field("capabilities", &self.capabilities)
            .finish_non_exhaustive()
    }
}
