//! NATS-backed bus.

use crate::error::{BusError, Result};
use crate::{Bus, Message, Subscription};
use async_trait::async_trait;
use bytes::Bytes;
use futures::StreamExt;
use std::time::Duration;

/// Delay between reconnect attempts.
const RECONNECT_DELAY: Duration = Duration::from_millis(250);

/// Bus on top of a NATS connection.
///
/// The client reconnects on its own; publishes issued while disconnected
/// are buffered by the client.
#[derive(Clone, Debug)]
pub struct NatsBus {
    client: async_nats::Client,
}

impl NatsBus {
    /// Connects to a NATS server, e.g. `nats://localhost:4222`.
    ///
    /// # Errors
    ///
    /// Returns [`BusError::Connect`] if the initial connection fails.
    pub async fn connect(url: &str) -> Result<Self> {
        let client = async_nats::ConnectOptions::new()
            .reconnect_delay_callback(|_attempts| RECONNECT_DELAY)
            .event_callback(|event| async move {
                match event {
                    async_nats::Event::Connected => tracing::info!("bus connected"),
                    async_nats::Event::Disconnected => tracing::warn!("bus disconnected"),
                    other => tracing::debug!(event = %other, "bus event"),
                }
            })
            .connect(url)
            .await
            .map_err(|e| BusError::Connect(format!("{url}: {e}")))?;

        tracing::info!(url, "connected to NATS");
        Ok(Self { client })
    }

    /// Wraps an existing client.
    #[must_use]
    pub const fn from_client(client: async_nats::Client) -> Self {
        Self { client }
    }
}

#[async_trait]
impl Bus for NatsBus {
    async fn publish(&self, subject: &str, payload: Bytes) -> Result<()> {
        self.client
            .publish(subject.to_string(), payload)
            .await
            .map_err(|e| BusError::publish(subject, e))
    }

    async fn publish_request(&self, subject: &str, reply: &str, payload: Bytes) -> Result<()> {
        self.client
            .publish_with_reply(subject.to_string(), reply.to_string(), payload)
            .await
            .map_err(|e| BusError::publish(subject, e))
    }

    async fn subscribe(&self, subject: &str) -> Result<Subscription> {
        let subscriber = self
            .client
            .subscribe(subject.to_string())
            .await
            .map_err(|e| BusError::subscribe(subject, e))?;

        let stream = subscriber.map(|msg| Message {
            subject: msg.subject.to_string(),
            reply: msg.reply.map(|r| r.to_string()),
            payload: msg.payload,
        });
        Ok(Subscription::new(subject, stream))
    }

    fn new_inbox(&self) -> String {
        self.client.new_inbox()
    }

    async fn flush(&self) -> Result<()> {
        self.client
            .flush()
            .await
            .map_err(|e| BusError::publish("<flush>", e))
    }
}
