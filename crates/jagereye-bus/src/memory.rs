//! In-process bus.

use crate::error::Result;
use crate::{Bus, Message, Subscription};
use async_trait::async_trait;
use bytes::Bytes;
use jagereye_error::CommonError;
use std::collections::HashMap;
use std::sync::{Arc, RwLock};
use tokio::sync::mpsc;
use tokio_stream::wrappers::UnboundedReceiverStream;

/// Bus that delivers messages between tasks of one process.
///
/// Cloning yields another handle to the same bus.
#[derive(Clone, Default)]
pub struct MemoryBus {
    subscribers: Arc<RwLock<HashMap<String, Vec<mpsc::UnboundedSender<Message>>>>>,
}

impl MemoryBus {
    /// Creates an empty bus.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the number of live subscriptions on a subject.
    #[must_use]
    pub fn subscriber_count(&self, subject: &str) -> usize {
        self.subscribers
            .read()
            .map(|subs| {
                subs.get(subject)
                    .map_or(0, |senders| senders.iter().filter(|tx| !tx.is_closed()).count())
            })
            .unwrap_or_default()
    }

    fn deliver(&self, message: Message) -> Result<()> {
        let mut subscribers = self
            .subscribers
            .write()
            .map_err(|_| CommonError::internal("lock poisoned"))?;

        let Some(senders) = subscribers.get_mut(&message.subject) else {
            tracing::trace!(subject = %message.subject, "no subscribers");
            return Ok(());
        };

        // Dropped subscriptions show up as closed senders.
        senders.retain(|tx| tx.send(message.clone()).is_ok());
        if senders.is_empty() {
            subscribers.remove(&message.subject);
        }
        Ok(())
    }
}

#[async_trait]
impl Bus for MemoryBus {
    async fn publish(&self, subject: &str, payload: Bytes) -> Result<()> {
        self.deliver(Message {
            subject: subject.to_string(),
            reply: None,
            payload,
        })
    }

    async fn publish_request(&self, subject: &str, reply: &str, payload: Bytes) -> Result<()> {
        self.deliver(Message {
            subject: subject.to_string(),
            reply: Some(reply.to_string()),
            payload,
        })
    }

    async fn subscribe(&self, subject: &str) -> Result<Subscription> {
        let (tx, rx) = mpsc::unbounded_channel();
        self.subscribers
            .write()
            .map_err(|_| CommonError::internal("lock poisoned"))?
            .entry(subject.to_string())
            .or_default()
            .push(tx);

        Ok(Subscription::new(subject, UnboundedReceiverStream::new(rx)))
    }

    fn new_inbox(&self) -> String {
        format!("_INBOX.{}", uuid::Uuid::new_v4().simple())
    }
}
