//! # jagereye-bus
//!
//! Publish/subscribe plumbing between the brain and the resource manager.
//!
//! - [`Bus`]: the transport seam (publish, subscribe, request inboxes)
//! - [`MemoryBus`]: in-process bus for tests and single-process setups
//! - `NatsBus`: NATS-backed bus (feature `nats`)
//! - [`Requester`]: caller-side reply aggregation with a deadline
//!
//! ## Request flow
//!
//! ```text
//!  Requester ──subscribe(inbox)──▶ Bus
//!      │                            │
//!      └──publish(subject, inbox)──▶│──▶ responder(s)
//!                                   │         │
//!      ◀───────── replies on inbox ─┘◀────────┘
//! ```

#![warn(clippy::all, clippy::pedantic, clippy::nursery)]
#![allow(clippy::module_name_repetitions)]

pub mod error;
pub mod memory;
#[cfg(feature = "nats")]
pub mod nats;
pub mod requester;

pub use error::{BusError, Result};
pub use memory::MemoryBus;
#[cfg(feature = "nats")]
pub use nats::NatsBus;
pub use requester::{Delivery, PendingRequest, RequestOptions, RequestOutcome, Requester};

use async_trait::async_trait;
use bytes::Bytes;
use futures::stream::{BoxStream, Stream, StreamExt};

/// A message received from the bus.
#[derive(Debug, Clone)]
pub struct Message {
    /// Subject the message was published on.
    pub subject: String,
    /// Subject the sender listens on for replies, if any.
    pub reply: Option<String>,
    /// Message body.
    pub payload: Bytes,
}

/// A live subscription. Dropping it unsubscribes.
pub struct Subscription {
    subject: String,
    stream: BoxStream<'static, Message>,
}

impl Subscription {
    /// Wraps a message stream.
    pub fn new(
        subject: impl Into<String>,
        stream: impl Stream<Item = Message> + Send + 'static,
    ) -> Self {
        Self {
            subject: subject.into(),
            stream: stream.boxed(),
        }
    }

    /// Returns the subscribed subject.
    #[must_use]
    pub fn subject(&self) -> &str {
        &self.subject
    }

    /// Waits for the next message.
    ///
    /// Returns `None` once the bus connection is gone.
    pub async fn next(&mut self) -> Option<Message> {
        self.stream.next().await
    }
}

impl std::fmt::Debug for Subscription {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Subscription")
            .field("subject", &self.subject)
            .finish_non_exhaustive()
    }
}

/// Publish/subscribe transport.
///
/// Delivery is at most once per subscriber. Subjects are matched exactly.
#[async_trait]
pub trait Bus: Send + Sync {
    /// Publishes a message with no reply subject.
    async fn publish(&self, subject: &str, payload: Bytes) -> Result<()>;

    /// Publishes a message that names `reply` as its reply subject.
    async fn publish_request(&self, subject: &str, reply: &str, payload: Bytes) -> Result<()>;

    /// Subscribes to a subject.
    async fn subscribe(&self, subject: &str) -> Result<Subscription>;

    /// Returns a fresh, unique subject for collecting replies.
    fn new_inbox(&self) -> String;

    /// Flushes buffered outgoing messages.
    async fn flush(&self) -> Result<()> {
        Ok(())
    }
}
