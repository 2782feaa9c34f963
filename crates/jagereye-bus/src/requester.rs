//! Caller-side request/reply aggregation.
//!
//! The bus gives at most one reply per responder and no completion signal.
//! [`Requester`] turns that into a bounded exchange: it waits for an
//! expected number of replies under a single deadline and resolves to
//! exactly one terminal outcome. Once the exchange is over the reply
//! subscription is dropped, so anything arriving later never reaches the
//! caller.

use crate::error::Result;
use crate::{Bus, Message, Subscription};
use bytes::Bytes;
use jagereye_protocol::{
    CommandKind, DEFAULT_REQUEST_TIMEOUT, REMOVE_REQUEST_TIMEOUT, Reply, Request,
};
use std::ops::ControlFlow;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::{Instant, sleep_until};

/// Code of the synthetic delivery produced when the deadline fires.
///
/// Local to the caller; never sent on the wire.
pub const REQ_TIMEOUT: &str = "REQ_TIMEOUT";

/// How many replies to wait for, and for how long.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RequestOptions {
    /// Replies after which the exchange completes.
    pub expected_replies: usize,
    /// Deadline for the whole exchange, measured from the send.
    pub timeout: Duration,
}

impl Default for RequestOptions {
    fn default() -> Self {
        Self {
            expected_replies: 1,
            timeout: DEFAULT_REQUEST_TIMEOUT,
        }
    }
}

impl RequestOptions {
    /// Default options for a command kind.
    #[must_use]
    pub fn for_command(kind: CommandKind) -> Self {
        match kind {
            CommandKind::RemoveWorker => Self {
                timeout: REMOVE_REQUEST_TIMEOUT,
                ..Self::default()
            },
            CommandKind::CreateWorker | CommandKind::RestartWorkers => Self::default(),
        }
    }

    /// Overrides the timeout.
    #[must_use]
    pub const fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Overrides the expected reply count.
    #[must_use]
    pub const fn with_expected_replies(mut self, expected_replies: usize) -> Self {
        self.expected_replies = expected_replies;
        self
    }
}

/// One thing handed to the caller during an exchange.
#[derive(Debug, Clone, PartialEq)]
pub enum Delivery {
    /// A well-formed reply.
    Reply(Reply),
    /// A reply body that could not be decoded.
    Malformed { message: String },
    /// The deadline fired before all replies arrived.
    Timeout,
}

impl Delivery {
    fn from_message(message: &Message) -> Self {
        match Reply::decode(&message.payload) {
            Ok(reply) => Self::Reply(reply),
            Err(e) => Self::Malformed {
                message: e.to_string(),
            },
        }
    }

    /// Returns `true` for the synthetic timeout.
    #[must_use]
    pub const fn is_timeout(&self) -> bool {
        matches!(self, Self::Timeout)
    }

    /// Returns the reply, if this delivery carries one.
    #[must_use]
    pub const fn as_reply(&self) -> Option<&Reply> {
        match self {
            Self::Reply(reply) => Some(reply),
            Self::Malformed { .. } | Self::Timeout => None,
        }
    }

    /// Renders the delivery the way callers expose it.
    ///
    /// Replies keep their wire shape, malformed bodies become
    /// `{"error":{"message":..}}` and the timeout is `{"code":"REQ_TIMEOUT"}`.
    #[must_use]
    pub fn to_json(&self) -> serde_json::Value {
        match self {
            Self::Reply(reply) => serde_json::to_value(reply).unwrap_or_default(),
            Self::Malformed { message } => {
                serde_json::json!({ "error": { "message": message } })
            }
            Self::Timeout => serde_json::json!({ "code": REQ_TIMEOUT }),
        }
    }
}

/// Terminal result of [`Requester::request`].
#[derive(Debug, Clone, PartialEq)]
pub enum RequestOutcome {
    /// All expected replies arrived in time.
    Replies(Vec<Delivery>),
    /// The deadline fired; holds what arrived before it.
    TimedOut(Vec<Delivery>),
    /// The bus ended the reply subscription early.
    Closed(Vec<Delivery>),
}

impl RequestOutcome {
    /// Returns the first reply received, if any.
    #[must_use]
    pub fn first_reply(&self) -> Option<&Reply> {
        self.deliveries().iter().find_map(Delivery::as_reply)
    }

    /// Returns the deliveries received before the outcome was decided.
    #[must_use]
    pub fn deliveries(&self) -> &[Delivery] {
        match self {
            Self::Replies(d) | Self::TimedOut(d) | Self::Closed(d) => d,
        }
    }

    /// Returns `true` if the deadline fired.
    #[must_use]
    pub const fn is_timed_out(&self) -> bool {
        matches!(self, Self::TimedOut(_))
    }
}

/// An exchange in flight.
///
/// Yields deliveries one at a time through [`next`](Self::next). The
/// exchange ends on the last expected reply, on the deadline or on
/// [`close`](Self::close); after that `next` returns `None`.
#[derive(Debug)]
pub struct PendingRequest {
    inbox: String,
    subscription: Option<Subscription>,
    deadline: Instant,
    expected: usize,
    received: usize,
}

enum Event {
    Deadline,
    Message(Option<Message>),
}

impl PendingRequest {
    /// Reply subject of this exchange.
    #[must_use]
    pub fn inbox(&self) -> &str {
        &self.inbox
    }

    /// Number of replies received so far.
    #[must_use]
    pub const fn received(&self) -> usize {
        self.received
    }

    /// Returns `true` once the exchange is over.
    #[must_use]
    pub const fn is_closed(&self) -> bool {
        self.subscription.is_none()
    }

    /// Stops listening before all replies arrived.
    ///
    /// No timeout is delivered for a closed exchange.
    pub fn close(&mut self) {
        if self.subscription.take().is_some() {
            tracing::debug!(inbox = %self.inbox, received = self.received, "request closed early");
        }
    }

    /// Waits for the next delivery.
    ///
    /// The flag is `true` on the delivery that ends the exchange: the last
    /// expected reply or the timeout.
    pub async fn next(&mut self) -> Option<(Delivery, bool)> {
        let event = {
            let subscription = self.subscription.as_mut()?;
            tokio::select! {
                // A reply racing the deadline loses.
                biased;
                () = sleep_until(self.deadline) => Event::Deadline,
                message = subscription.next() => Event::Message(message),
            }
        };

        match event {
            Event::Deadline => {
                self.subscription = None;
                tracing::debug!(
                    inbox = %self.inbox,
                    received = self.received,
                    expected = self.expected,
                    "request timed out"
                );
                Some((Delivery::Timeout, true))
            }
            Event::Message(Some(message)) => {
                self.received += 1;
                let is_last = self.received >= self.expected;
                if is_last {
                    self.subscription = None;
                }
                Some((Delivery::from_message(&message), is_last))
            }
            Event::Message(None) => {
                tracing::warn!(inbox = %self.inbox, "reply subscription ended");
                self.subscription = None;
                None
            }
        }
    }
}

/// Issues requests on one subject and aggregates the replies.
#[derive(Clone)]
pub struct Requester {
    bus: Arc<dyn Bus>,
    subject: String,
}

impl Requester {
    /// Creates a requester publishing on `subject`.
    pub fn new(bus: Arc<dyn Bus>, subject: impl Into<String>) -> Self {
        Self {
            bus,
            subject: subject.into(),
        }
    }

    /// Subject requests are published on.
    #[must_use]
    pub fn subject(&self) -> &str {
        &self.subject
    }

    /// Sends a request and returns the exchange in flight.
    ///
    /// The reply inbox is subscribed before the request is published, and
    /// the deadline starts once the publish returns.
    ///
    /// # Errors
    ///
    /// Returns an error if the request cannot be encoded or published.
    pub async fn start(&self, request: &Request, options: RequestOptions) -> Result<PendingRequest> {
        let inbox = self.bus.new_inbox();
        let subscription = self.bus.subscribe(&inbox).await?;
        let payload = Bytes::from(request.encode()?);
        self.bus
            .publish_request(&self.subject, &inbox, payload)
            .await?;
        self.bus.flush().await?;

        tracing::debug!(
            subject = %self.subject,
            command = %request.command,
            inbox = %inbox,
            expected = options.expected_replies,
            timeout = ?options.timeout,
            "request sent"
        );

        Ok(PendingRequest {
            inbox,
            subscription: Some(subscription),
            deadline: Instant::now() + options.timeout,
            expected: options.expected_replies.max(1),
            received: 0,
        })
    }

    /// Sends a request and hands every delivery to `on_delivery`.
    ///
    /// The callback gets the delivery and whether it ends the exchange.
    /// Returning [`ControlFlow::Break`] closes the exchange early.
    ///
    /// # Errors
    ///
    /// Returns an error if the request cannot be sent.
    pub async fn send_with<F>(
        &self,
        request: &Request,
        options: RequestOptions,
        mut on_delivery: F,
    ) -> Result<()>
    where
        F: FnMut(Delivery, bool) -> ControlFlow<()> + Send,
    {
        let mut pending = self.start(request, options).await?;
        while let Some((delivery, is_last)) = pending.next().await {
            if on_delivery(delivery, is_last).is_break() {
                pending.close();
            }
        }
        Ok(())
    }

    /// Sends a request and waits for its terminal outcome.
    ///
    /// # Errors
    ///
    /// Returns an error if the request cannot be sent.
    pub async fn request(&self, request: &Request, options: RequestOptions) -> Result<RequestOutcome> {
        let mut pending = self.start(request, options).await?;
        let mut deliveries = Vec::new();

        while let Some((delivery, is_last)) = pending.next().await {
            if delivery.is_timeout() {
                return Ok(RequestOutcome::TimedOut(deliveries));
            }
            deliveries.push(delivery);
            if is_last {
                return Ok(RequestOutcome::Replies(deliveries));
            }
        }
        Ok(RequestOutcome::Closed(deliveries))
    }
}

impl std::fmt::Debug for Requester {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Requester")
            .field("subject", &self.subject)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::MemoryBus;
    use jagereye_protocol::{
        CH_BRAIN_TO_RES, Command, ErrorCode, RemoveWorkerResponse, WorkerId, WorkerStatus,
    };

    const REPLY_WAIT: Duration = Duration::from_millis(100);

    fn remove_request() -> Request {
        Command::remove_worker(WorkerId::from_string("worker_abc"))
            .into_request()
            .with_ticket("t-1")
    }

    fn removed_reply(request: Request) -> Bytes {
        let reply = Reply::response(
            request,
            &RemoveWorkerResponse {
                status: WorkerStatus::Removed,
            },
        )
        .unwrap();
        Bytes::from(reply.encode().unwrap())
    }

    /// Answers every request on the command channel `replies` times,
    /// waiting `delay` before each answer.
    async fn spawn_responder(bus: &MemoryBus, replies: usize, delay: Duration) {
        let mut sub = bus.subscribe(CH_BRAIN_TO_RES).await.unwrap();
        let bus = bus.clone();
        tokio::spawn(async move {
            while let Some(msg) = sub.next().await {
                let request = Request::decode(&msg.payload).unwrap();
                let inbox = msg.reply.unwrap();
                for _ in 0..replies {
                    tokio::time::sleep(delay).await;
                    bus.publish(&inbox, removed_reply(request.clone()))
                        .await
                        .unwrap();
                }
            }
        });
    }

    fn requester(bus: &MemoryBus) -> Requester {
        Requester::new(Arc::new(bus.clone()), CH_BRAIN_TO_RES)
    }

    #[tokio::test]
    async fn test_single_reply() {
        let bus = MemoryBus::new();
        spawn_responder(&bus, 1, Duration::ZERO).await;

        let outcome = requester(&bus)
            .request(&remove_request(), RequestOptions::default())
            .await
            .unwrap();

        let RequestOutcome::Replies(deliveries) = &outcome else {
            panic!("expected replies, got {outcome:?}");
        };
        assert_eq!(deliveries.len(), 1);
        let reply = outcome.first_reply().unwrap();
        assert_eq!(reply.request, remove_request());
        assert_eq!(reply.error_code(), None);
    }

    #[tokio::test]
    async fn test_waits_for_expected_replies() {
        let bus = MemoryBus::new();
        spawn_responder(&bus, 3, Duration::from_millis(5)).await;

        let mut flags = Vec::new();
        requester(&bus)
            .send_with(
                &remove_request(),
                RequestOptions::default().with_expected_replies(3),
                |delivery, is_last| {
                    assert!(delivery.as_reply().is_some());
                    flags.push(is_last);
                    ControlFlow::Continue(())
                },
            )
            .await
            .unwrap();

        assert_eq!(flags, vec![false, false, true]);
    }

    #[tokio::test(start_paused = true)]
    async fn test_timeout_fires_once_at_deadline() {
        let bus = MemoryBus::new();
        // Subscribed but silent.
        let _silent = bus.subscribe(CH_BRAIN_TO_RES).await.unwrap();

        let started = Instant::now();
        let mut deliveries = Vec::new();
        requester(&bus)
            .send_with(
                &remove_request(),
                RequestOptions::default().with_timeout(REPLY_WAIT),
                |delivery, is_last| {
                    deliveries.push((delivery, is_last, started.elapsed()));
                    ControlFlow::Continue(())
                },
            )
            .await
            .unwrap();

        assert_eq!(deliveries.len(), 1);
        let (delivery, is_last, elapsed) = &deliveries[0];
        assert!(delivery.is_timeout());
        assert!(is_last);
        assert!(*elapsed >= REPLY_WAIT);
        assert!(*elapsed < Duration::from_millis(120));
        assert_eq!(delivery.to_json(), serde_json::json!({ "code": "REQ_TIMEOUT" }));
    }

    #[tokio::test(start_paused = true)]
    async fn test_late_reply_is_dropped() {
        let bus = MemoryBus::new();
        let _silent = bus.subscribe(CH_BRAIN_TO_RES).await.unwrap();
        let requester = requester(&bus);

        let mut pending = requester
            .start(
                &remove_request(),
                RequestOptions::default()
                    .with_timeout(REPLY_WAIT)
                    .with_expected_replies(2),
            )
            .await
            .unwrap();
        let inbox = pending.inbox().to_string();

        bus.publish(&inbox, removed_reply(remove_request())).await.unwrap();
        let (first, is_last) = pending.next().await.unwrap();
        assert!(first.as_reply().is_some());
        assert!(!is_last);

        let (timeout, is_last) = pending.next().await.unwrap();
        assert!(timeout.is_timeout());
        assert!(is_last);
        assert!(pending.is_closed());

        bus.publish(&inbox, removed_reply(remove_request())).await.unwrap();
        assert!(pending.next().await.is_none());
        assert_eq!(pending.received(), 1);
        assert_eq!(bus.subscriber_count(&inbox), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_partial_replies_then_timeout() {
        let bus = MemoryBus::new();
        spawn_responder(&bus, 1, Duration::ZERO).await;

        let outcome = requester(&bus)
            .request(
                &remove_request(),
                RequestOptions::default()
                    .with_timeout(REPLY_WAIT)
                    .with_expected_replies(2),
            )
            .await
            .unwrap();

        assert!(outcome.is_timed_out());
        assert_eq!(outcome.deliveries().len(), 1);
    }

    #[tokio::test]
    async fn test_malformed_reply_is_delivered_as_error() {
        let bus = MemoryBus::new();
        let mut sub = bus.subscribe(CH_BRAIN_TO_RES).await.unwrap();
        let responder = bus.clone();
        tokio::spawn(async move {
            let msg = sub.next().await.unwrap();
            responder
                .publish(&msg.reply.unwrap(), Bytes::from_static(b"<html>"))
                .await
                .unwrap();
        });

        let outcome = requester(&bus)
            .request(&remove_request(), RequestOptions::default())
            .await
            .unwrap();

        let RequestOutcome::Replies(deliveries) = outcome else {
            panic!("expected a delivery");
        };
        assert!(matches!(deliveries[0], Delivery::Malformed { .. }));
        assert!(deliveries[0].to_json()["error"]["message"].is_string());
    }

    #[tokio::test(start_paused = true)]
    async fn test_close_early_suppresses_timeout() {
        let bus = MemoryBus::new();
        spawn_responder(&bus, 1, Duration::ZERO).await;

        let mut seen = 0;
        requester(&bus)
            .send_with(
                &remove_request(),
                RequestOptions::default()
                    .with_timeout(REPLY_WAIT)
                    .with_expected_replies(5),
                |delivery, _| {
                    seen += 1;
                    assert!(!delivery.is_timeout());
                    ControlFlow::Break(())
                },
            )
            .await
            .unwrap();

        assert_eq!(seen, 1);
    }

    #[tokio::test]
    async fn test_error_reply_is_a_reply() {
        let bus = MemoryBus::new();
        let mut sub = bus.subscribe(CH_BRAIN_TO_RES).await.unwrap();
        let responder = bus.clone();
        tokio::spawn(async move {
            let msg = sub.next().await.unwrap();
            let request = Request::decode(&msg.payload).unwrap();
            let reply = Reply::error(request, ErrorCode::NotAvailable);
            responder
                .publish(&msg.reply.unwrap(), Bytes::from(reply.encode().unwrap()))
                .await
                .unwrap();
        });

        let outcome = requester(&bus)
            .request(&remove_request(), RequestOptions::default())
            .await
            .unwrap();
        assert_eq!(
            outcome.first_reply().unwrap().error_code(),
            Some(ErrorCode::NotAvailable)
        );
    }

    #[test]
    fn test_options_for_command() {
        assert_eq!(
            RequestOptions::for_command(CommandKind::RemoveWorker).timeout,
            Duration::from_millis(6000)
        );
        assert_eq!(
            RequestOptions::for_command(CommandKind::CreateWorker).timeout,
            Duration::from_millis(3000)
        );
        assert_eq!(RequestOptions::default().expected_replies, 1);
    }
}
