//! Reply deadlines, on a paused clock.

mod common;

use common::{Harness, IMAGE};
use jagereye_bus::{Bus, MemoryBus, RequestOptions, Requester};
use jagereye_protocol::{CH_BRAIN_TO_RES, Command, CreateWorkerResponse, WorkerStatus};
use jagereye_resmgr::ResourceClient;
use jagereye_worker::RuntimeOp;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::Instant;

#[tokio::test(start_paused = true)]
async fn test_times_out_without_resource_manager() {
    let bus = MemoryBus::new();
    let client = ResourceClient::new(Arc::new(bus)).with_timeout(Duration::from_millis(100));

    let started = Instant::now();
    let outcome = client.create_worker(IMAGE).await.unwrap();

    assert!(outcome.is_timed_out());
    assert!(outcome.deliveries().is_empty());
    let elapsed = started.elapsed();
    assert!(elapsed >= Duration::from_millis(100));
    assert!(elapsed < Duration::from_millis(120));
}

#[tokio::test(start_paused = true)]
async fn test_remove_waits_longer_by_default() {
    let bus = MemoryBus::new();
    let client = ResourceClient::new(Arc::new(bus));

    let started = Instant::now();
    let outcome = client
        .remove_worker(jagereye_protocol::WorkerId::from_string("worker_x"))
        .await
        .unwrap();

    assert!(outcome.is_timed_out());
    assert!(started.elapsed() >= Duration::from_secs(6));
}

#[tokio::test(start_paused = true)]
async fn test_removal_completes_after_caller_timeout() {
    let h = Harness::with_defaults().await;
    let outcome = h.client.create_worker(IMAGE).await.unwrap();
    let id = outcome
        .first_reply()
        .unwrap()
        .response_as::<CreateWorkerResponse>()
        .unwrap()
        .unwrap()
        .worker_id;
    h.wait_for_status(&id, Some(WorkerStatus::Running)).await;
    h.runtime.delay(RuntimeOp::Remove, Duration::from_millis(500));

    let impatient = h.client.clone().with_timeout(Duration::from_millis(100));
    let outcome = impatient.remove_worker(id.clone()).await.unwrap();
    assert!(outcome.is_timed_out());

    // The late REMOVED reply is dropped; the removal itself still happens.
    h.wait_for_status(&id, None).await;
    assert!(h.runtime.container(&id).is_none());

    h.stop().await;
}

#[tokio::test(start_paused = true)]
async fn test_late_reply_is_not_delivered() {
    let bus = MemoryBus::new();
    let requester = Requester::new(Arc::new(bus.clone()), CH_BRAIN_TO_RES);
    let mut commands = bus.subscribe(CH_BRAIN_TO_RES).await.unwrap();

    let request = Command::create_worker(IMAGE).into_request();
    let mut pending = requester
        .start(&request, RequestOptions::default().with_timeout(Duration::from_millis(100)))
        .await
        .unwrap();
    let inbox = commands.next().await.unwrap().reply.unwrap();

    let (delivery, is_last) = pending.next().await.unwrap();
    assert!(delivery.is_timeout());
    assert!(is_last);

    bus.publish(&inbox, bytes::Bytes::from_static(b"{}")).await.unwrap();
    assert!(pending.next().await.is_none());
    assert_eq!(bus.subscriber_count(&inbox), 0);
}
