//! Sync engine integration tests
//!
//! Drain behaviour against an in-memory queue and a scripted endpoint:
//! ordering, single-flight passes, the retry ceiling, replays after a lost
//! response, terminal rejections, the pass deadline and the reconnect path.

mod common;

use assert_matches::assert_matches;
use pretty_assertions::assert_eq;
use std::sync::Arc;
use std::time::Duration;

use attendance_sync::client::offline::{QueueStore, RetryPolicy};
use attendance_sync::client::sync::{SyncEngine, SyncEvent, Trigger};
use attendance_sync::client::{ConnectivityMonitor, DeliveryError, MemoryQueueStore, SyncConfig, SyncService};
use attendance_sync::client::error::SyncError;
use attendance_sync::shared::{CheckIn, CheckInMethod, ServiceType};
use common::{check_in_item, service_date, ScriptedTransport, Step};

fn engine(
    store: &Arc<MemoryQueueStore>,
    transport: &Arc<ScriptedTransport>,
    online: bool,
) -> SyncEngine {
    SyncEngine::new(
        store.clone(),
        transport.clone(),
        Arc::new(ConnectivityMonitor::new(online)),
    )
}

#[tokio::test]
async fn test_items_are_delivered_oldest_first() {
    let store = Arc::new(MemoryQueueStore::new());
    let transport = Arc::new(ScriptedTransport::serving());

    // Enqueued out of order on purpose
    store.enqueue(&check_in_item("m-3", "c-3", 30)).await.unwrap();
    store.enqueue(&check_in_item("m-1", "c-1", 10)).await.unwrap();
    store.enqueue(&check_in_item("m-2", "c-2", 20)).await.unwrap();

    let report = engine(&store, &transport, true)
        .drain(Trigger::Manual)
        .await
        .unwrap();

    assert_eq!(transport.delivered_uuids(), vec!["c-1", "c-2", "c-3"]);
    assert_eq!(report.delivered, 3);
    assert_eq!(store.count().await.unwrap(), 0);
}

#[tokio::test]
async fn test_only_one_pass_runs_at_a_time() {
    let store = Arc::new(MemoryQueueStore::new());
    let transport = Arc::new(ScriptedTransport::serving().with_delay(Duration::from_millis(50)));
    for i in 0..3 {
        store
            .enqueue(&check_in_item(&format!("m-{}", i), &format!("c-{}", i), i))
            .await
            .unwrap();
    }
    let engine = engine(&store, &transport, true);

    let (first, second) = tokio::join!(engine.drain(Trigger::Timer), engine.drain(Trigger::Manual));

    // Exactly one of the two triggers ran a pass
    assert_eq!(first.is_some() as u8 + second.is_some() as u8, 1);
    assert_eq!(transport.max_in_flight(), 1);
    assert_eq!(transport.attempts(), 3);
    assert!(!engine.is_draining());
}

#[tokio::test]
async fn test_retry_ceiling_stops_automatic_attempts() {
    let store = Arc::new(MemoryQueueStore::new());
    let transport = Arc::new(ScriptedTransport::failing(DeliveryError::from_status(503, "down")));
    store.enqueue(&check_in_item("m-1", "c-1", 0)).await.unwrap();
    let engine = engine(&store, &transport, true).with_policy(RetryPolicy::new(5));

    for _ in 0..5 {
        engine.drain(Trigger::Timer).await.unwrap();
    }
    assert_eq!(transport.attempts(), 5);

    // Sixth pass leaves the stalled item alone
    let report = engine.drain(Trigger::Timer).await.unwrap();
    assert_eq!(report.attempted, 0);
    assert_eq!(report.skipped, 1);
    assert_eq!(transport.attempts(), 5);

    let errors = engine.errors().await;
    assert_eq!(errors.len(), 1);
    assert!(errors[0].contains("Operation c-1 failed after 5 attempts"), "{}", errors[0]);
    assert_eq!(store.get("c-1").await.unwrap().unwrap().retry_count, 5);

    // Clearing re-arms the item for exactly one more attempt
    let report = engine.clear_errors().await.unwrap().unwrap();
    assert_eq!(report.attempted, 1);
    assert_eq!(transport.attempts(), 6);
    assert_eq!(store.get("c-1").await.unwrap().unwrap().retry_count, 1);
}

#[tokio::test]
async fn test_lost_response_is_not_double_counted() {
    let store = Arc::new(MemoryQueueStore::new());
    let transport = Arc::new(ScriptedTransport::serving().then(Step::ApplyThenDrop));
    store.enqueue(&check_in_item("m-1", "c-1", 0)).await.unwrap();
    let engine = engine(&store, &transport, true);

    let first = engine.drain(Trigger::Timer).await.unwrap();
    assert_eq!(first.failed, 1);
    assert_eq!(store.count().await.unwrap(), 1);

    let second = engine.drain(Trigger::Timer).await.unwrap();
    assert_eq!(second.delivered, 1);
    assert_eq!(second.replayed, 1);

    assert_eq!(transport.delivered_uuids(), vec!["c-1", "c-1"]);
    assert_eq!(transport.applied_count(), 1);
    assert_eq!(store.count().await.unwrap(), 0);
    assert!(engine.errors().await.is_empty());
}

#[tokio::test]
async fn test_rejected_payload_is_parked_and_later_items_continue() {
    let store = Arc::new(MemoryQueueStore::new());
    let transport = Arc::new(
        ScriptedTransport::serving()
            .then(Step::Fail(DeliveryError::from_status(400, "Invalid payload: bad date"))),
    );
    store.enqueue(&check_in_item("m-1", "c-1", 0)).await.unwrap();
    store.enqueue(&check_in_item("m-2", "c-2", 1)).await.unwrap();
    let engine = engine(&store, &transport, true);

    let report = engine.drain(Trigger::Manual).await.unwrap();
    assert_eq!(report.failed, 1);
    assert_eq!(report.newly_stalled, 1);
    assert_eq!(report.delivered, 1);

    let parked = store.get("c-1").await.unwrap().unwrap();
    assert!(parked.terminal);
    assert_eq!(store.get("c-2").await.unwrap(), None);

    // Not retried automatically
    engine.drain(Trigger::Timer).await.unwrap();
    assert_eq!(transport.attempts(), 2);

    let discarded = engine.discard("c-1").await.unwrap();
    assert_eq!(discarded.client_operation_id, "c-1");
    assert_eq!(store.count().await.unwrap(), 0);
    assert!(engine.errors().await.is_empty());
}

#[tokio::test]
async fn test_validation_errors_retry_when_configured() {
    let store = Arc::new(MemoryQueueStore::new());
    let transport = Arc::new(ScriptedTransport::failing(DeliveryError::from_status(422, "nope")));
    store.enqueue(&check_in_item("m-1", "c-1", 0)).await.unwrap();
    let policy = RetryPolicy {
        retry_validation_errors: true,
        ..RetryPolicy::new(3)
    };
    let engine = engine(&store, &transport, true).with_policy(policy);

    engine.drain(Trigger::Timer).await.unwrap();
    let item = store.get("c-1").await.unwrap().unwrap();
    assert!(!item.terminal);
    assert_eq!(item.retry_count, 1);
}

#[tokio::test]
async fn test_deadline_defers_remaining_items() {
    let store = Arc::new(MemoryQueueStore::new());
    let transport = Arc::new(ScriptedTransport::serving().with_delay(Duration::from_millis(80)));
    for i in 0..3 {
        store
            .enqueue(&check_in_item(&format!("m-{}", i), &format!("c-{}", i), i))
            .await
            .unwrap();
    }
    let engine = engine(&store, &transport, true).with_drain_deadline(Duration::from_millis(20));

    let report = engine.drain(Trigger::Timer).await.unwrap();
    assert!(report.deadline_exceeded);
    assert_eq!(report.attempted, 1);
    assert_eq!(report.deferred, 2);
    assert_eq!(store.count().await.unwrap(), 2);
}

#[tokio::test]
async fn test_offline_drain_leaves_queue_untouched() {
    let store = Arc::new(MemoryQueueStore::new());
    let transport = Arc::new(ScriptedTransport::serving());
    store.enqueue(&check_in_item("m-1", "c-1", 0)).await.unwrap();

    assert!(engine(&store, &transport, false).drain(Trigger::Manual).await.is_none());
    assert_eq!(transport.attempts(), 0);
    assert_eq!(store.count().await.unwrap(), 1);
}

#[tokio::test]
async fn test_discard_of_active_item_is_refused() {
    let store = Arc::new(MemoryQueueStore::new());
    let transport = Arc::new(ScriptedTransport::serving());
    store.enqueue(&check_in_item("m-1", "c-1", 0)).await.unwrap();

    let err = engine(&store, &transport, false).discard("c-1").await.unwrap_err();
    assert_matches!(err, SyncError::NotStalled(id) if id == "c-1");
}

fn fast_config() -> SyncConfig {
    SyncConfig {
        sync_interval: Duration::from_secs(3600),
        reconnect_debounce: Duration::from_millis(100),
        ..SyncConfig::default()
    }
}

#[tokio::test]
async fn test_reconnect_delivers_queued_check_in() {
    let store = Arc::new(MemoryQueueStore::new());
    let transport = Arc::new(ScriptedTransport::serving());
    let monitor = Arc::new(ConnectivityMonitor::new(false));
    store.enqueue(&check_in_item("m-1", "c-1", 0)).await.unwrap();

    let service = SyncService::new(fast_config(), store.clone(), transport.clone(), monitor.clone());
    service.init().await.unwrap();
    let mut status = service.subscribe_status();

    let before = service.status().await.unwrap();
    assert_eq!(before.pending_count, 1);
    assert!(!before.is_online);

    monitor.set_online(true);
    let settled = tokio::time::timeout(
        Duration::from_secs(5),
        status.wait_for(|s| s.pending_count == 0 && s.last_sync_at.is_some()),
    )
    .await
    .expect("reconnect pass did not run")
    .unwrap()
    .clone();

    assert!(settled.errors.is_empty());
    assert!(settled.is_online);

    let requests = transport.requests();
    assert_eq!(requests.len(), 1);
    assert_eq!(requests[0].client_uuid, "c-1");
    assert_eq!(requests[0].table_name, "attendance");
    assert_eq!(requests[0].data["member_id"], "m-1");
    assert_eq!(requests[0].data["service_date"], "2025-09-28");

    service.dispose().await;
}

#[tokio::test]
async fn test_flapping_connection_drains_once() {
    let store = Arc::new(MemoryQueueStore::new());
    let transport = Arc::new(ScriptedTransport::serving());
    let monitor = Arc::new(ConnectivityMonitor::new(false));
    store.enqueue(&check_in_item("m-1", "c-1", 0)).await.unwrap();

    let service = SyncService::new(fast_config(), store.clone(), transport.clone(), monitor.clone());
    let mut events = service.subscribe_events();
    service.init().await.unwrap();

    monitor.set_online(true);
    tokio::time::sleep(Duration::from_millis(20)).await;
    monitor.set_online(false);
    tokio::time::sleep(Duration::from_millis(20)).await;
    monitor.set_online(true);
    tokio::time::sleep(Duration::from_millis(400)).await;

    let mut reconnect_passes = 0;
    while let Ok(event) = events.try_recv() {
        if let SyncEvent::PassCompleted(report) = event {
            if report.trigger == Trigger::Reconnect {
                reconnect_passes += 1;
            }
        }
    }
    assert_eq!(reconnect_passes, 1);
    assert_eq!(transport.attempts(), 1);

    service.dispose().await;
}

#[tokio::test]
async fn test_check_remote_reports_processed_token() {
    let store = Arc::new(MemoryQueueStore::new());
    let transport = Arc::new(ScriptedTransport::serving());
    let monitor = Arc::new(ConnectivityMonitor::new(true));
    store.enqueue(&check_in_item("m-1", "c-1", 0)).await.unwrap();

    let service = SyncService::new(fast_config(), store.clone(), transport.clone(), monitor);
    service.sync_now().await.unwrap();

    let remote = service.check_remote("c-1").await.unwrap();
    assert!(remote.synced);
    assert!(!service.check_remote("c-404").await.unwrap().synced);
}

#[tokio::test]
async fn test_status_tracks_pending_and_stalled_items() {
    let store = Arc::new(MemoryQueueStore::new());
    // First delivery succeeds, every later one is refused
    let transport = Arc::new(
        ScriptedTransport::failing(DeliveryError::from_status(503, "down")).then(Step::Serve),
    );
    let monitor = Arc::new(ConnectivityMonitor::new(true));
    store.enqueue(&check_in_item("m-1", "c-1", 0)).await.unwrap();
    store.enqueue(&check_in_item("m-2", "c-2", 10)).await.unwrap();

    let service = SyncService::new(fast_config(), store.clone(), transport.clone(), monitor);
    assert_eq!(service.status().await.unwrap().pending_count, 2);

    for _ in 0..fast_config().max_retries {
        service.sync_now().await.unwrap();
    }
    // At the ceiling the item is no longer attempted
    service.sync_now().await.unwrap();

    let status = service.status().await.unwrap();
    assert_eq!(status.pending_count, 1);
    assert_eq!(status.stalled_count, 1);
    assert_eq!(status.errors.len(), 1);
    assert!(status.errors[0].contains("Operation c-2 failed after 5 attempts"), "{}", status.errors[0]);
    assert_eq!(transport.attempts(), 1 + fast_config().max_retries as usize);
}

#[tokio::test]
async fn test_clear_errors_while_offline_defers_the_retry() {
    let store = Arc::new(MemoryQueueStore::new());
    let transport = Arc::new(ScriptedTransport::failing(DeliveryError::from_status(503, "down")));
    store.enqueue(&check_in_item("m-1", "c-1", 0)).await.unwrap();
    let engine = engine(&store, &transport, true).with_policy(RetryPolicy::new(2));
    engine.drain(Trigger::Timer).await.unwrap();
    engine.drain(Trigger::Timer).await.unwrap();
    assert_eq!(store.get("c-1").await.unwrap().unwrap().retry_count, 2);

    engine.monitor().set_online(false);
    let report = engine.clear_errors().await.unwrap();
    assert!(report.is_none());
    assert_eq!(transport.attempts(), 2);
    assert!(engine.errors().await.is_empty());
    assert_eq!(store.get("c-1").await.unwrap().unwrap().retry_count, 0);

    // The re-armed item goes out with the next pass
    engine.monitor().set_online(true);
    let report = engine.drain(Trigger::Reconnect).await.unwrap();
    assert_eq!(report.attempted, 1);
    assert_eq!(transport.attempts(), 3);
}

#[tokio::test]
async fn test_dispose_waits_for_pass_started_by_enqueue() {
    let store = Arc::new(MemoryQueueStore::new());
    let transport = Arc::new(ScriptedTransport::serving().with_delay(Duration::from_millis(100)));
    let monitor = Arc::new(ConnectivityMonitor::new(true));
    let service = SyncService::new(fast_config(), store.clone(), transport.clone(), monitor);

    service
        .record_check_in(CheckIn::member("m-1", service_date(), ServiceType::SundayService, CheckInMethod::Qr))
        .await
        .unwrap();
    service.dispose().await;

    assert_eq!(transport.attempts(), 1);
    assert_eq!(store.count().await.unwrap(), 0);
}
