//! # Sync Engine
//!
//! Drains the offline queue against the reconciliation endpoint, one item at
//! a time, oldest first.
//!
//! A pass is guarded by an atomic flag: a trigger that arrives while another
//! pass is awaiting I/O returns immediately instead of starting a second
//! drain. The flag is released by a guard, so an early return or a panic in
//! the pass cannot leave it set.
//!
//! Failed items stay queued with their retry count incremented. An item that
//! reaches the ceiling, or that the server rejected as invalid, is "stalled":
//! it is skipped by later passes and listed in the error list until the user
//! clears errors or discards it.

use chrono::{DateTime, Utc};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::{broadcast, RwLock};
use tracing::{debug, error, info, warn};

use crate::client::api::ReconciliationTransport;
use crate::client::error::{DeliveryError, StorageError, SyncError};
use crate::client::offline::{QueueStore, RetryPolicy, SyncMetadata};
use crate::client::sync::network_monitor::ConnectivityMonitor;
use crate::client::sync::sync_state::{SyncErrorEntry, SyncEvent};
use crate::shared::queue::{sort_for_delivery, QueueItem};

/// Default upper bound on the duration of one pass
pub const DEFAULT_DRAIN_DEADLINE: Duration = Duration::from_secs(120);

const EVENT_CAPACITY: usize = 256;

/// What started a drain pass
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Trigger {
    Timer,
    Reconnect,
    Manual,
    Enqueue,
}

/// Outcome of one drain pass
#[derive(Debug, Clone, PartialEq)]
pub struct DrainReport {
    pub trigger: Trigger,
    /// Items sent to the server
    pub attempted: usize,
    /// Items the server confirmed, replays included
    pub delivered: usize,
    /// Confirmations that were idempotent replays
    pub replayed: usize,
    pub failed: usize,
    /// Items that became stalled during this pass
    pub newly_stalled: usize,
    /// Stalled items left alone
    pub skipped: usize,
    /// Items not attempted because the pass stopped early
    pub deferred: usize,
    pub deadline_exceeded: bool,
    pub duration: Duration,
}

impl DrainReport {
    fn new(trigger: Trigger) -> Self {
        Self {
            trigger,
            attempted: 0,
            delivered: 0,
            replayed: 0,
            failed: 0,
            newly_stalled: 0,
            skipped: 0,
            deferred: 0,
            deadline_exceeded: false,
            duration: Duration::ZERO,
        }
    }
}

#[derive(Debug, Default)]
struct EngineState {
    errors: Vec<SyncErrorEntry>,
    last_sync_at: Option<DateTime<Utc>>,
}

impl EngineState {
    fn upsert_error(&mut self, entry: SyncErrorEntry) {
        match self
            .errors
            .iter_mut()
            .find(|e| e.client_operation_id == entry.client_operation_id)
        {
            Some(existing) => *existing = entry,
            None => self.errors.push(entry),
        }
    }

    fn remove_error(&mut self, client_operation_id: &str) {
        self.errors
            .retain(|e| e.client_operation_id != client_operation_id);
    }
}

/// Resets the drain flag when a pass ends
struct DrainGuard<'a> {
    flag: &'a AtomicBool,
}

impl Drop for DrainGuard<'_> {
    fn drop(&mut self) {
        self.flag.store(false, Ordering::Release);
    }
}

/// Queue drainer
pub struct SyncEngine {
    store: Arc<dyn QueueStore>,
    transport: Arc<dyn ReconciliationTransport>,
    monitor: Arc<ConnectivityMonitor>,
    policy: RetryPolicy,
    drain_deadline: Duration,
    draining: AtomicBool,
    state: RwLock<EngineState>,
    events: broadcast::Sender<SyncEvent>,
}

impl SyncEngine {
    pub fn new(
        store: Arc<dyn QueueStore>,
        transport: Arc<dyn ReconciliationTransport>,
        monitor: Arc<ConnectivityMonitor>,
    ) -> Self {
        let (events, _) = broadcast::channel(EVENT_CAPACITY);
        Self {
            store,
            transport,
            monitor,
            policy: RetryPolicy::default(),
            drain_deadline: DEFAULT_DRAIN_DEADLINE,
            draining: AtomicBool::new(false),
            state: RwLock::new(EngineState::default()),
            events,
        }
    }

    pub fn with_policy(mut self, policy: RetryPolicy) -> Self {
        self.policy = policy;
        self
    }

    pub fn with_drain_deadline(mut self, deadline: Duration) -> Self {
        self.drain_deadline = deadline;
        self
    }

    pub fn monitor(&self) -> &Arc<ConnectivityMonitor> {
        &self.monitor
    }

    pub fn policy(&self) -> RetryPolicy {
        self.policy
    }

    pub fn is_draining(&self) -> bool {
        self.draining.load(Ordering::Acquire)
    }

    pub async fn last_sync_at(&self) -> Option<DateTime<Utc>> {
        self.state.read().await.last_sync_at
    }

    /// Human-readable error list
    pub async fn errors(&self) -> Vec<String> {
        self.state
            .read()
            .await
            .errors
            .iter()
            .map(SyncErrorEntry::describe)
            .collect()
    }

    pub async fn error_entries(&self) -> Vec<SyncErrorEntry> {
        self.state.read().await.errors.clone()
    }

    pub fn subscribe(&self) -> broadcast::Receiver<SyncEvent> {
        self.events.subscribe()
    }

    pub(crate) fn emit(&self, event: SyncEvent) {
        // No subscribers is fine
        let _ = self.events.send(event);
    }

    fn try_begin(&self) -> Option<DrainGuard<'_>> {
        self.draining
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .ok()
            .map(|_| DrainGuard {
                flag: &self.draining,
            })
    }

    /// Load persisted metadata and surface items that were already stalled
    pub async fn restore(&self) -> Result<(), StorageError> {
        let metadata = self.store.load_metadata().await?;
        let items = self.store.list_all().await?;

        let mut state = self.state.write().await;
        state.last_sync_at = metadata.last_sync_at;
        for item in items.iter().filter(|i| self.policy.is_stalled(i)) {
            state.upsert_error(SyncErrorEntry {
                client_operation_id: item.client_operation_id.clone(),
                entity_type: item.entity_type,
                message: item
                    .last_error
                    .clone()
                    .unwrap_or_else(|| "delivery failed".to_string()),
                attempts: item.retry_count,
                stalled: true,
                at: Utc::now(),
            });
        }
        Ok(())
    }

    /// Persist connectivity and last sync time
    pub async fn save_metadata(&self) -> Result<(), StorageError> {
        let metadata = SyncMetadata {
            last_sync_at: self.last_sync_at().await,
            is_online: self.monitor.is_online(),
        };
        self.store.save_metadata(&metadata).await
    }

    /// Run one drain pass
    ///
    /// Returns `None` without touching the queue when offline or when another
    /// pass is already running.
    pub async fn drain(&self, trigger: Trigger) -> Option<DrainReport> {
        if !self.monitor.is_online() {
            debug!("Skipping {:?} drain: offline", trigger);
            return None;
        }
        let Some(_guard) = self.try_begin() else {
            debug!("Skipping {:?} drain: pass already running", trigger);
            return None;
        };

        let started = Instant::now();
        let mut report = DrainReport::new(trigger);

        let mut items = match self.store.list_all().await {
            Ok(items) => items,
            Err(e) => {
                error!("Failed to read offline queue: {}", e);
                return None;
            }
        };
        sort_for_delivery(&mut items);

        for (index, item) in items.iter().enumerate() {
            if self.policy.is_stalled(item) {
                report.skipped += 1;
                continue;
            }

            let deadline_hit = started.elapsed() >= self.drain_deadline;
            if deadline_hit || !self.monitor.is_online() {
                report.deadline_exceeded = deadline_hit;
                report.deferred = items[index..]
                    .iter()
                    .filter(|i| !self.policy.is_stalled(i))
                    .count();
                if deadline_hit {
                    warn!(
                        "Drain deadline of {:?} reached, deferring {} item(s)",
                        self.drain_deadline, report.deferred
                    );
                } else {
                    info!("Connectivity lost mid-pass, deferring {} item(s)", report.deferred);
                }
                break;
            }

            report.attempted += 1;
            debug!(
                "Delivering {} {} ({})",
                item.entity_type, item.client_operation_id, item.operation_kind
            );

            match self.transport.deliver(&item.to_request()).await {
                Ok(response) => {
                    self.confirm(item).await;
                    report.delivered += 1;
                    if response.is_replay() {
                        report.replayed += 1;
                    }
                    self.emit(SyncEvent::Delivered {
                        client_operation_id: item.client_operation_id.clone(),
                        replayed: response.is_replay(),
                    });
                }
                Err(err) => {
                    report.failed += 1;
                    if self.record_failure(item, &err).await {
                        report.newly_stalled += 1;
                    }
                }
            }
        }

        let now = Utc::now();
        {
            let mut state = self.state.write().await;
            state.last_sync_at = Some(now);
            if report.failed == 0 {
                state.errors.retain(|e| e.stalled);
            }
        }
        if let Err(e) = self.save_metadata().await {
            error!("Failed to persist sync metadata: {}", e);
        }

        report.duration = started.elapsed();
        info!(
            "Sync pass ({:?}) finished: {} attempted, {} delivered, {} failed, {} skipped in {:?}",
            trigger,
            report.attempted,
            report.delivered,
            report.failed,
            report.skipped,
            report.duration
        );
        self.emit(SyncEvent::PassCompleted(report.clone()));
        Some(report)
    }

    async fn confirm(&self, item: &QueueItem) {
        if let Err(e) = self.store.remove(&item.client_operation_id).await {
            // The server already has it; a redelivery will be answered as a replay
            error!(
                "Delivered {} but failed to remove it from the queue: {}",
                item.client_operation_id, e
            );
        }
        self.state
            .write()
            .await
            .remove_error(&item.client_operation_id);
    }

    /// Record a failed delivery; returns whether the item became stalled
    async fn record_failure(&self, item: &QueueItem, err: &DeliveryError) -> bool {
        let key = &item.client_operation_id;
        let message = err.to_string();
        let ceiling = self.policy.max_retries;

        let (attempts, stalled) = if self.policy.is_terminal(err) {
            if let Err(e) = self.store.mark_terminal(key, &message).await {
                error!("Failed to park rejected item {}: {}", key, e);
            }
            warn!("Server rejected {}: {}", key, message);
            (item.retry_count + 1, true)
        } else {
            match self.store.increment_retry(key, &message, ceiling).await {
                Ok(Some(count)) => {
                    warn!("Delivery of {} failed (attempt {}): {}", key, count, message);
                    (count, count >= ceiling)
                }
                Ok(None) => {
                    debug!("Item {} left the queue during delivery", key);
                    return false;
                }
                Err(e) => {
                    error!("Failed to record retry for {}: {}", key, e);
                    (item.retry_count + 1, false)
                }
            }
        };

        self.state.write().await.upsert_error(SyncErrorEntry {
            client_operation_id: key.clone(),
            entity_type: item.entity_type,
            message: message.clone(),
            attempts,
            stalled,
            at: Utc::now(),
        });

        self.emit(SyncEvent::Failed {
            client_operation_id: key.clone(),
            attempts,
            message,
        });
        if stalled {
            self.emit(SyncEvent::Stalled {
                client_operation_id: key.clone(),
                attempts,
            });
        }
        stalled
    }

    /// Reset stalled items, clear the error list and run one pass
    ///
    /// When offline or while another pass runs, the re-armed items are picked
    /// up by the next pass instead and `None` is returned.
    pub async fn clear_errors(&self) -> Result<Option<DrainReport>, StorageError> {
        let items = self.store.list_all().await?;
        let mut reset = 0;
        for item in items.iter().filter(|i| self.policy.is_stalled(i)) {
            if self.store.reset_retry(&item.client_operation_id).await? {
                reset += 1;
            }
        }
        self.state.write().await.errors.clear();
        info!("Cleared sync errors, {} stalled item(s) re-armed", reset);
        self.emit(SyncEvent::ErrorsCleared);

        let report = self.drain(Trigger::Manual).await;
        if report.is_none() && reset > 0 {
            info!("Re-armed items will be retried on the next sync pass");
        }
        Ok(report)
    }

    /// Drop a stalled item from the queue
    pub async fn discard(&self, client_operation_id: &str) -> Result<QueueItem, SyncError> {
        let item = self
            .store
            .get(client_operation_id)
            .await?
            .ok_or_else(|| SyncError::NotFound(client_operation_id.to_string()))?;
        if !self.policy.is_stalled(&item) {
            return Err(SyncError::NotStalled(client_operation_id.to_string()));
        }

        self.store.remove(client_operation_id).await?;
        self.state.write().await.remove_error(client_operation_id);
        warn!(
            "Discarded {} {} after {} attempt(s)",
            item.entity_type, client_operation_id, item.retry_count
        );
        self.emit(SyncEvent::Discarded {
            client_operation_id: client_operation_id.to_string(),
        });
        Ok(item)
    }
}
