//! # Sync State
//!
//! Read-side projection of the queue for display, plus the events published
//! while draining.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tokio::sync::{broadcast, watch};

use crate::client::error::{StorageError, SyncError};
use crate::client::offline::{QueueStore, RetryPolicy};
use crate::client::sync::engine::{DrainReport, SyncEngine, Trigger};
use crate::shared::queue::EntityType;

/// Snapshot of the sync subsystem for display
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SyncStatus {
    pub is_online: bool,
    /// Items still queued, stalled ones included
    pub pending_count: usize,
    /// Items at the retry ceiling or rejected by the server
    pub stalled_count: usize,
    pub last_sync_at: Option<DateTime<Utc>>,
    pub is_syncing: bool,
    pub errors: Vec<String>,
}

/// One failure surfaced to the user, kept per queued item
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SyncErrorEntry {
    pub client_operation_id: String,
    pub entity_type: EntityType,
    pub message: String,
    pub attempts: u32,
    /// The item no longer retries automatically
    pub stalled: bool,
    pub at: DateTime<Utc>,
}

impl SyncErrorEntry {
    pub fn describe(&self) -> String {
        if self.stalled {
            let exhausted = SyncError::ExhaustedRetries {
                client_uuid: self.client_operation_id.clone(),
                attempts: self.attempts,
            };
            format!("{}: {}: {}", self.entity_type, exhausted, self.message)
        } else {
            format!(
                "{}: operation {} failed (attempt {}): {}",
                self.entity_type, self.client_operation_id, self.attempts, self.message
            )
        }
    }
}

/// Notifications published by the sync service
#[derive(Debug, Clone, PartialEq)]
pub enum SyncEvent {
    Enqueued { client_operation_id: String },
    Delivered { client_operation_id: String, replayed: bool },
    Failed { client_operation_id: String, attempts: u32, message: String },
    Stalled { client_operation_id: String, attempts: u32 },
    PassCompleted(DrainReport),
    ConnectivityChanged { online: bool },
    ErrorsCleared,
    Discarded { client_operation_id: String },
}

/// Projects queue state and exposes the manual "sync now" entry point
pub struct StatusReporter {
    store: Arc<dyn QueueStore>,
    engine: Arc<SyncEngine>,
    policy: RetryPolicy,
    status_tx: watch::Sender<SyncStatus>,
}

impl StatusReporter {
    pub fn new(store: Arc<dyn QueueStore>, engine: Arc<SyncEngine>, policy: RetryPolicy) -> Self {
        let (status_tx, _) = watch::channel(SyncStatus::default());
        Self {
            store,
            engine,
            policy,
            status_tx,
        }
    }

    /// Recompute the status from the store
    pub async fn status(&self) -> Result<SyncStatus, StorageError> {
        let items = self.store.list_all().await?;
        let stalled_count = items.iter().filter(|i| self.policy.is_stalled(i)).count();
        Ok(SyncStatus {
            is_online: self.engine.monitor().is_online(),
            pending_count: items.len(),
            stalled_count,
            last_sync_at: self.engine.last_sync_at().await,
            is_syncing: self.engine.is_draining(),
            errors: self.engine.errors().await,
        })
    }

    /// Recompute and push the status to subscribers
    pub async fn publish(&self) -> Result<SyncStatus, StorageError> {
        let status = self.status().await?;
        self.status_tx.send_replace(status.clone());
        Ok(status)
    }

    pub fn subscribe_status(&self) -> watch::Receiver<SyncStatus> {
        self.status_tx.subscribe()
    }

    pub fn subscribe_events(&self) -> broadcast::Receiver<SyncEvent> {
        self.engine.subscribe()
    }

    /// Manual trigger; resolves once the pass (or the no-op) is done
    pub async fn sync_now(&self) -> Option<DrainReport> {
        let report = self.engine.drain(Trigger::Manual).await;
        let _ = self.publish().await;
        report
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_entry_description() {
        let entry = SyncErrorEntry {
            client_operation_id: "c-1".to_string(),
            entity_type: EntityType::Attendance,
            message: "HTTP 503: unavailable".to_string(),
            attempts: 5,
            stalled: true,
            at: Utc::now(),
        };
        assert_eq!(
            entry.describe(),
            "attendance: Operation c-1 failed after 5 attempts: HTTP 503: unavailable"
        );
    }
}
