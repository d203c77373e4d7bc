//! Reconciliation Module
//!
//! Server side of `/api/sync`: applies queued client writes exactly once per
//! `client_uuid` and answers status queries about them.
//!
//! # Module Structure
//!
//! ```text
//! sync/
//! ├── mod.rs          - SyncRepository contract, in-memory repository
//! ├── db.rs           - PostgreSQL repository
//! └── handlers.rs     - POST/GET /api/sync handlers
//! ```
//!
//! # Idempotency
//!
//! Every applied write leaves a row in the sync log keyed by `client_uuid`.
//! The log row and the write commit together, so a redelivered operation
//! either finds the log row (replay) or loses the race on its unique key and
//! is answered as a replay as well.

pub mod db;
pub mod handlers;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::collections::HashMap;
use tokio::sync::Mutex;

use crate::backend::error::BackendError;
use crate::shared::sync::SyncOperation;

pub use db::PgSyncRepository;
pub use handlers::{get_sync_status, post_sync};

/// One processed `client_uuid`
#[derive(Debug, Clone, PartialEq)]
pub struct SyncLogEntry {
    pub client_uuid: String,
    pub table_name: String,
    pub operation: SyncOperation,
    pub record_id: Option<String>,
    pub actor_id: String,
    pub synced_at: DateTime<Utc>,
}

/// A validated write ready to be applied
#[derive(Debug, Clone, PartialEq)]
pub struct PendingWrite {
    pub table_name: String,
    pub operation: SyncOperation,
    pub record_id: String,
    pub data: serde_json::Value,
    pub client_uuid: String,
    pub actor_id: String,
}

/// Result of applying a write
#[derive(Debug, Clone, PartialEq)]
pub enum ApplyOutcome {
    /// First application; carries the stored record
    Applied(serde_json::Value),
    /// Another delivery of the same `client_uuid` got there first
    Replayed(SyncLogEntry),
}

/// Storage behind the reconciliation endpoint
#[async_trait]
pub trait SyncRepository: Send + Sync {
    async fn find_log(&self, client_uuid: &str) -> Result<Option<SyncLogEntry>, BackendError>;

    /// Apply the write and record its log entry atomically
    async fn apply(&self, write: PendingWrite) -> Result<ApplyOutcome, BackendError>;

    /// Whether a live (not deleted) record exists
    async fn record_exists(&self, table_name: &str, id: &str) -> Result<bool, BackendError>;
}

#[derive(Debug, Clone)]
struct StoredRecord {
    data: serde_json::Value,
    deleted: bool,
}

#[derive(Debug, Default)]
struct MemoryState {
    records: HashMap<(String, String), StoredRecord>,
    log: HashMap<String, SyncLogEntry>,
}

/// Repository used when no database is configured
#[derive(Debug, Default)]
pub struct MemorySyncRepository {
    state: Mutex<MemoryState>,
}

impl MemorySyncRepository {
    pub fn new() -> Self {
        Self::default()
    }
}

/// Shallow merge of `patch` into `target`, both JSON objects
pub(crate) fn merge_objects(target: &mut serde_json::Value, patch: &serde_json::Value) {
    if let (Some(target), Some(patch)) = (target.as_object_mut(), patch.as_object()) {
        for (key, value) in patch {
            target.insert(key.clone(), value.clone());
        }
    }
}

#[async_trait]
impl SyncRepository for MemorySyncRepository {
    async fn find_log(&self, client_uuid: &str) -> Result<Option<SyncLogEntry>, BackendError> {
        Ok(self.state.lock().await.log.get(client_uuid).cloned())
    }

    async fn apply(&self, write: PendingWrite) -> Result<ApplyOutcome, BackendError> {
        // Single lock for the check, the write and the log entry
        let mut state = self.state.lock().await;
        if let Some(entry) = state.log.get(&write.client_uuid) {
            return Ok(ApplyOutcome::Replayed(entry.clone()));
        }

        let key = (write.table_name.clone(), write.record_id.clone());
        let record = match write.operation {
            SyncOperation::Insert => {
                if state.records.contains_key(&key) {
                    return Err(BackendError::handler(
                        axum::http::StatusCode::CONFLICT,
                        format!("Record {} already exists in {}", write.record_id, write.table_name),
                    ));
                }
                state.records.insert(
                    key,
                    StoredRecord {
                        data: write.data.clone(),
                        deleted: false,
                    },
                );
                write.data.clone()
            }
            SyncOperation::Update => {
                let stored = state
                    .records
                    .get_mut(&key)
                    .filter(|r| !r.deleted)
                    .ok_or_else(|| not_found(&write))?;
                merge_objects(&mut stored.data, &write.data);
                stored.data.clone()
            }
            SyncOperation::Delete => {
                let stored = state
                    .records
                    .get_mut(&key)
                    .filter(|r| !r.deleted)
                    .ok_or_else(|| not_found(&write))?;
                stored.deleted = true;
                stored.data.clone()
            }
        };

        state.log.insert(
            write.client_uuid.clone(),
            SyncLogEntry {
                client_uuid: write.client_uuid,
                table_name: write.table_name,
                operation: write.operation,
                record_id: Some(write.record_id),
                actor_id: write.actor_id,
                synced_at: Utc::now(),
            },
        );
        Ok(ApplyOutcome::Applied(record))
    }

    async fn record_exists(&self, table_name: &str, id: &str) -> Result<bool, BackendError> {
        let state = self.state.lock().await;
        Ok(state
            .records
            .get(&(table_name.to_string(), id.to_string()))
            .is_some_and(|r| !r.deleted))
    }
}

pub(crate) fn not_found(write: &PendingWrite) -> BackendError {
    BackendError::NotFound(format!("{} {}", write.table_name, write.record_id))
}

#[cfg(test)]
mod tests {
    use super::*;
    use assert_matches::assert_matches;
    use serde_json::json;

    fn write(op: SyncOperation, id: &str, client_uuid: &str, data: serde_json::Value) -> PendingWrite {
        PendingWrite {
            table_name: "members".to_string(),
            operation: op,
            record_id: id.to_string(),
            data,
            client_uuid: client_uuid.to_string(),
            actor_id: "usher-1".to_string(),
        }
    }

    #[tokio::test]
    async fn test_second_apply_of_same_client_uuid_is_replay() {
        let repo = MemorySyncRepository::new();
        let first = repo
            .apply(write(SyncOperation::Insert, "m-1", "c-1", json!({"id": "m-1"})))
            .await
            .unwrap();
        assert_eq!(first, ApplyOutcome::Applied(json!({"id": "m-1"})));

        let second = repo
            .apply(write(SyncOperation::Insert, "m-1", "c-1", json!({"id": "m-1"})))
            .await
            .unwrap();
        assert_matches!(second, ApplyOutcome::Replayed(entry) if entry.record_id.as_deref() == Some("m-1"));
    }

    #[tokio::test]
    async fn test_update_merges_and_delete_hides_record() {
        let repo = MemorySyncRepository::new();
        repo.apply(write(SyncOperation::Insert, "m-1", "c-1", json!({"id": "m-1", "name": "Ada"})))
            .await
            .unwrap();

        let updated = repo
            .apply(write(SyncOperation::Update, "m-1", "c-2", json!({"id": "m-1", "phone": "555"})))
            .await
            .unwrap();
        assert_eq!(
            updated,
            ApplyOutcome::Applied(json!({"id": "m-1", "name": "Ada", "phone": "555"}))
        );

        repo.apply(write(SyncOperation::Delete, "m-1", "c-3", json!({"id": "m-1"})))
            .await
            .unwrap();
        assert!(!repo.record_exists("members", "m-1").await.unwrap());
    }

    #[tokio::test]
    async fn test_update_of_missing_record_is_not_found_and_not_logged() {
        let repo = MemorySyncRepository::new();
        let err = repo
            .apply(write(SyncOperation::Update, "ghost", "c-9", json!({"id": "ghost"})))
            .await
            .unwrap_err();
        assert_matches!(err, BackendError::NotFound(_));
        assert!(repo.find_log("c-9").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_insert_with_taken_id_conflicts() {
        let repo = MemorySyncRepository::new();
        repo.apply(write(SyncOperation::Insert, "m-1", "c-1", json!({"id": "m-1"})))
            .await
            .unwrap();
        let err = repo
            .apply(write(SyncOperation::Insert, "m-1", "c-2", json!({"id": "m-1"})))
            .await
            .unwrap_err();
        assert_eq!(err.status_code(), axum::http::StatusCode::CONFLICT);
    }
}
