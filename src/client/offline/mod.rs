//! # Offline Queue
//!
//! Durable storage for check-ins and other writes captured while the kiosk
//! cannot (or has not yet) reached the server.
//!
//! ## Architecture
//!
//! - `QueueStore`: storage contract used by the sync engine
//! - `queue.rs`: in-memory store for tests and ephemeral kiosks
//! - `retry.rs`: retry ceiling and failure policy
//!
//! The SQLite implementation lives in `client::local_db`.
//!
//! Every method is keyed by the item's `client_operation_id`. Mutations are
//! durable once the returned future resolves.
//!
//! ## Usage
//!
//! ```rust,no_run
//! use attendance_sync::client::offline::{MemoryQueueStore, QueueStore};
//! use attendance_sync::shared::queue::{EntityType, OperationKind, QueueItem};
//!
//! # async fn example() -> Result<(), attendance_sync::client::error::StorageError> {
//! let store = MemoryQueueStore::new();
//! let item = QueueItem::new(EntityType::Visitor, OperationKind::Create, serde_json::json!({}));
//! store.enqueue(&item).await?;
//! assert_eq!(store.count().await?, 1);
//! # Ok(())
//! # }
//! ```

pub mod queue;
pub mod retry;

pub use queue::MemoryQueueStore;
pub use retry::RetryPolicy;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::client::error::StorageError;
use crate::shared::queue::QueueItem;

/// Key of the persisted sync metadata slot
pub const SYNC_METADATA_KEY: &str = "sync_state";

/// Sync bookkeeping persisted next to the queue
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SyncMetadata {
    /// Completion time of the last drain pass
    pub last_sync_at: Option<DateTime<Utc>>,
    /// Connectivity at the time the metadata was written
    #[serde(default)]
    pub is_online: bool,
}

/// Durable keyed store of pending operations
#[async_trait]
pub trait QueueStore: Send + Sync {
    /// Insert a new item; an existing token is a `StorageError::Duplicate`
    async fn enqueue(&self, item: &QueueItem) -> Result<(), StorageError>;

    /// All items, in no particular order
    async fn list_all(&self) -> Result<Vec<QueueItem>, StorageError>;

    async fn get(&self, client_operation_id: &str) -> Result<Option<QueueItem>, StorageError>;

    /// Remove an item; a missing key is not an error
    async fn remove(&self, client_operation_id: &str) -> Result<(), StorageError>;

    /// Record a failed attempt, capping the count at `ceiling`
    ///
    /// Returns the resulting count, or `None` when the item no longer exists.
    async fn increment_retry(
        &self,
        client_operation_id: &str,
        error: &str,
        ceiling: u32,
    ) -> Result<Option<u32>, StorageError>;

    /// Park an item after a non-retryable rejection
    async fn mark_terminal(&self, client_operation_id: &str, error: &str)
        -> Result<bool, StorageError>;

    /// Clear retry count, terminal flag and last error
    async fn reset_retry(&self, client_operation_id: &str) -> Result<bool, StorageError>;

    async fn count(&self) -> Result<usize, StorageError>;

    async fn load_metadata(&self) -> Result<SyncMetadata, StorageError>;

    async fn save_metadata(&self, metadata: &SyncMetadata) -> Result<(), StorageError>;
}
