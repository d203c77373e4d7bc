//! # In-Memory Queue Store
//!
//! `QueueStore` backed by a `HashMap` behind a tokio `RwLock`. Nothing
//! survives a restart, so it is meant for tests and kiosks that accept losing
//! unsynced check-ins. An optional capacity makes `enqueue` fail with
//! `StorageError::QuotaExceeded`, mirroring a full disk.

use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use tokio::sync::RwLock;

use super::{QueueStore, SyncMetadata};
use crate::client::error::StorageError;
use crate::shared::queue::QueueItem;

/// In-memory queue store
#[derive(Debug, Default)]
pub struct MemoryQueueStore {
    items: RwLock<HashMap<String, QueueItem>>,
    metadata: RwLock<SyncMetadata>,
    capacity: Option<usize>,
    next_seq: AtomicU64,
}

impl MemoryQueueStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Store that refuses new items once `capacity` are queued
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            capacity: Some(capacity),
            ..Self::default()
        }
    }
}

#[async_trait]
impl QueueStore for MemoryQueueStore {
    async fn enqueue(&self, item: &QueueItem) -> Result<(), StorageError> {
        let mut items = self.items.write().await;
        if items.contains_key(&item.client_operation_id) {
            return Err(StorageError::Duplicate(item.client_operation_id.clone()));
        }
        if matches!(self.capacity, Some(cap) if items.len() >= cap) {
            return Err(StorageError::QuotaExceeded);
        }
        let mut stored = item.clone();
        stored.seq = self.next_seq.fetch_add(1, Ordering::Relaxed) + 1;
        items.insert(stored.client_operation_id.clone(), stored);
        Ok(())
    }

    async fn list_all(&self) -> Result<Vec<QueueItem>, StorageError> {
        Ok(self.items.read().await.values().cloned().collect())
    }

    async fn get(&self, client_operation_id: &str) -> Result<Option<QueueItem>, StorageError> {
        Ok(self.items.read().await.get(client_operation_id).cloned())
    }

    async fn remove(&self, client_operation_id: &str) -> Result<(), StorageError> {
        self.items.write().await.remove(client_operation_id);
        Ok(())
    }

    async fn increment_retry(
        &self,
        client_operation_id: &str,
        error: &str,
        ceiling: u32,
    ) -> Result<Option<u32>, StorageError> {
        let mut items = self.items.write().await;
        Ok(items.get_mut(client_operation_id).map(|item| {
            item.retry_count = (item.retry_count + 1).min(ceiling);
            item.last_error = Some(error.to_string());
            item.retry_count
        }))
    }

    async fn mark_terminal(
        &self,
        client_operation_id: &str,
        error: &str,
    ) -> Result<bool, StorageError> {
        let mut items = self.items.write().await;
        Ok(match items.get_mut(client_operation_id) {
            Some(item) => {
                item.terminal = true;
                item.last_error = Some(error.to_string());
                true
            }
            None => false,
        })
    }

    async fn reset_retry(&self, client_operation_id: &str) -> Result<bool, StorageError> {
        let mut items = self.items.write().await;
        Ok(match items.get_mut(client_operation_id) {
            Some(item) => {
                item.retry_count = 0;
                item.terminal = false;
                item.last_error = None;
                true
            }
            None => false,
        })
    }

    async fn count(&self) -> Result<usize, StorageError> {
        Ok(self.items.read().await.len())
    }

    async fn load_metadata(&self) -> Result<SyncMetadata, StorageError> {
        Ok(self.metadata.read().await.clone())
    }

    async fn save_metadata(&self, metadata: &SyncMetadata) -> Result<(), StorageError> {
        *self.metadata.write().await = metadata.clone();
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::shared::queue::{EntityType, OperationKind};
    use serde_json::json;

    fn item() -> QueueItem {
        QueueItem::new(EntityType::Attendance, OperationKind::Create, json!({"member_id": "m-1"}))
    }

    #[tokio::test]
    async fn test_enqueue_and_remove() {
        let store = MemoryQueueStore::new();
        let item = item();
        store.enqueue(&item).await.unwrap();
        assert_eq!(store.count().await.unwrap(), 1);

        store.remove(&item.client_operation_id).await.unwrap();
        store.remove(&item.client_operation_id).await.unwrap();
        assert_eq!(store.count().await.unwrap(), 0);
    }

    #[tokio::test]
    async fn test_duplicate_token_is_rejected() {
        let store = MemoryQueueStore::new();
        let item = item();
        store.enqueue(&item).await.unwrap();
        let err = store.enqueue(&item).await.unwrap_err();
        assert!(matches!(err, StorageError::Duplicate(id) if id == item.client_operation_id));
    }

    #[tokio::test]
    async fn test_capacity_reports_quota() {
        let store = MemoryQueueStore::with_capacity(1);
        store.enqueue(&item()).await.unwrap();
        assert!(matches!(
            store.enqueue(&item()).await,
            Err(StorageError::QuotaExceeded)
        ));
    }

    #[tokio::test]
    async fn test_increment_is_capped() {
        let store = MemoryQueueStore::new();
        let item = item();
        store.enqueue(&item).await.unwrap();
        for expected in [1, 2, 2] {
            let count = store
                .increment_retry(&item.client_operation_id, "boom", 2)
                .await
                .unwrap();
            assert_eq!(count, Some(expected));
        }
        assert_eq!(store.increment_retry("missing", "boom", 2).await.unwrap(), None);

        store.reset_retry(&item.client_operation_id).await.unwrap();
        let stored = store.get(&item.client_operation_id).await.unwrap().unwrap();
        assert_eq!(stored.retry_count, 0);
        assert!(stored.last_error.is_none());
    }
}
