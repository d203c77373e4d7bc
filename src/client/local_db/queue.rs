//! # Offline Queue Table
//!
//! `QueueStore` over the `offline_queue` table, keyed by `client_uuid`.
//! Retry bookkeeping is a single `UPDATE ... RETURNING` statement, so a
//! concurrent increment cannot lose a count.
//!
//! Timestamps are stored as RFC 3339 strings with microsecond precision,
//! which sort lexicographically in time order.

use async_trait::async_trait;
use chrono::{DateTime, SecondsFormat, Utc};
use sqlx::sqlite::SqliteRow;
use sqlx::Row;
use tracing::error;
use uuid::Uuid;

use super::LocalDatabase;
use crate::client::error::StorageError;
use crate::client::offline::{QueueStore, SyncMetadata, SYNC_METADATA_KEY};
use crate::shared::queue::QueueItem;

const SELECT_ITEMS: &str = "SELECT client_uuid, id, entity_type, operation_kind, payload, created_at,
        retry_count, last_error, terminal, seq
     FROM offline_queue";

fn timestamp(at: DateTime<Utc>) -> String {
    at.to_rfc3339_opts(SecondsFormat::Micros, true)
}

fn corrupt(err: impl std::fmt::Display) -> StorageError {
    StorageError::Corrupt(err.to_string())
}

fn decode_row(row: &SqliteRow) -> Result<QueueItem, StorageError> {
    let id: String = row.try_get("id")?;
    let entity_type: String = row.try_get("entity_type")?;
    let operation_kind: String = row.try_get("operation_kind")?;
    let payload: String = row.try_get("payload")?;
    let created_at: String = row.try_get("created_at")?;
    let retry_count: i64 = row.try_get("retry_count")?;
    let terminal: i64 = row.try_get("terminal")?;
    let seq: i64 = row.try_get("seq")?;

    Ok(QueueItem {
        id: Uuid::parse_str(&id).map_err(corrupt)?,
        client_operation_id: row.try_get("client_uuid")?,
        entity_type: entity_type.parse().map_err(corrupt)?,
        operation_kind: operation_kind.parse().map_err(corrupt)?,
        payload: serde_json::from_str(&payload)?,
        created_at: DateTime::parse_from_rfc3339(&created_at)
            .map_err(corrupt)?
            .with_timezone(&Utc),
        retry_count: u32::try_from(retry_count).unwrap_or(0),
        last_error: row.try_get("last_error")?,
        terminal: terminal != 0,
        seq: u64::try_from(seq).unwrap_or(0),
    })
}

#[async_trait]
impl QueueStore for LocalDatabase {
    async fn enqueue(&self, item: &QueueItem) -> Result<(), StorageError> {
        let payload = serde_json::to_string(&item.payload)?;

        let result = sqlx::query(
            "INSERT INTO offline_queue
                (client_uuid, id, entity_type, operation_kind, payload, created_at,
                 retry_count, last_error, terminal, seq)
             VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?,
                     (SELECT COALESCE(MAX(seq), 0) + 1 FROM offline_queue))",
        )
        .bind(&item.client_operation_id)
        .bind(item.id.to_string())
        .bind(item.entity_type.as_str())
        .bind(item.operation_kind.as_str())
        .bind(payload)
        .bind(timestamp(item.created_at))
        .bind(i64::from(item.retry_count))
        .bind(&item.last_error)
        .bind(item.terminal)
        .execute(self.pool())
        .await;

        match result {
            Ok(_) => Ok(()),
            Err(sqlx::Error::Database(db)) if db.is_unique_violation() => {
                Err(StorageError::Duplicate(item.client_operation_id.clone()))
            }
            Err(e) => Err(e.into()),
        }
    }

    async fn list_all(&self) -> Result<Vec<QueueItem>, StorageError> {
        let rows = sqlx::query(SELECT_ITEMS).fetch_all(self.pool()).await?;

        let mut items = Vec::with_capacity(rows.len());
        for row in rows {
            match decode_row(&row) {
                Ok(item) => items.push(item),
                Err(e) => {
                    let key: String = row.try_get("client_uuid").unwrap_or_default();
                    error!("Skipping unreadable queue entry {}: {}", key, e);
                }
            }
        }
        Ok(items)
    }

    async fn get(&self, client_operation_id: &str) -> Result<Option<QueueItem>, StorageError> {
        let row = sqlx::query(&format!("{} WHERE client_uuid = ?", SELECT_ITEMS))
            .bind(client_operation_id)
            .fetch_optional(self.pool())
            .await?;
        row.as_ref().map(decode_row).transpose()
    }

    async fn remove(&self, client_operation_id: &str) -> Result<(), StorageError> {
        sqlx::query("DELETE FROM offline_queue WHERE client_uuid = ?")
            .bind(client_operation_id)
            .execute(self.pool())
            .await?;
        Ok(())
    }

    async fn increment_retry(
        &self,
        client_operation_id: &str,
        error: &str,
        ceiling: u32,
    ) -> Result<Option<u32>, StorageError> {
        let count: Option<(i64,)> = sqlx::query_as(
            "UPDATE offline_queue
             SET retry_count = MIN(retry_count + 1, ?), last_error = ?, last_attempt = ?
             WHERE client_uuid = ?
             RETURNING retry_count",
        )
        .bind(i64::from(ceiling))
        .bind(error)
        .bind(timestamp(Utc::now()))
        .bind(client_operation_id)
        .fetch_optional(self.pool())
        .await?;

        Ok(count.map(|(c,)| u32::try_from(c).unwrap_or(ceiling)))
    }

    async fn mark_terminal(
        &self,
        client_operation_id: &str,
        error: &str,
    ) -> Result<bool, StorageError> {
        let result = sqlx::query(
            "UPDATE offline_queue SET terminal = 1, last_error = ?, last_attempt = ?
             WHERE client_uuid = ?",
        )
        .bind(error)
        .bind(timestamp(Utc::now()))
        .bind(client_operation_id)
        .execute(self.pool())
        .await?;
        Ok(result.rows_affected() > 0)
    }

    async fn reset_retry(&self, client_operation_id: &str) -> Result<bool, StorageError> {
        let result = sqlx::query(
            "UPDATE offline_queue SET retry_count = 0, terminal = 0, last_error = NULL
             WHERE client_uuid = ?",
        )
        .bind(client_operation_id)
        .execute(self.pool())
        .await?;
        Ok(result.rows_affected() > 0)
    }

    async fn count(&self) -> Result<usize, StorageError> {
        let (count,): (i64,) = sqlx::query_as("SELECT COUNT(*) FROM offline_queue")
            .fetch_one(self.pool())
            .await?;
        Ok(usize::try_from(count).unwrap_or(0))
    }

    async fn load_metadata(&self) -> Result<SyncMetadata, StorageError> {
        let value: Option<(String,)> =
            sqlx::query_as("SELECT value FROM sync_metadata WHERE key = ?")
                .bind(SYNC_METADATA_KEY)
                .fetch_optional(self.pool())
                .await?;

        match value {
            Some((json,)) => Ok(serde_json::from_str(&json)?),
            None => Ok(SyncMetadata::default()),
        }
    }

    async fn save_metadata(&self, metadata: &SyncMetadata) -> Result<(), StorageError> {
        let value = serde_json::to_string(metadata)?;
        sqlx::query(
            "INSERT INTO sync_metadata (key, value, updated_at) VALUES (?, ?, ?)
             ON CONFLICT(key) DO UPDATE SET value = excluded.value, updated_at = excluded.updated_at",
        )
        .bind(SYNC_METADATA_KEY)
        .bind(value)
        .bind(timestamp(Utc::now()))
        .execute(self.pool())
        .await?;
        Ok(())
    }
}
