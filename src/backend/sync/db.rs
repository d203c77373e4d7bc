/**
 * Reconciliation Database Operations
 *
 * PostgreSQL implementation of `SyncRepository`.
 *
 * # Tables
 *
 * - `sync_records` - every synced record, keyed by `(table_name, id)`, with
 *   the record body as JSONB and a soft-delete timestamp
 * - `sync_log` - one row per processed `client_uuid`
 *
 * # Transactions
 *
 * `apply` claims the log row first (`ON CONFLICT DO NOTHING`). When the
 * claim affects no row another delivery already holds it, the transaction
 * is rolled back and the existing entry is returned as a replay. Otherwise
 * the write runs in the same transaction, so a failed write also releases
 * the claim.
 */

use async_trait::async_trait;
use axum::http::StatusCode;
use chrono::{DateTime, Utc};
use sqlx::{PgPool, Row};

use crate::backend::error::BackendError;
use crate::backend::sync::{not_found, ApplyOutcome, PendingWrite, SyncLogEntry, SyncRepository};
use crate::shared::sync::SyncOperation;

/// `SyncRepository` backed by PostgreSQL
#[derive(Debug, Clone)]
pub struct PgSyncRepository {
    pool: PgPool,
}

impl PgSyncRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    pub fn pool(&self) -> &PgPool {
        &self.pool
    }
}

fn decode_log(row: &sqlx::postgres::PgRow) -> Result<SyncLogEntry, BackendError> {
    let operation: String = row.try_get("operation")?;
    let operation = operation
        .parse::<SyncOperation>()
        .map_err(|e| BackendError::state(format!("sync_log row has {}", e)))?;
    let synced_at: DateTime<Utc> = row.try_get("synced_at")?;

    Ok(SyncLogEntry {
        client_uuid: row.try_get("client_uuid")?,
        table_name: row.try_get("table_name")?,
        operation,
        record_id: row.try_get("record_id")?,
        actor_id: row.try_get("actor_id")?,
        synced_at,
    })
}

#[async_trait]
impl SyncRepository for PgSyncRepository {
    async fn find_log(&self, client_uuid: &str) -> Result<Option<SyncLogEntry>, BackendError> {
        let row = sqlx::query(
            r#"
            SELECT client_uuid, table_name, operation, record_id, actor_id, synced_at
            FROM sync_log
            WHERE client_uuid = $1
            "#,
        )
        .bind(client_uuid)
        .fetch_optional(&self.pool)
        .await?;

        row.as_ref().map(decode_log).transpose()
    }

    async fn apply(&self, write: PendingWrite) -> Result<ApplyOutcome, BackendError> {
        let mut tx = self.pool.begin().await?;

        let claimed = sqlx::query(
            r#"
            INSERT INTO sync_log (client_uuid, table_name, operation, record_id, actor_id)
            VALUES ($1, $2, $3, $4, $5)
            ON CONFLICT (client_uuid) DO NOTHING
            "#,
        )
        .bind(&write.client_uuid)
        .bind(&write.table_name)
        .bind(write.operation.as_str())
        .bind(&write.record_id)
        .bind(&write.actor_id)
        .execute(&mut *tx)
        .await?
        .rows_affected();

        if claimed == 0 {
            tx.rollback().await?;
            tracing::debug!("client_uuid {} already claimed, answering as replay", write.client_uuid);
            let entry = self.find_log(&write.client_uuid).await?.ok_or_else(|| {
                BackendError::state(format!("sync_log entry {} vanished", write.client_uuid))
            })?;
            return Ok(ApplyOutcome::Replayed(entry));
        }

        let stored: Option<serde_json::Value> = match write.operation {
            SyncOperation::Insert => {
                sqlx::query_scalar(
                    r#"
                    INSERT INTO sync_records (table_name, id, data, client_uuid, created_by)
                    VALUES ($1, $2, $3, $4, $5)
                    ON CONFLICT (table_name, id) DO NOTHING
                    RETURNING data
                    "#,
                )
                .bind(&write.table_name)
                .bind(&write.record_id)
                .bind(&write.data)
                .bind(&write.client_uuid)
                .bind(&write.actor_id)
                .fetch_optional(&mut *tx)
                .await?
            }
            SyncOperation::Update => {
                sqlx::query_scalar(
                    r#"
                    UPDATE sync_records
                    SET data = data || $3, updated_at = NOW()
                    WHERE table_name = $1 AND id = $2 AND deleted_at IS NULL
                    RETURNING data
                    "#,
                )
                .bind(&write.table_name)
                .bind(&write.record_id)
                .bind(&write.data)
                .fetch_optional(&mut *tx)
                .await?
            }
            SyncOperation::Delete => {
                sqlx::query_scalar(
                    r#"
                    UPDATE sync_records
                    SET deleted_at = NOW(), updated_at = NOW()
                    WHERE table_name = $1 AND id = $2 AND deleted_at IS NULL
                    RETURNING data
                    "#,
                )
                .bind(&write.table_name)
                .bind(&write.record_id)
                .fetch_optional(&mut *tx)
                .await?
            }
        };

        // Dropping `tx` on the error paths rolls the claim back
        let record = match (stored, write.operation) {
            (Some(record), _) => record,
            (None, SyncOperation::Insert) => {
                return Err(BackendError::handler(
                    StatusCode::CONFLICT,
                    format!("Record {} already exists in {}", write.record_id, write.table_name),
                ));
            }
            (None, _) => return Err(not_found(&write)),
        };

        tx.commit().await?;
        tracing::info!(
            "Applied {} {} {} (client_uuid {})",
            write.operation.as_str(),
            write.table_name,
            write.record_id,
            write.client_uuid
        );
        Ok(ApplyOutcome::Applied(record))
    }

    async fn record_exists(&self, table_name: &str, id: &str) -> Result<bool, BackendError> {
        let exists: bool = sqlx::query_scalar(
            r#"
            SELECT EXISTS (
                SELECT 1 FROM sync_records
                WHERE table_name = $1 AND id = $2 AND deleted_at IS NULL
            )
            "#,
        )
        .bind(table_name)
        .bind(id)
        .fetch_one(&self.pool)
        .await?;
        Ok(exists)
    }
}
