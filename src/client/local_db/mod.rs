//! # Local Database Module
//!
//! SQLite file that keeps the kiosk's offline queue and sync metadata across
//! restarts, crashes and power loss.
//!
//! ## Architecture
//!
//! - `LocalDatabase`: connection pool and schema management
//! - `schema.rs`: versioned schema and migrations
//! - `queue.rs`: `QueueStore` implementation over the `offline_queue` table
//!
//! The database runs in WAL mode with `synchronous=FULL`, so a write is on
//! disk by the time the call that made it returns.
//!
//! ## Usage
//!
//! ```rust,no_run
//! use attendance_sync::client::local_db::LocalDatabase;
//! use attendance_sync::client::offline::QueueStore;
//!
//! # async fn example() -> Result<(), attendance_sync::client::error::StorageError> {
//! let db = LocalDatabase::open_default().await?;
//! let pending = db.count().await?;
//! # Ok(())
//! # }
//! ```

pub mod queue;
pub mod schema;

use sqlx::sqlite::{SqliteConnectOptions, SqliteJournalMode, SqlitePoolOptions, SqliteSynchronous};
use sqlx::SqlitePool;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::time::Duration;
use tracing::{debug, info};

use crate::client::error::StorageError;

/// Result type for local database operations
pub type Result<T> = std::result::Result<T, StorageError>;

/// Local database connection manager
#[derive(Debug, Clone)]
pub struct LocalDatabase {
    pool: SqlitePool,
}

impl LocalDatabase {
    /// Open or create the database file at `path`
    pub async fn open(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)
                    .map_err(|e| StorageError::Unavailable(e.to_string()))?;
            }
        }

        let options = SqliteConnectOptions::new()
            .filename(path)
            .create_if_missing(true)
            .journal_mode(SqliteJournalMode::Wal)
            .synchronous(SqliteSynchronous::Full)
            .busy_timeout(Duration::from_secs(5))
            .foreign_keys(true);

        let pool = SqlitePoolOptions::new()
            .max_connections(4)
            .connect_with(options)
            .await?;

        info!("Opened local queue database at {}", path.display());
        Self::from_pool(pool).await
    }

    /// Open the database in the platform data directory
    pub async fn open_default() -> Result<Self> {
        Self::open(Self::default_path()).await
    }

    /// Private in-memory database, lost when dropped
    pub async fn in_memory() -> Result<Self> {
        let options = SqliteConnectOptions::from_str("sqlite::memory:")?;
        // A single long-lived connection keeps the memory database alive
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .idle_timeout(None)
            .max_lifetime(None)
            .connect_with(options)
            .await?;
        Self::from_pool(pool).await
    }

    async fn from_pool(pool: SqlitePool) -> Result<Self> {
        let db = Self { pool };
        db.run_migrations().await?;
        Ok(db)
    }

    /// Platform-specific path of the queue database
    pub fn default_path() -> PathBuf {
        let mut path = dirs::data_dir().unwrap_or_else(std::env::temp_dir);
        path.push("attendance-sync");
        path.push("queue.db");
        path
    }

    /// Apply pending schema migrations
    async fn run_migrations(&self) -> Result<()> {
        sqlx::query(
            "CREATE TABLE IF NOT EXISTS schema_migrations (
                version INTEGER PRIMARY KEY,
                applied_at TEXT NOT NULL
            )",
        )
        .execute(&self.pool)
        .await?;

        let current_version: (i32,) =
            sqlx::query_as("SELECT COALESCE(MAX(version), 0) FROM schema_migrations")
                .fetch_one(&self.pool)
                .await?;

        if !schema::needs_migration(current_version.0) {
            return Ok(());
        }

        for &(version, sql) in schema::pending_migrations(current_version.0) {
            let mut tx = self.pool.begin().await?;
            sqlx::raw_sql(sql).execute(&mut *tx).await?;
            sqlx::query("INSERT INTO schema_migrations (version, applied_at) VALUES (?, ?)")
                .bind(version)
                .bind(chrono::Utc::now().to_rfc3339())
                .execute(&mut *tx)
                .await?;
            tx.commit().await?;
            debug!("Applied local schema migration {}", version);
        }
        Ok(())
    }

    /// Get connection pool reference
    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }

    /// Close the pool, flushing the WAL
    pub async fn close(&self) {
        self.pool.close().await;
    }
}
