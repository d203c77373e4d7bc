//! Database Schema Definitions
//!
//! Versioned schema of the kiosk's local SQLite file. Each entry in
//! `MIGRATIONS` is applied once and recorded in `schema_migrations`.

/// Current database schema version
pub const CURRENT_SCHEMA_VERSION: i32 = 2;

const V1_OFFLINE_QUEUE: &str = r#"
CREATE TABLE IF NOT EXISTS offline_queue (
    client_uuid TEXT PRIMARY KEY NOT NULL,
    id TEXT NOT NULL UNIQUE,
    entity_type TEXT NOT NULL,
    operation_kind TEXT NOT NULL,
    payload TEXT NOT NULL,
    created_at TEXT NOT NULL,
    retry_count INTEGER NOT NULL DEFAULT 0,
    last_error TEXT,
    terminal INTEGER NOT NULL DEFAULT 0,
    last_attempt TEXT
);

CREATE INDEX IF NOT EXISTS idx_offline_queue_created_at ON offline_queue (created_at);

CREATE TABLE IF NOT EXISTS sync_metadata (
    key TEXT PRIMARY KEY NOT NULL,
    value TEXT NOT NULL,
    updated_at TEXT NOT NULL
);
"#;

/// Enqueue sequence; existing rows keep their insertion order
const V2_QUEUE_SEQUENCE: &str = r#"
ALTER TABLE offline_queue ADD COLUMN seq INTEGER NOT NULL DEFAULT 0;
UPDATE offline_queue SET seq = rowid;
"#;

/// Schema migrations, oldest first
pub const MIGRATIONS: &[(i32, &str)] = &[(1, V1_OFFLINE_QUEUE), (2, V2_QUEUE_SEQUENCE)];

/// Check if database needs migration
pub fn needs_migration(current_version: i32) -> bool {
    current_version < CURRENT_SCHEMA_VERSION
}

/// Migrations newer than `current_version`
pub fn pending_migrations(current_version: i32) -> impl Iterator<Item = &'static (i32, &'static str)> {
    MIGRATIONS.iter().filter(move |(v, _)| *v > current_version)
}
