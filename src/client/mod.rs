//! Check-in Client
//!
//! Kiosk-side half of the attendance system: the durable offline queue, the
//! HTTP transport to the reconciliation endpoint and the sync service that
//! drains one into the other.
//!
//! # Modules
//!
//! - **`offline`** - `QueueStore` contract, in-memory store, retry policy
//! - **`local_db`** - SQLite-backed `QueueStore`
//! - **`api`** - reconciliation transport (reqwest)
//! - **`sync`** - engine, scheduler, connectivity monitor, status reporter
//! - **`config`** - environment and TOML configuration
//! - **`error`** - client error types

pub mod api;
pub mod config;
pub mod error;
pub mod local_db;
pub mod offline;
pub mod sync;

pub use api::{ReconciliationClient, ReconciliationTransport};
pub use config::ClientConfig;
pub use error::{DeliveryError, StorageError, SyncError};
pub use local_db::LocalDatabase;
pub use offline::{MemoryQueueStore, QueueStore};
pub use sync::{ConnectivityMonitor, SyncConfig, SyncService, SyncStatus};
