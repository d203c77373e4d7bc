//! Attendance Sync - Main Library
//!
//! Offline-first attendance capture for church check-in kiosks. Check-ins
//! are written to a durable local queue and delivered to the server's
//! reconciliation endpoint whenever connectivity allows. Every queued write
//! carries a client-generated idempotency token, so a redelivery after a
//! lost response is recognised by the server and never double-counted.
//!
//! # Module Structure
//!
//! - **`shared`** - Types used on both sides of the wire
//!   - Queue items, attendance payloads, `/api/sync` bodies
//!   - Configuration and error types
//!
//! - **`client`** - Kiosk side
//!   - SQLite-backed offline queue
//!   - Sync engine, scheduler, connectivity monitor, status reporter
//!   - HTTP transport to the reconciliation endpoint
//!
//! - **`backend`** - Server side (only compiled with `ssr` feature)
//!   - Axum reconciliation endpoint with JWT authentication
//!   - PostgreSQL or in-memory storage
//!
//! # Feature Flags
//!
//! - **`ssr`** (default) - enables the `backend` module and the
//!   `sync-server` binary
//!
//! # Usage
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use attendance_sync::client::{
//!     ConnectivityMonitor, LocalDatabase, ReconciliationClient, SyncConfig, SyncService,
//! };
//! use attendance_sync::shared::{CheckIn, CheckInMethod, ServiceType};
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let config = SyncConfig::default();
//! let db = LocalDatabase::open_default().await?;
//! let client = ReconciliationClient::new("http://127.0.0.1:3000", None, config.request_timeout)?;
//! let monitor = Arc::new(ConnectivityMonitor::new(true));
//!
//! let service = SyncService::new(config, Arc::new(db), Arc::new(client), monitor);
//! service.init().await?;
//!
//! let date = chrono::NaiveDate::from_ymd_opt(2025, 9, 28).ok_or("bad date")?;
//! service
//!     .record_check_in(CheckIn::member("m-1", date, ServiceType::SundayService, CheckInMethod::Qr))
//!     .await?;
//! # Ok(())
//! # }
//! ```

/// Shared types and data structures
pub mod shared;

/// Kiosk-side offline queue and sync
pub mod client;

/// Backend server-side code
#[cfg(feature = "ssr")]
pub mod backend;
