//! Backend Module
//!
//! Server side of the attendance system: the reconciliation endpoint that
//! applies queued kiosk writes exactly once per `client_uuid`.
//!
//! This module is only compiled when the `ssr` feature is enabled.
//!
//! # Architecture
//!
//! - **`server`** - initialization, application state, configuration
//! - **`routes`** - route configuration and router assembly
//! - **`sync`** - reconciliation handlers and repositories
//! - **`auth`** - JWT tokens
//! - **`middleware`** - bearer-token middleware
//! - **`error`** - backend error types
//!
//! # Module Structure
//!
//! ```text
//! backend/
//! ├── mod.rs          - Module exports and documentation
//! ├── main.rs         - sync-server binary
//! ├── server/         - Server initialization and state
//! ├── routes/         - Route configuration
//! ├── sync/           - /api/sync handlers and storage
//! ├── auth/           - JWT tokens
//! ├── middleware/     - Authentication middleware
//! └── error/          - Error types
//! ```

/// Server initialization and configuration
pub mod server;

/// HTTP route configuration
pub mod routes;

/// Reconciliation endpoint
pub mod sync;

/// Authentication tokens
pub mod auth;

/// Middleware for request processing
pub mod middleware;

/// Backend error types
pub mod error;

pub use error::BackendError;
pub use server::{create_app, ServerConfig};
pub use sync::{MemorySyncRepository, PgSyncRepository, SyncRepository};
