//! Routes Module
//!
//! Route configuration for the reconciliation server.
//!
//! - **`router`** - top-level router, health check, tracing, fallback
//! - **`api_routes`** - authenticated `/api/sync` routes

/// Main router creation
pub mod router;

/// API endpoint configuration
pub mod api_routes;

pub use router::create_router;
