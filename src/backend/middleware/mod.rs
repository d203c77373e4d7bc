//! Middleware Module
//!
//! HTTP middleware for the reconciliation server.
//!
//! - **`auth`** - bearer-token check for `/api/sync`

pub mod auth;

pub use auth::{auth_middleware, AuthActor, AuthenticatedActor};
