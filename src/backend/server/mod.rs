//! Server Module
//!
//! Initialization and configuration of the Axum HTTP server.
//!
//! - **`state`** - `AppState` and `FromRef` implementations
//! - **`config`** - environment configuration and database loading
//! - **`init`** - app creation
//!
//! # Example
//!
//! ```rust,no_run
//! use attendance_sync::backend::server::{create_app, ServerConfig};
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let app = create_app(ServerConfig::from_env()?).await?;
//! let listener = tokio::net::TcpListener::bind("0.0.0.0:3000").await?;
//! axum::serve(listener, app).await?;
//! # Ok(())
//! # }
//! ```

/// Application state management
pub mod state;

/// Server configuration loading
pub mod config;

/// Server initialization
pub mod init;

pub use config::ServerConfig;
pub use init::{create_app, create_app_with_repository};
pub use state::AppState;
