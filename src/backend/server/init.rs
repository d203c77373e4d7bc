/**
 * Server Initialization
 *
 * Builds the application state and the router.
 *
 * # Initialization Process
 *
 * 1. Connect to PostgreSQL when `DATABASE_URL` is configured; a failure
 *    aborts startup
 * 2. Use the in-memory repository when it is not
 * 3. Create and configure the router
 */

use axum::Router;
use std::sync::Arc;

use crate::backend::error::BackendError;
use crate::backend::routes::router::create_router;
use crate::backend::server::config::{load_database, ServerConfig};
use crate::backend::server::state::AppState;
use crate::backend::sync::{MemorySyncRepository, PgSyncRepository, SyncRepository};

/// Create and configure the Axum application
pub async fn create_app(config: ServerConfig) -> Result<Router<()>, BackendError> {
    tracing::info!("Initializing attendance sync server");

    let repo: Arc<dyn SyncRepository> = match config.database_url.as_deref() {
        Some(url) => Arc::new(PgSyncRepository::new(load_database(url).await?)),
        None => {
            tracing::warn!("DATABASE_URL not set. Synced records are kept in memory only.");
            Arc::new(MemorySyncRepository::new())
        }
    };

    Ok(create_app_with_repository(repo, config))
}

/// Create the application around an existing repository
pub fn create_app_with_repository(repo: Arc<dyn SyncRepository>, config: ServerConfig) -> Router<()> {
    let app_state = AppState::new(repo, config);
    let app = create_router(app_state);
    tracing::info!("Router configured");
    app
}
