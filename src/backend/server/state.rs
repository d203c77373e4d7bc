/**
 * Application State Management
 *
 * This module defines the application state structure and implements
 * the `FromRef` traits for Axum state extraction.
 *
 * `AppState` holds the repository behind `/api/sync` and the server
 * configuration. Both are behind `Arc`, so cloning the state per request
 * is cheap.
 */

use axum::extract::FromRef;
use std::sync::Arc;

use crate::backend::server::config::ServerConfig;
use crate::backend::sync::SyncRepository;

/// Application state shared by all handlers
#[derive(Clone)]
pub struct AppState {
    pub repo: Arc<dyn SyncRepository>,
    pub config: Arc<ServerConfig>,
}

impl AppState {
    pub fn new(repo: Arc<dyn SyncRepository>, config: ServerConfig) -> Self {
        Self {
            repo,
            config: Arc::new(config),
        }
    }
}

impl FromRef<AppState> for Arc<dyn SyncRepository> {
    fn from_ref(app_state: &AppState) -> Self {
        app_state.repo.clone()
    }
}

impl FromRef<AppState> for Arc<ServerConfig> {
    fn from_ref(app_state: &AppState) -> Self {
        app_state.config.clone()
    }
}
