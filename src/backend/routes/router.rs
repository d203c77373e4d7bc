/**
 * Router Configuration
 *
 * Combines all route configurations into a single Axum router.
 *
 * # Routes
 *
 * - `GET /health` - liveness, used by the client connectivity probe
 * - `/api/sync` - reconciliation endpoint (see `api_routes`)
 * - fallback - 404
 *
 * Every request passes through the `tower-http` trace layer.
 */

use axum::{http::StatusCode, routing::get, Router};
use tower_http::trace::TraceLayer;

use crate::backend::routes::api_routes::configure_api_routes;
use crate::backend::server::state::AppState;

/// Create the Axum router with all routes configured
pub fn create_router(app_state: AppState) -> Router<()> {
    let router = Router::new().route("/health", get(health));

    let router = configure_api_routes(router, app_state.clone());

    let router = router.fallback(|| async { (StatusCode::NOT_FOUND, "404 Not Found") });

    router.layer(TraceLayer::new_for_http()).with_state(app_state)
}

async fn health() -> &'static str {
    "ok"
}
