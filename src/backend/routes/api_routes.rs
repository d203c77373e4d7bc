/**
 * API Route Configuration
 *
 * # Routes
 *
 * - `POST /api/sync` - apply a queued client write
 * - `GET /api/sync?client_uuid=<token>` - processing status of a write
 *
 * Both require `Authorization: Bearer <token>`.
 */

use axum::{middleware, routing::post, Router};

use crate::backend::middleware::auth::auth_middleware;
use crate::backend::server::state::AppState;
use crate::backend::sync::{get_sync_status, post_sync};

/// Configure API routes
pub fn configure_api_routes(router: Router<AppState>, app_state: AppState) -> Router<AppState> {
    let sync_routes = Router::new()
        .route("/api/sync", post(post_sync).get(get_sync_status))
        .route_layer(middleware::from_fn_with_state(app_state, auth_middleware));

    router.merge(sync_routes)
}
