/**
 * Error Conversion
 *
 * `IntoResponse` for `BackendError`. Error responses are JSON:
 * ```json
 * {
 *   "error": "Invalid payload",
 *   "details": "member_id or dependant_id is required"
 * }
 * ```
 */

use axum::{
    response::{IntoResponse, Response},
    Json,
};
use tracing::error;

use crate::backend::error::types::BackendError;

impl IntoResponse for BackendError {
    fn into_response(self) -> Response {
        let status = self.status_code();
        if status.is_server_error() {
            error!("Request failed: {}", self);
        }
        (status, Json(self.body())).into_response()
    }
}
