/**
 * Authentication Middleware
 *
 * Protects the reconciliation routes. Extracts the bearer token from the
 * Authorization header, verifies it against the configured secret and puts
 * the actor in the request extensions for handlers.
 */

use axum::{
    extract::{FromRequestParts, Request, State},
    http::{header::AUTHORIZATION, request::Parts},
    middleware::Next,
    response::Response,
};

use crate::backend::auth::sessions::verify_token;
use crate::backend::error::BackendError;
use crate::backend::server::state::AppState;

/// Actor extracted from a verified token
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct AuthenticatedActor {
    pub actor_id: String,
}

/// Authentication middleware
///
/// Returns 401 when the header is missing, malformed or carries an invalid
/// token.
pub async fn auth_middleware(
    State(app_state): State<AppState>,
    mut request: Request,
    next: Next,
) -> Result<Response, BackendError> {
    let auth_header = request
        .headers()
        .get(AUTHORIZATION)
        .and_then(|h| h.to_str().ok())
        .ok_or_else(|| {
            tracing::warn!("Missing Authorization header");
            BackendError::Unauthorized("missing bearer token".to_string())
        })?;

    let token = auth_header.strip_prefix("Bearer ").ok_or_else(|| {
        tracing::warn!("Invalid Authorization header format");
        BackendError::Unauthorized("expected a bearer token".to_string())
    })?;

    let claims = verify_token(&app_state.config.jwt_secret, token).map_err(|e| {
        tracing::warn!("Invalid token: {:?}", e);
        BackendError::Unauthorized("invalid token".to_string())
    })?;

    if claims.sub.trim().is_empty() {
        return Err(BackendError::Unauthorized("token has no subject".to_string()));
    }

    request.extensions_mut().insert(AuthenticatedActor {
        actor_id: claims.sub,
    });

    Ok(next.run(request).await)
}

/// Axum extractor for the authenticated actor
#[derive(Clone, Debug)]
pub struct AuthActor(pub AuthenticatedActor);

impl<S> FromRequestParts<S> for AuthActor
where
    S: Send + Sync,
{
    type Rejection = BackendError;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        let actor = parts
            .extensions
            .get::<AuthenticatedActor>()
            .cloned()
            .ok_or_else(|| {
                tracing::warn!("AuthenticatedActor not found in request extensions");
                BackendError::Unauthorized("not authenticated".to_string())
            })?;

        Ok(AuthActor(actor))
    }
}
