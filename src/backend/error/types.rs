/**
 * Backend Error Types
 *
 * Errors raised while handling reconciliation requests. Each variant maps to
 * one HTTP status:
 *
 * - `Validation` - 400, the request or its payload is malformed
 * - `Unauthorized` - 401, missing or invalid bearer token
 * - `NotFound` - 404, UPDATE/DELETE of a record that does not exist
 * - `HandlerError` - explicit status chosen by the handler
 * - `Database`, `Migration`, `StateError`, `SerializationError` - 500
 *
 * Internal failures never leak their cause into the response body; it is
 * logged instead.
 */

use axum::http::StatusCode;
use thiserror::Error;

use crate::shared::sync::SyncErrorBody;
use crate::shared::SharedError;

/// Backend-specific error types
#[derive(Debug, Error)]
pub enum BackendError {
    /// Request rejected before any write
    #[error("{message}")]
    Validation {
        message: String,
        details: Option<String>,
    },

    #[error("Unauthorized: {0}")]
    Unauthorized(String),

    #[error("Not found: {0}")]
    NotFound(String),

    /// Handler error with an explicit status
    #[error("Handler error: {message}")]
    HandlerError { status: StatusCode, message: String },

    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("Migration error: {0}")]
    Migration(#[from] sqlx::migrate::MigrateError),

    /// State management error (e.g., lock acquisition failure)
    #[error("State error: {message}")]
    StateError { message: String },

    /// Payload problem detected by the shared validation
    #[error(transparent)]
    SharedError(#[from] SharedError),

    #[error("Serialization error: {0}")]
    SerializationError(#[from] serde_json::Error),
}

impl BackendError {
    pub fn validation(message: impl Into<String>) -> Self {
        Self::Validation {
            message: message.into(),
            details: None,
        }
    }

    pub fn validation_with(message: impl Into<String>, details: impl Into<String>) -> Self {
        Self::Validation {
            message: message.into(),
            details: Some(details.into()),
        }
    }

    /// Create a new handler error with a status code
    pub fn handler(status: StatusCode, message: impl Into<String>) -> Self {
        Self::HandlerError {
            status,
            message: message.into(),
        }
    }

    /// Create a new state error
    pub fn state(message: impl Into<String>) -> Self {
        Self::StateError {
            message: message.into(),
        }
    }

    /// Get the HTTP status code for this error
    pub fn status_code(&self) -> StatusCode {
        match self {
            Self::Validation { .. } | Self::SharedError(_) => StatusCode::BAD_REQUEST,
            Self::Unauthorized(_) => StatusCode::UNAUTHORIZED,
            Self::NotFound(_) => StatusCode::NOT_FOUND,
            Self::HandlerError { status, .. } => *status,
            Self::Database(_)
            | Self::Migration(_)
            | Self::StateError { .. }
            | Self::SerializationError(_) => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
        }
    }

    /// Response body for this error
    pub fn body(&self) -> SyncErrorBody {
        let (error, details) = match self {
            Self::Validation { message, details } => (message.clone(), details.clone()),
            Self::SharedError(err) => ("Invalid payload".to_string(), Some(shared_detail(err))),
            Self::Unauthorized(reason) => ("Unauthorized".to_string(), Some(reason.clone())),
            Self::NotFound(what) => ("Record not found".to_string(), Some(what.clone())),
            Self::HandlerError { message, .. } => (message.clone(), None),
            Self::Database(_)
            | Self::Migration(_)
            | Self::StateError { .. }
            | Self::SerializationError(_) => {
                ("Internal server error".to_string(), None)
            }
        };
        SyncErrorBody { error, details }
    }
}

fn shared_detail(err: &SharedError) -> String {
    match err {
        SharedError::ValidationError { message, .. } => message.clone(),
        SharedError::SerializationError { message } => message.clone(),
    }
}
