//! Client Error Types
//!
//! Errors raised by the check-in client, one enum per layer:
//!
//! - `StorageError` - the durable queue could not persist or read an item
//! - `DeliveryError` - a single request to the reconciliation endpoint failed
//! - `SyncError` - umbrella returned by the `SyncService` API
//!
//! Storage errors surface to the caller at enqueue time. Delivery errors are
//! contained inside a drain pass and only reach the user through the status
//! `errors` list.

use thiserror::Error;

use crate::shared::error::SharedError;

/// SQLite result code for `SQLITE_FULL`
const SQLITE_FULL: &str = "13";

/// Failure of the durable queue store
#[derive(Debug, Error)]
pub enum StorageError {
    /// The store could not be opened or reached
    #[error("Storage unavailable: {0}")]
    Unavailable(String),

    /// Disk full or capacity limit reached
    #[error("Storage quota exceeded")]
    QuotaExceeded,

    /// An item with this idempotency token already exists
    #[error("Duplicate queue item: {0}")]
    Duplicate(String),

    #[error("Database error: {0}")]
    Database(sqlx::Error),

    /// A stored row or payload could not be decoded
    #[error("Corrupt queue entry: {0}")]
    Corrupt(String),
}

impl From<serde_json::Error> for StorageError {
    fn from(err: serde_json::Error) -> Self {
        StorageError::Corrupt(err.to_string())
    }
}

impl From<sqlx::Error> for StorageError {
    fn from(err: sqlx::Error) -> Self {
        match &err {
            sqlx::Error::Database(db) if db.code().as_deref() == Some(SQLITE_FULL) => {
                StorageError::QuotaExceeded
            }
            sqlx::Error::Io(e) => StorageError::Unavailable(e.to_string()),
            sqlx::Error::PoolTimedOut | sqlx::Error::PoolClosed => {
                StorageError::Unavailable(err.to_string())
            }
            _ => StorageError::Database(err),
        }
    }
}

/// Failure of a single delivery to the reconciliation endpoint
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum DeliveryError {
    /// Network failure, timeout, server error or rejected credentials
    #[error("Transport error: {message}")]
    Transport {
        message: String,
        status: Option<u16>,
    },

    /// The server rejected the payload itself
    #[error("Rejected by server ({status}): {message}")]
    Validation { status: u16, message: String },
}

impl DeliveryError {
    pub fn transport(message: impl Into<String>) -> Self {
        Self::Transport {
            message: message.into(),
            status: None,
        }
    }

    /// Classify a non-2xx response
    ///
    /// 5xx, 408, 429, 401 and 403 are transport failures; any other 4xx is
    /// a validation failure.
    pub fn from_status(status: u16, message: impl Into<String>) -> Self {
        let message = message.into();
        match status {
            400..=499 if !matches!(status, 401 | 403 | 408 | 429) => {
                Self::Validation { status, message }
            }
            _ => Self::Transport {
                message: format!("HTTP {}: {}", status, message),
                status: Some(status),
            },
        }
    }

    /// Whether another attempt could succeed without changing the payload
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::Transport { .. })
    }

    pub fn status(&self) -> Option<u16> {
        match self {
            Self::Transport { status, .. } => *status,
            Self::Validation { status, .. } => Some(*status),
        }
    }
}

impl From<reqwest::Error> for DeliveryError {
    fn from(err: reqwest::Error) -> Self {
        let message = if err.is_timeout() {
            "request timed out".to_string()
        } else if err.is_connect() {
            format!("connection failed: {}", err)
        } else {
            err.to_string()
        };
        Self::Transport {
            message,
            status: err.status().map(|s| s.as_u16()),
        }
    }
}

/// Errors returned by the sync service API
#[derive(Debug, Error)]
pub enum SyncError {
    #[error(transparent)]
    Storage(#[from] StorageError),

    #[error(transparent)]
    Delivery(#[from] DeliveryError),

    /// Retry ceiling reached, the item waits for manual intervention
    #[error("Operation {client_uuid} failed after {attempts} attempts")]
    ExhaustedRetries { client_uuid: String, attempts: u32 },

    #[error("Invalid payload: {0}")]
    InvalidPayload(#[from] SharedError),

    /// Discard requested for an item that is still auto-retried
    #[error("Operation {0} is not stalled")]
    NotStalled(String),

    #[error("Operation {0} not found")]
    NotFound(String),
}
