/**
 * Reconciliation Endpoint Wire Types
 *
 * Request and response bodies exchanged with `/api/sync`. Both the client
 * transport and the axum handlers use these types, so the JSON shape is
 * defined in exactly one place.
 *
 * # Endpoints
 *
 * - `POST /api/sync` - body `SyncRequest`, returns `SyncResponse`
 * - `GET /api/sync?client_uuid=<token>` - returns `SyncStatusResponse`
 *
 * Errors from either endpoint use `SyncErrorBody`.
 */
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::str::FromStr;

use crate::shared::error::SharedError;

/// Message returned when a `client_uuid` was already processed
pub const RECORD_ALREADY_EXISTS: &str = "Record already exists";

/// Write operation requested from the server
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum SyncOperation {
    Insert,
    Update,
    Delete,
}

impl SyncOperation {
    pub fn as_str(&self) -> &'static str {
        match self {
            SyncOperation::Insert => "INSERT",
            SyncOperation::Update => "UPDATE",
            SyncOperation::Delete => "DELETE",
        }
    }
}

impl FromStr for SyncOperation {
    type Err = SharedError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "INSERT" => Ok(SyncOperation::Insert),
            "UPDATE" => Ok(SyncOperation::Update),
            "DELETE" => Ok(SyncOperation::Delete),
            other => Err(SharedError::validation(
                "operation",
                format!("unsupported operation '{}'", other),
            )),
        }
    }
}

/// Body of `POST /api/sync`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SyncRequest {
    pub table_name: String,
    pub operation: SyncOperation,
    pub data: serde_json::Value,
    pub client_uuid: String,
}

/// Successful response of `POST /api/sync`
///
/// A first delivery carries `data` (the stored record). A replayed delivery
/// carries `message = "Record already exists"` and the `id` of the record the
/// original delivery produced.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SyncResponse {
    pub success: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data: Option<serde_json::Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
}

impl SyncResponse {
    /// Response for an operation applied for the first time
    pub fn applied(data: serde_json::Value) -> Self {
        Self {
            success: true,
            data: Some(data),
            message: None,
            id: None,
        }
    }

    /// Response for a `client_uuid` the server has already processed
    pub fn replayed(id: Option<String>) -> Self {
        Self {
            success: true,
            data: None,
            message: Some(RECORD_ALREADY_EXISTS.to_string()),
            id,
        }
    }

    /// Whether the server reported an idempotent replay
    pub fn is_replay(&self) -> bool {
        self.message.as_deref() == Some(RECORD_ALREADY_EXISTS)
    }

    /// Identifier of the affected record, from either response shape
    pub fn record_id(&self) -> Option<String> {
        if let Some(id) = &self.id {
            return Some(id.clone());
        }
        self.data
            .as_ref()
            .and_then(|data| data.get("id"))
            .and_then(|id| match id {
                serde_json::Value::String(s) => Some(s.clone()),
                serde_json::Value::Null => None,
                other => Some(other.to_string()),
            })
    }
}

/// Error body returned with any non-2xx status
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SyncErrorBody {
    pub error: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub details: Option<String>,
}

impl SyncErrorBody {
    /// Single-line description combining error and details
    pub fn describe(&self) -> String {
        match &self.details {
            Some(details) => format!("{}: {}", self.error, details),
            None => self.error.clone(),
        }
    }
}

/// Query string of `GET /api/sync`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SyncStatusQuery {
    pub client_uuid: String,
}

/// Response of `GET /api/sync`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SyncStatusResponse {
    /// A record created by this operation exists
    pub exists: bool,
    /// The operation has been processed by the server
    pub synced: bool,
    pub synced_at: Option<DateTime<Utc>>,
}

impl SyncStatusResponse {
    pub fn unknown() -> Self {
        Self {
            exists: false,
            synced: false,
            synced_at: None,
        }
    }
}
