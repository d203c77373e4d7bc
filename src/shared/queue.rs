/**
 * Queued Operation Types
 *
 * This module defines the `QueueItem` struct: one pending write waiting for
 * server confirmation, together with the entity and operation tags that
 * select the target collection and the kind of write.
 *
 * Every queued item carries a `client_operation_id` (sent on the wire as
 * `client_uuid`). It is generated exactly once when the item is created and is
 * the only key the server uses to recognise a redelivered operation.
 */
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use uuid::Uuid;

use crate::shared::error::SharedError;
use crate::shared::sync::{SyncOperation, SyncRequest};

/// Target collection of a queued write
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EntityType {
    Attendance,
    Member,
    Visitor,
}

impl EntityType {
    /// Tag stored in the local queue
    pub fn as_str(&self) -> &'static str {
        match self {
            EntityType::Attendance => "attendance",
            EntityType::Member => "member",
            EntityType::Visitor => "visitor",
        }
    }

    /// Server-side table name sent as `table_name`
    pub fn table_name(&self) -> &'static str {
        match self {
            EntityType::Attendance => "attendance",
            EntityType::Member => "members",
            EntityType::Visitor => "visitors",
        }
    }

    /// Resolve a `table_name` received on the wire
    pub fn from_table_name(table_name: &str) -> Option<Self> {
        match table_name {
            "attendance" => Some(EntityType::Attendance),
            "members" => Some(EntityType::Member),
            "visitors" => Some(EntityType::Visitor),
            _ => None,
        }
    }
}

impl fmt::Display for EntityType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for EntityType {
    type Err = SharedError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "attendance" => Ok(EntityType::Attendance),
            "member" => Ok(EntityType::Member),
            "visitor" => Ok(EntityType::Visitor),
            other => Err(SharedError::validation(
                "entity_type",
                format!("unknown entity type '{}'", other),
            )),
        }
    }
}

/// Kind of write carried by a queued item
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OperationKind {
    Create,
    Update,
    Delete,
}

impl OperationKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            OperationKind::Create => "create",
            OperationKind::Update => "update",
            OperationKind::Delete => "delete",
        }
    }

    /// Operation name understood by the reconciliation endpoint
    pub fn wire_operation(&self) -> SyncOperation {
        match self {
            OperationKind::Create => SyncOperation::Insert,
            OperationKind::Update => SyncOperation::Update,
            OperationKind::Delete => SyncOperation::Delete,
        }
    }
}

impl fmt::Display for OperationKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for OperationKind {
    type Err = SharedError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "create" => Ok(OperationKind::Create),
            "update" => Ok(OperationKind::Update),
            "delete" => Ok(OperationKind::Delete),
            other => Err(SharedError::validation(
                "operation_kind",
                format!("unknown operation kind '{}'", other),
            )),
        }
    }
}

/// Generate a fresh idempotency token
pub fn new_client_operation_id() -> String {
    Uuid::new_v4().to_string()
}

/// A single pending write operation
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QueueItem {
    /// Local queue slot identifier (not the business record id)
    pub id: Uuid,
    /// Idempotency token, sent as `client_uuid`
    pub client_operation_id: String,
    pub entity_type: EntityType,
    pub operation_kind: OperationKind,
    /// Operation data shaped for the target entity
    pub payload: serde_json::Value,
    pub created_at: DateTime<Utc>,
    /// Failed delivery attempts so far
    pub retry_count: u32,
    /// Description of the most recent failure
    #[serde(default)]
    pub last_error: Option<String>,
    /// Set when the server rejected the payload as invalid
    #[serde(default)]
    pub terminal: bool,
    /// Enqueue order within the owning store, assigned on `enqueue`
    #[serde(default)]
    pub seq: u64,
}

impl QueueItem {
    /// Create a new item with a freshly generated idempotency token
    pub fn new(
        entity_type: EntityType,
        operation_kind: OperationKind,
        payload: serde_json::Value,
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            client_operation_id: new_client_operation_id(),
            entity_type,
            operation_kind,
            payload,
            created_at: Utc::now(),
            retry_count: 0,
            last_error: None,
            terminal: false,
            seq: 0,
        }
    }

    /// Use a token that was already minted by the caller (e.g. embedded in the payload)
    pub fn with_client_operation_id(mut self, client_operation_id: impl Into<String>) -> Self {
        self.client_operation_id = client_operation_id.into();
        self
    }

    /// Override the enqueue timestamp
    pub fn with_created_at(mut self, created_at: DateTime<Utc>) -> Self {
        self.created_at = created_at;
        self
    }

    /// Whether the item is excluded from automatic delivery
    pub fn is_stalled(&self, retry_ceiling: u32) -> bool {
        self.terminal || self.retry_count >= retry_ceiling
    }

    /// Build the reconciliation request for this item
    pub fn to_request(&self) -> SyncRequest {
        SyncRequest {
            table_name: self.entity_type.table_name().to_string(),
            operation: self.operation_kind.wire_operation(),
            data: self.payload.clone(),
            client_uuid: self.client_operation_id.clone(),
        }
    }
}

/// Order items for delivery: oldest first, then enqueue sequence
///
/// The queue slot id only separates items that share both.
pub fn sort_for_delivery(items: &mut [QueueItem]) {
    items.sort_by(|a, b| {
        a.created_at
            .cmp(&b.created_at)
            .then_with(|| a.seq.cmp(&b.seq))
            .then_with(|| a.id.cmp(&b.id))
    });
}
