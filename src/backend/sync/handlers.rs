/**
 * Reconciliation Handlers
 *
 * - `POST /api/sync` - apply one queued client write
 * - `GET /api/sync?client_uuid=<token>` - report whether it was processed
 *
 * Both routes sit behind the bearer-token middleware; the authenticated
 * actor is recorded with every write.
 *
 * # Request Checks (in order)
 *
 * 1. Body must parse as `SyncRequest` (400 otherwise)
 * 2. `client_uuid` must not be blank
 * 3. `table_name` must be a known collection
 * 4. `data` must be a JSON object
 * 5. A `client_uuid` already in the sync log is answered as a replay
 *    without touching the data
 * 6. Attendance inserts must pass payload validation
 * 7. UPDATE and DELETE need `data.id`
 */

use axum::{
    extract::{rejection::{JsonRejection, QueryRejection}, Query, State},
    Json,
};
use std::sync::Arc;
use uuid::Uuid;

use crate::backend::error::BackendError;
use crate::backend::middleware::auth::AuthActor;
use crate::backend::sync::{ApplyOutcome, PendingWrite, SyncRepository};
use crate::shared::attendance::AttendancePayload;
use crate::shared::queue::EntityType;
use crate::shared::sync::{SyncOperation, SyncRequest, SyncResponse, SyncStatusQuery, SyncStatusResponse};

/// Handle `POST /api/sync`
pub async fn post_sync(
    State(repo): State<Arc<dyn SyncRepository>>,
    AuthActor(actor): AuthActor,
    payload: Result<Json<SyncRequest>, JsonRejection>,
) -> Result<Json<SyncResponse>, BackendError> {
    let Json(request) = payload
        .map_err(|rejection| BackendError::validation_with("Malformed request body", rejection.body_text()))?;

    let client_uuid = request.client_uuid.trim();
    if client_uuid.is_empty() {
        return Err(BackendError::validation("client_uuid is required"));
    }
    let entity = EntityType::from_table_name(&request.table_name)
        .ok_or_else(|| BackendError::validation_with("Unknown table", request.table_name.clone()))?;
    if !request.data.is_object() {
        return Err(BackendError::validation("data must be a JSON object"));
    }

    if let Some(entry) = repo.find_log(client_uuid).await? {
        tracing::debug!("Replay of {} from {}", client_uuid, actor.actor_id);
        return Ok(Json(SyncResponse::replayed(entry.record_id)));
    }

    let write = prepare_write(entity, &request, client_uuid, &actor.actor_id)?;
    match repo.apply(write).await? {
        ApplyOutcome::Applied(record) => Ok(Json(SyncResponse::applied(record))),
        ApplyOutcome::Replayed(entry) => Ok(Json(SyncResponse::replayed(entry.record_id))),
    }
}

/// Handle `GET /api/sync`
pub async fn get_sync_status(
    State(repo): State<Arc<dyn SyncRepository>>,
    query: Result<Query<SyncStatusQuery>, QueryRejection>,
) -> Result<Json<SyncStatusResponse>, BackendError> {
    let Query(query) = query
        .map_err(|rejection| BackendError::validation_with("Invalid query", rejection.body_text()))?;
    let client_uuid = query.client_uuid.trim();
    if client_uuid.is_empty() {
        return Err(BackendError::validation("client_uuid is required"));
    }

    let Some(entry) = repo.find_log(client_uuid).await? else {
        return Ok(Json(SyncStatusResponse::unknown()));
    };

    let exists = match (&entry.record_id, entry.operation) {
        (Some(id), SyncOperation::Insert | SyncOperation::Update) => {
            repo.record_exists(&entry.table_name, id).await?
        }
        _ => false,
    };
    Ok(Json(SyncStatusResponse {
        exists,
        synced: true,
        synced_at: Some(entry.synced_at),
    }))
}

/// Turn a checked request into a `PendingWrite`
fn prepare_write(
    entity: EntityType,
    request: &SyncRequest,
    client_uuid: &str,
    actor_id: &str,
) -> Result<PendingWrite, BackendError> {
    let mut data = request.data.clone();
    let supplied_id = data
        .get("id")
        .and_then(|id| id.as_str())
        .map(str::trim)
        .filter(|id| !id.is_empty())
        .map(str::to_string);

    let record_id = match request.operation {
        SyncOperation::Insert => {
            if entity == EntityType::Attendance {
                data = normalize_attendance(data, client_uuid, actor_id)?;
            }
            let id = supplied_id.unwrap_or_else(|| Uuid::new_v4().to_string());
            if let Some(object) = data.as_object_mut() {
                object.insert("id".to_string(), serde_json::Value::String(id.clone()));
            }
            id
        }
        SyncOperation::Update | SyncOperation::Delete => supplied_id.ok_or_else(|| {
            BackendError::validation_with(
                "Missing record id",
                format!("{} requires data.id", request.operation.as_str()),
            )
        })?,
    };

    Ok(PendingWrite {
        table_name: entity.table_name().to_string(),
        operation: request.operation,
        record_id,
        data,
        client_uuid: client_uuid.to_string(),
        actor_id: actor_id.to_string(),
    })
}

/// Validate an attendance body, filling `created_by` and `client_uuid`
fn normalize_attendance(
    mut data: serde_json::Value,
    client_uuid: &str,
    actor_id: &str,
) -> Result<serde_json::Value, BackendError> {
    if let Some(object) = data.as_object_mut() {
        let blank = |value: Option<&serde_json::Value>| {
            value.and_then(|v| v.as_str()).map_or(true, |s| s.trim().is_empty())
        };
        if blank(object.get("created_by")) {
            object.insert("created_by".to_string(), actor_id.into());
        }
        if blank(object.get("client_uuid")) {
            object.insert("client_uuid".to_string(), client_uuid.into());
        }
    }

    let payload = AttendancePayload::from_value(&data)?;
    Ok(payload.to_value()?)
}
