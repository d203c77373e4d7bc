//! Common test utilities and helpers
//!
//! - `ScriptedTransport` - in-process stand-in for the reconciliation
//!   endpoint that records every delivery
//! - item builders for attendance check-ins

#![allow(dead_code)]

use async_trait::async_trait;
use chrono::{DateTime, Duration as ChronoDuration, NaiveDate, TimeZone, Utc};
use serde_json::json;
use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;
use std::time::Duration;

use attendance_sync::client::{DeliveryError, ReconciliationTransport};
use attendance_sync::shared::queue::{EntityType, OperationKind, QueueItem};
use attendance_sync::shared::sync::{SyncRequest, SyncResponse, SyncStatusResponse};
use attendance_sync::shared::{CheckIn, CheckInMethod, ServiceType};

/// What the transport does with one delivery
#[derive(Debug, Clone)]
pub enum Step {
    /// Behave like the server: apply once, replay afterwards
    Serve,
    /// Apply on the server but lose the response
    ApplyThenDrop,
    Fail(DeliveryError),
}

#[derive(Default)]
struct ServerSide {
    /// client_uuid -> record id
    applied: HashMap<String, String>,
    next_id: usize,
}

/// Reconciliation endpoint fake with an idempotent server model
pub struct ScriptedTransport {
    script: Mutex<VecDeque<Step>>,
    fallback: Step,
    delay: Duration,
    requests: Mutex<Vec<SyncRequest>>,
    server: Mutex<ServerSide>,
    in_flight: AtomicUsize,
    max_in_flight: AtomicUsize,
}

impl ScriptedTransport {
    /// Serves every delivery
    pub fn serving() -> Self {
        Self::with_fallback(Step::Serve)
    }

    /// Fails every delivery with `err`
    pub fn failing(err: DeliveryError) -> Self {
        Self::with_fallback(Step::Fail(err))
    }

    pub fn with_fallback(fallback: Step) -> Self {
        Self {
            script: Mutex::new(VecDeque::new()),
            fallback,
            delay: Duration::ZERO,
            requests: Mutex::new(Vec::new()),
            server: Mutex::new(ServerSide::default()),
            in_flight: AtomicUsize::new(0),
            max_in_flight: AtomicUsize::new(0),
        }
    }

    /// Step used before falling back; steps run in the order added
    pub fn then(self, step: Step) -> Self {
        self.script.lock().unwrap().push_back(step);
        self
    }

    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = delay;
        self
    }

    pub fn requests(&self) -> Vec<SyncRequest> {
        self.requests.lock().unwrap().clone()
    }

    pub fn delivered_uuids(&self) -> Vec<String> {
        self.requests().into_iter().map(|r| r.client_uuid).collect()
    }

    pub fn attempts(&self) -> usize {
        self.requests.lock().unwrap().len()
    }

    /// Records the server has applied
    pub fn applied_count(&self) -> usize {
        self.server.lock().unwrap().applied.len()
    }

    pub fn max_in_flight(&self) -> usize {
        self.max_in_flight.load(Ordering::SeqCst)
    }

    fn apply(&self, request: &SyncRequest) -> SyncResponse {
        let mut server = self.server.lock().unwrap();
        if let Some(id) = server.applied.get(&request.client_uuid) {
            return SyncResponse::replayed(Some(id.clone()));
        }
        server.next_id += 1;
        let id = format!("a-{}", 98 + server.next_id);
        server.applied.insert(request.client_uuid.clone(), id.clone());

        let mut data = request.data.clone();
        if let Some(object) = data.as_object_mut() {
            object.insert("id".to_string(), json!(id));
        }
        SyncResponse::applied(data)
    }
}

#[async_trait]
impl ReconciliationTransport for ScriptedTransport {
    async fn deliver(&self, request: &SyncRequest) -> Result<SyncResponse, DeliveryError> {
        let now = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.max_in_flight.fetch_max(now, Ordering::SeqCst);
        self.requests.lock().unwrap().push(request.clone());

        if !self.delay.is_zero() {
            tokio::time::sleep(self.delay).await;
        }

        let step = self
            .script
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or_else(|| self.fallback.clone());
        let result = match step {
            Step::Serve => Ok(self.apply(request)),
            Step::ApplyThenDrop => {
                self.apply(request);
                Err(DeliveryError::transport("connection reset"))
            }
            Step::Fail(err) => Err(err),
        };

        self.in_flight.fetch_sub(1, Ordering::SeqCst);
        result
    }

    async fn check(&self, client_uuid: &str) -> Result<SyncStatusResponse, DeliveryError> {
        let synced = self.server.lock().unwrap().applied.contains_key(client_uuid);
        Ok(if synced {
            SyncStatusResponse {
                exists: true,
                synced: true,
                synced_at: Some(Utc::now()),
            }
        } else {
            SyncStatusResponse::unknown()
        })
    }
}

pub fn service_date() -> NaiveDate {
    NaiveDate::from_ymd_opt(2025, 9, 28).unwrap()
}

pub fn base_time() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2025, 9, 28, 9, 0, 0).unwrap()
}

/// Attendance create for `member_id`, enqueued `offset_secs` after the base time
pub fn check_in_item(member_id: &str, client_uuid: &str, offset_secs: i64) -> QueueItem {
    let created_at = base_time() + ChronoDuration::seconds(offset_secs);
    let payload = CheckIn::member(member_id, service_date(), ServiceType::SundayService, CheckInMethod::Qr)
        .into_payload(client_uuid, None, created_at)
        .to_value()
        .unwrap();
    QueueItem::new(EntityType::Attendance, OperationKind::Create, payload)
        .with_client_operation_id(client_uuid)
        .with_created_at(created_at)
}
