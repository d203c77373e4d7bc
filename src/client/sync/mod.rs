//! # Background Sync Service
//!
//! Offline-first delivery of check-ins to the church server. Every write goes
//! through the durable queue first, whatever the connectivity, and is removed
//! only after the server confirms it.
//!
//! ## Architecture
//!
//! - **Sync Engine**: drains the queue one item at a time, oldest first
//! - **Scheduler**: interval timer and reconnect trigger
//! - **Network Monitor**: connectivity signal and optional health probe
//! - **Sync State**: status projection and event stream
//!
//! ## Usage
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use attendance_sync::client::api::ReconciliationClient;
//! use attendance_sync::client::local_db::LocalDatabase;
//! use attendance_sync::client::sync::{ConnectivityMonitor, SyncConfig, SyncService};
//! use attendance_sync::shared::attendance::{CheckIn, CheckInMethod, ServiceType};
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let config = SyncConfig::default();
//! let store = Arc::new(LocalDatabase::open_default().await?);
//! let client = ReconciliationClient::new("https://church.example.org", None, config.request_timeout)?;
//! let monitor = Arc::new(ConnectivityMonitor::new(true));
//!
//! let service = SyncService::new(config, store, Arc::new(client), monitor);
//! service.init().await?;
//!
//! let date = chrono::NaiveDate::from_ymd_opt(2025, 9, 28).unwrap();
//! service
//!     .record_check_in(CheckIn::member("m-1", date, ServiceType::SundayService, CheckInMethod::Qr))
//!     .await?;
//!
//! println!("{:?}", service.status().await?);
//! service.dispose().await;
//! # Ok(())
//! # }
//! ```

pub mod engine;
pub mod network_monitor;
pub mod scheduler;
pub mod sync_state;

pub use engine::{DrainReport, SyncEngine, Trigger};
pub use network_monitor::ConnectivityMonitor;
pub use scheduler::SyncScheduler;
pub use sync_state::{StatusReporter, SyncErrorEntry, SyncEvent, SyncStatus};

use chrono::Utc;
use reqwest::Client;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{broadcast, watch, Mutex};
use tokio::task::JoinHandle;
use tracing::{error, info};

use crate::client::api::ReconciliationTransport;
use crate::client::error::SyncError;
use crate::client::offline::retry::DEFAULT_MAX_RETRIES;
use crate::client::offline::{QueueStore, RetryPolicy};
use crate::shared::attendance::{AttendancePayload, CheckIn};
use crate::shared::error::SharedError;
use crate::shared::queue::{new_client_operation_id, sort_for_delivery, EntityType, OperationKind, QueueItem};
use crate::shared::sync::SyncStatusResponse;

/// Configuration for the sync service
#[derive(Debug, Clone, PartialEq)]
pub struct SyncConfig {
    /// Timer interval between passes while online
    pub sync_interval: Duration,
    /// Retry ceiling
    pub max_retries: u32,
    /// Timeout of a single delivery request
    pub request_timeout: Duration,
    /// Upper bound on one pass
    pub drain_deadline: Duration,
    /// Wait after reconnecting before draining
    pub reconnect_debounce: Duration,
    /// Retry 4xx rejections instead of parking them
    pub retry_validation_errors: bool,
    /// Health probe period; `None` leaves connectivity to the host
    pub probe_interval: Option<Duration>,
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            sync_interval: Duration::from_secs(30),
            max_retries: DEFAULT_MAX_RETRIES,
            request_timeout: Duration::from_secs(15),
            drain_deadline: engine::DEFAULT_DRAIN_DEADLINE,
            reconnect_debounce: Duration::from_secs(1),
            retry_validation_errors: false,
            probe_interval: None,
        }
    }
}

impl SyncConfig {
    pub fn retry_policy(&self) -> RetryPolicy {
        RetryPolicy {
            retry_validation_errors: self.retry_validation_errors,
            ..RetryPolicy::new(self.max_retries)
        }
    }
}

struct BackgroundTasks {
    shutdown: watch::Sender<bool>,
    scheduler: JoinHandle<()>,
    probe: Option<JoinHandle<()>>,
}

/// Main sync service coordinator
pub struct SyncService {
    config: SyncConfig,
    store: Arc<dyn QueueStore>,
    transport: Arc<dyn ReconciliationTransport>,
    engine: Arc<SyncEngine>,
    reporter: Arc<StatusReporter>,
    actor_id: Option<String>,
    probe: Option<(Client, String)>,
    tasks: Mutex<Option<BackgroundTasks>>,
    /// Passes started by `submit`, awaited on dispose
    immediate: Mutex<Vec<JoinHandle<()>>>,
}

impl SyncService {
    pub fn new(
        config: SyncConfig,
        store: Arc<dyn QueueStore>,
        transport: Arc<dyn ReconciliationTransport>,
        monitor: Arc<ConnectivityMonitor>,
    ) -> Self {
        let policy = config.retry_policy();
        let engine = Arc::new(
            SyncEngine::new(store.clone(), transport.clone(), monitor)
                .with_policy(policy)
                .with_drain_deadline(config.drain_deadline),
        );
        let reporter = Arc::new(StatusReporter::new(store.clone(), engine.clone(), policy));
        Self {
            config,
            store,
            transport,
            engine,
            reporter,
            actor_id: None,
            probe: None,
            tasks: Mutex::new(None),
            immediate: Mutex::new(Vec::new()),
        }
    }

    /// Identifier stamped as `created_by` on new check-ins
    pub fn with_actor(mut self, actor_id: impl Into<String>) -> Self {
        self.actor_id = Some(actor_id.into());
        self
    }

    /// Health endpoint polled when `probe_interval` is set
    pub fn with_probe(mut self, client: Client, health_url: impl Into<String>) -> Self {
        self.probe = Some((client, health_url.into()));
        self
    }

    pub fn monitor(&self) -> &Arc<ConnectivityMonitor> {
        self.engine.monitor()
    }

    pub fn engine(&self) -> &Arc<SyncEngine> {
        &self.engine
    }

    /// Restore persisted state and start background tasks
    pub async fn init(&self) -> Result<(), SyncError> {
        let mut tasks = self.tasks.lock().await;
        if tasks.is_some() {
            return Ok(());
        }

        self.engine.restore().await?;

        let (shutdown, shutdown_rx) = watch::channel(false);
        let scheduler = SyncScheduler::new(self.config.sync_interval, self.config.reconnect_debounce)
            .spawn(self.engine.clone(), self.reporter.clone(), shutdown_rx);

        let probe = match (&self.probe, self.config.probe_interval) {
            (Some((client, url)), Some(interval)) => {
                Some(self.monitor().spawn_probe(client.clone(), url.clone(), interval))
            }
            _ => None,
        };

        *tasks = Some(BackgroundTasks {
            shutdown,
            scheduler,
            probe,
        });
        drop(tasks);

        let status = self.reporter.publish().await?;
        info!(
            "Sync service started: {} pending, {} stalled",
            status.pending_count, status.stalled_count
        );
        Ok(())
    }

    /// Stop background tasks and persist metadata
    ///
    /// A pass in flight is allowed to finish.
    pub async fn dispose(&self) {
        let immediate: Vec<_> = self.immediate.lock().await.drain(..).collect();
        for handle in immediate {
            if let Err(e) = handle.await {
                error!("Immediate sync pass ended abnormally: {}", e);
            }
        }

        let Some(tasks) = self.tasks.lock().await.take() else {
            return;
        };
        let _ = tasks.shutdown.send(true);
        if let Some(probe) = tasks.probe {
            probe.abort();
        }
        if let Err(e) = tasks.scheduler.await {
            error!("Sync scheduler ended abnormally: {}", e);
        }
        if let Err(e) = self.engine.save_metadata().await {
            error!("Failed to persist sync metadata: {}", e);
        }
        info!("Sync service stopped");
    }

    /// Queue a check-in, then try to deliver it right away when online
    pub async fn record_check_in(&self, check_in: CheckIn) -> Result<QueueItem, SyncError> {
        let client_uuid = new_client_operation_id();
        let payload = check_in.into_payload(client_uuid.clone(), self.actor_id.clone(), Utc::now());
        payload.validate()?;

        let item = QueueItem::new(EntityType::Attendance, OperationKind::Create, payload.to_value()?)
            .with_client_operation_id(client_uuid);
        self.submit(item).await
    }

    /// Generic write path for members and visitors
    pub async fn enqueue(
        &self,
        entity_type: EntityType,
        operation_kind: OperationKind,
        payload: serde_json::Value,
    ) -> Result<QueueItem, SyncError> {
        if !payload.is_object() {
            return Err(SharedError::validation("payload", "payload must be a JSON object").into());
        }
        if entity_type == EntityType::Attendance && operation_kind == OperationKind::Create {
            AttendancePayload::from_value(&payload)?;
        }
        self.submit(QueueItem::new(entity_type, operation_kind, payload)).await
    }

    async fn submit(&self, item: QueueItem) -> Result<QueueItem, SyncError> {
        self.store.enqueue(&item).await?;
        info!(
            "Queued {} {} ({})",
            item.entity_type, item.operation_kind, item.client_operation_id
        );
        self.engine.emit(SyncEvent::Enqueued {
            client_operation_id: item.client_operation_id.clone(),
        });
        if let Err(e) = self.reporter.publish().await {
            error!("Failed to publish sync status: {}", e);
        }

        if self.monitor().is_online() {
            let engine = self.engine.clone();
            let reporter = self.reporter.clone();
            let handle = tokio::spawn(async move {
                if engine.drain(Trigger::Enqueue).await.is_some() {
                    if let Err(e) = reporter.publish().await {
                        error!("Failed to publish sync status: {}", e);
                    }
                }
            });
            let mut immediate = self.immediate.lock().await;
            immediate.retain(|h| !h.is_finished());
            immediate.push(handle);
        }
        Ok(item)
    }

    /// Manual trigger; always resolves
    pub async fn sync_now(&self) -> Option<DrainReport> {
        self.reporter.sync_now().await
    }

    /// Re-arm stalled items, clear the error list and re-attempt once
    pub async fn clear_errors(&self) -> Result<Option<DrainReport>, SyncError> {
        let report = self.engine.clear_errors().await?;
        self.reporter.publish().await?;
        Ok(report)
    }

    /// Drop a stalled item for good
    pub async fn discard(&self, client_operation_id: &str) -> Result<QueueItem, SyncError> {
        let item = self.engine.discard(client_operation_id).await?;
        self.reporter.publish().await?;
        Ok(item)
    }

    pub async fn status(&self) -> Result<SyncStatus, SyncError> {
        Ok(self.reporter.status().await?)
    }

    pub fn subscribe_status(&self) -> watch::Receiver<SyncStatus> {
        self.reporter.subscribe_status()
    }

    pub fn subscribe_events(&self) -> broadcast::Receiver<SyncEvent> {
        self.reporter.subscribe_events()
    }

    /// Queued items in delivery order
    pub async fn pending_items(&self) -> Result<Vec<QueueItem>, SyncError> {
        let mut items = self.store.list_all().await?;
        sort_for_delivery(&mut items);
        Ok(items)
    }

    /// Ask the server whether an operation token has been processed
    pub async fn check_remote(&self, client_operation_id: &str) -> Result<SyncStatusResponse, SyncError> {
        Ok(self.transport.check(client_operation_id).await?)
    }
}
