//! # Sync Scheduler
//!
//! Background loop that turns time and connectivity into drain passes:
//!
//! - every `interval`, drain if online and no pass is running
//! - on an offline to online transition, wait `reconnect_debounce`, then
//!   drain once if still online
//!
//! A signal that flaps during the debounce window produces a single pass.

use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tracing::{debug, info};

use crate::client::sync::engine::{SyncEngine, Trigger};
use crate::client::sync::sync_state::{StatusReporter, SyncEvent};

/// Timer and reconnect trigger source
#[derive(Debug, Clone, Copy)]
pub struct SyncScheduler {
    interval: Duration,
    reconnect_debounce: Duration,
}

impl SyncScheduler {
    pub fn new(interval: Duration, reconnect_debounce: Duration) -> Self {
        Self {
            interval,
            reconnect_debounce,
        }
    }

    /// Start the loop; it exits when `shutdown` changes or its sender drops
    pub fn spawn(
        self,
        engine: Arc<SyncEngine>,
        reporter: Arc<StatusReporter>,
        mut shutdown: watch::Receiver<bool>,
    ) -> JoinHandle<()> {
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(self.interval);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
            let mut connectivity = engine.monitor().subscribe();
            let mut was_online = *connectivity.borrow_and_update();

            info!(
                "Sync scheduler started (interval {:?}, debounce {:?})",
                self.interval, self.reconnect_debounce
            );

            loop {
                tokio::select! {
                    _ = shutdown.changed() => break,
                    _ = ticker.tick() => {
                        if engine.monitor().is_online() && !engine.is_draining() {
                            engine.drain(Trigger::Timer).await;
                            let _ = reporter.publish().await;
                        }
                    }
                    changed = connectivity.changed() => {
                        if changed.is_err() {
                            break;
                        }
                        let online = *connectivity.borrow_and_update();
                        engine.emit(SyncEvent::ConnectivityChanged { online });

                        if online && !was_online {
                            tokio::time::sleep(self.reconnect_debounce).await;
                            // Absorb transitions that happened while waiting
                            let still_online = *connectivity.borrow_and_update();
                            if still_online {
                                debug!("Reconnected, draining queue");
                                engine.drain(Trigger::Reconnect).await;
                            }
                            was_online = still_online;
                        } else {
                            was_online = online;
                        }
                        let _ = reporter.publish().await;
                    }
                }
            }
            info!("Sync scheduler stopped");
        })
    }
}
