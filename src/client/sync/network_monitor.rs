//! # Network Monitor
//!
//! Single source of truth for "can we reach the server right now".
//!
//! ## Features
//!
//! - **Connectivity Signal**: synchronous `is_online()` read
//! - **Transition Notification**: subscribers only see real changes, so a
//!   repeated `online` event while already online is swallowed
//! - **Health Probe**: periodic `GET /health` for hosts without an OS
//!   network callback

use reqwest::Client;
use std::time::Duration;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{debug, info};

/// Timeout of a single health probe request
const PROBE_TIMEOUT: Duration = Duration::from_secs(5);

/// Connectivity signal shared by the engine and the scheduler
#[derive(Debug)]
pub struct ConnectivityMonitor {
    state: watch::Sender<bool>,
}

impl ConnectivityMonitor {
    pub fn new(initially_online: bool) -> Self {
        let (state, _) = watch::channel(initially_online);
        Self { state }
    }

    pub fn is_online(&self) -> bool {
        *self.state.borrow()
    }

    /// Platform hook; returns `true` when the call changed the state
    pub fn set_online(&self, online: bool) -> bool {
        let changed = self.state.send_if_modified(|current| {
            if *current == online {
                false
            } else {
                *current = online;
                true
            }
        });
        if changed {
            info!("Connectivity changed: {}", if online { "online" } else { "offline" });
        }
        changed
    }

    /// Receiver notified on every transition
    pub fn subscribe(&self) -> watch::Receiver<bool> {
        self.state.subscribe()
    }

    /// Poll `health_url` every `interval` and feed the result into the signal
    ///
    /// Any 2xx response counts as online; errors and other statuses count as
    /// offline. The task runs until aborted.
    pub fn spawn_probe(
        self: &std::sync::Arc<Self>,
        client: Client,
        health_url: String,
        interval: Duration,
    ) -> JoinHandle<()> {
        let monitor = std::sync::Arc::clone(self);
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
            loop {
                ticker.tick().await;
                let online = match client.get(&health_url).timeout(PROBE_TIMEOUT).send().await {
                    Ok(response) => response.status().is_success(),
                    Err(e) => {
                        debug!("Health probe failed: {}", e);
                        false
                    }
                };
                monitor.set_online(online);
            }
        })
    }
}

impl Default for ConnectivityMonitor {
    fn default() -> Self {
        Self::new(false)
    }
}
