/**
 * Check-in Agent Entry Point
 *
 * Headless kiosk agent. Reads one command per line on stdin:
 *
 * - a JSON check-in object, e.g.
 *   `{"member_id":"m-1","service_date":"2025-09-28","service_type":"sunday_service","method":"qr"}`
 * - `sync` - run a drain pass now
 * - `status` - print the current sync status as JSON
 * - `clear` - re-arm stalled items and retry once
 * - `discard <client_uuid>` - drop a stalled item
 * - `online` / `offline` - override the connectivity signal
 * - `quit` (or EOF) - stop
 */
use std::sync::Arc;
use tokio::io::{AsyncBufReadExt, BufReader};
use tracing::{error, info, warn};

use attendance_sync::client::{
    ClientConfig, ConnectivityMonitor, LocalDatabase, ReconciliationClient, SyncService,
};
use attendance_sync::shared::attendance::CheckIn;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    dotenv::dotenv().ok();

    let env_filter = std::env::var("RUST_LOG").unwrap_or_else(|_| "info".to_string());
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::new(&env_filter))
        .with_writer(std::io::stderr)
        .init();

    let config = ClientConfig::load()?;
    let db = match config.db_path() {
        Some(path) => LocalDatabase::open(path).await?,
        None => LocalDatabase::open_default().await?,
    };

    let client = ReconciliationClient::new(
        config.server_url(),
        config.token().map(str::to_string),
        config.sync().request_timeout,
    )?;
    let health_url = client.health_url();
    let http = client.http().clone();

    // Assume online until the probe (or an operator) says otherwise
    let monitor = Arc::new(ConnectivityMonitor::new(true));
    let mut service = SyncService::new(config.sync().clone(), Arc::new(db.clone()), Arc::new(client), monitor)
        .with_probe(http, health_url);
    if let Some(actor) = config.actor_id() {
        service = service.with_actor(actor);
    }

    service.init().await?;
    info!("Check-in agent ready, server {}", config.server_url());

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    loop {
        let line = match lines.next_line().await {
            Ok(Some(line)) => line,
            Ok(None) => break,
            Err(e) => {
                error!("Failed to read stdin: {}", e);
                break;
            }
        };
        let line = line.trim();
        if line.is_empty() {
            continue;
        }

        match line {
            "quit" | "exit" => break,
            "sync" => match service.sync_now().await {
                Some(report) => println!(
                    "delivered {} of {} attempted, {} failed",
                    report.delivered, report.attempted, report.failed
                ),
                None => println!("sync skipped (offline or already running)"),
            },
            "status" => match service.status().await {
                Ok(status) => println!("{}", serde_json::to_string(&status)?),
                Err(e) => error!("Failed to read status: {}", e),
            },
            "clear" => match service.clear_errors().await {
                Ok(Some(report)) => println!(
                    "errors cleared, delivered {} of {} attempted",
                    report.delivered, report.attempted
                ),
                Ok(None) => println!("errors cleared, retry deferred to the next sync pass"),
                Err(e) => error!("Failed to clear errors: {}", e),
            },
            "online" => {
                service.monitor().set_online(true);
            }
            "offline" => {
                service.monitor().set_online(false);
            }
            other if other.starts_with("discard ") => {
                let id = other.trim_start_matches("discard ").trim();
                match service.discard(id).await {
                    Ok(item) => println!("discarded {}", item.client_operation_id),
                    Err(e) => warn!("Cannot discard {}: {}", id, e),
                }
            }
            json => match serde_json::from_str::<CheckIn>(json) {
                Ok(check_in) => match service.record_check_in(check_in).await {
                    Ok(item) => println!("queued {}", item.client_operation_id),
                    Err(e) => error!("Check-in not recorded: {}", e),
                },
                Err(e) => warn!("Unrecognised input: {}", e),
            },
        }
    }

    service.dispose().await;
    db.close().await;
    Ok(())
}
