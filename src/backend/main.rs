/**
 * Sync Server Entry Point
 *
 * Serves the reconciliation endpoint. With `issue-token <actor>` it prints
 * a bearer token for a kiosk agent and exits instead.
 */

#[cfg(feature = "ssr")]
#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    use attendance_sync::backend::auth::create_token;
    use attendance_sync::backend::server::{create_app, ServerConfig};

    // Load environment variables from .env file if present
    dotenv::dotenv().ok();

    let env_filter = std::env::var("RUST_LOG").unwrap_or_else(|_| "info".to_string());
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::new(&env_filter))
        .with_writer(std::io::stderr)
        .init();

    let config = ServerConfig::from_env()?;

    let args: Vec<String> = std::env::args().skip(1).collect();
    if let [command, actor] = args.as_slice() {
        if command == "issue-token" {
            println!("{}", create_token(&config.jwt_secret, actor, config.token_ttl)?);
            return Ok(());
        }
    }
    if !args.is_empty() {
        eprintln!("Usage: sync-server [issue-token <actor>]");
        std::process::exit(2);
    }

    let port = config.port;
    let app = create_app(config).await?;

    let addr = std::net::SocketAddr::from(([0, 0, 0, 0], port));
    tracing::info!("Starting server on {}", addr);

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}

#[cfg(not(feature = "ssr"))]
fn main() {
    eprintln!("Server requires the 'ssr' feature to be enabled.");
    eprintln!("Run with: cargo run --bin sync-server --features ssr");
    std::process::exit(1);
}
