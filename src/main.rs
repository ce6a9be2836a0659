//! Presence Relay - Entry Point
//!
//! Binds the listener and runs the relay until Ctrl+C.

use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

use presence_relay::{Config, RelayServer};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Initialize logging with environment filter
    // Use RUST_LOG env var to control log level
    // e.g., RUST_LOG=debug or RUST_LOG=presence_relay=trace
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new("presence_relay=info")),
        )
        .init();

    info!("Starting collaboration WebSocket server...");

    let config = Config::from_env();
    let server = RelayServer::bind(&config.bind_addr).await?;
    info!("Collaboration server started on {}", server.local_addr()?);
    info!("Press Ctrl+C to stop the server");

    server
        .run(async {
            if let Err(e) = tokio::signal::ctrl_c().await {
                warn!("Failed to listen for shutdown signal: {}", e);
                std::future::pending::<()>().await;
            }
        })
        .await?;

    Ok(())
}
