//! mcp-duet-server
//!
//! Binds the configured address and serves both MCP transports.

use anyhow::{Context, Result};
use tracing_subscriber::EnvFilter;

use mcp_duet_server::{serve, AppState, Config};

#[tokio::main]
async fn main() -> Result<()> {
    // Load configuration from environment variables
    let config = Config::from_env().context("Failed to load configuration")?;

    // Initialize logging based on environment
    let default_filter = if config.is_development() {
        "debug,hyper=info"
    } else {
        "info"
    };
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_filter)),
        )
        .init();

    let addr = config
        .socket_addr()
        .with_context(|| format!("Invalid listen address {}:{}", config.host, config.port))?;
    let state = AppState::new(config).context("Failed to build application state")?;

    tracing::info!("Starting server on {}", addr);
    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .with_context(|| format!("Failed to bind {}", addr))?;
    serve(listener, state).await.context("Server error")?;

    Ok(())
}
