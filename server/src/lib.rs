//! mcp-duet-server
//!
//! Demo MCP server: three weather tools, animal and weather resources, and
//! three prompts, served over WebSocket (`/ws`) and HTTP+SSE (`/mcp/*`).

pub mod api;
pub mod catalog;
pub mod config;
pub mod errors;
pub mod handler;
pub mod rpc;
pub mod weather;

use std::sync::Arc;

use tokio::net::TcpListener;
use tracing::info;

pub use api::{router, AppState};
pub use config::Config;

/// Serve on an already bound listener until the process stops
pub async fn serve(listener: TcpListener, state: Arc<AppState>) -> std::io::Result<()> {
    if let Ok(addr) = listener.local_addr() {
        info!("Listening on {} (WebSocket at /ws, event stream at /mcp/sse)", addr);
    }
    axum::serve(listener, router(state).into_make_service()).await
}
