pub mod http;
pub mod sse;
pub mod ws;

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Instant;

use axum::{
    extract::State,
    http::{HeaderValue, Method},
    response::IntoResponse,
    routing::{get, post},
    Json, Router,
};
use serde_json::json;
use tokio::sync::broadcast;
use tower_http::cors::{AllowOrigin, Any, CorsLayer};
use tower_http::trace::TraceLayer;
use tracing::warn;

use crate::catalog;
use crate::config::Config;
use crate::errors::ServerResult;
use crate::handler::McpHandler;
use crate::rpc::RpcNotification;
use crate::weather::WeatherClient;

/// Buffered notifications per subscriber before it starts lagging
const NOTIFICATION_CAPACITY: usize = 64;

/// Application state shared across handlers
pub struct AppState {
    pub config: Config,
    pub handler: McpHandler,
    pub notifications: broadcast::Sender<RpcNotification>,
    connections: AtomicUsize,
    started_at: Instant,
}

impl AppState {
    pub fn new(config: Config) -> ServerResult<Arc<Self>> {
        let (notifications, _) = broadcast::channel(NOTIFICATION_CAPACITY);
        let weather = WeatherClient::new(config.upstream.clone())?;
        Ok(Arc::new(Self {
            handler: McpHandler::new(weather, notifications.clone()),
            config,
            notifications,
            connections: AtomicUsize::new(0),
            started_at: Instant::now(),
        }))
    }

    /// Open WebSocket sessions plus open event streams
    pub fn connections(&self) -> usize {
        self.connections.load(Ordering::SeqCst)
    }

    /// Count a connection until the returned guard is dropped
    pub(crate) fn track_connection(self: &Arc<Self>) -> ConnectionGuard {
        self.connections.fetch_add(1, Ordering::SeqCst);
        ConnectionGuard {
            state: Arc::clone(self),
        }
    }
}

pub(crate) struct ConnectionGuard {
    state: Arc<AppState>,
}

impl Drop for ConnectionGuard {
    fn drop(&mut self) {
        self.state.connections.fetch_sub(1, Ordering::SeqCst);
    }
}

fn cors_layer(config: &Config) -> CorsLayer {
    let origins: Vec<HeaderValue> = config
        .allowed_origins
        .iter()
        .filter_map(|origin| match origin.parse() {
            Ok(value) => Some(value),
            Err(_) => {
                warn!("Ignoring invalid CORS origin {}", origin);
                None
            }
        })
        .collect();

    if origins.is_empty() {
        return CorsLayer::permissive();
    }
    CorsLayer::new()
        .allow_origin(AllowOrigin::list(origins))
        .allow_methods([Method::GET, Method::POST, Method::OPTIONS])
        .allow_headers(Any)
}

/// Build the full route table
pub fn router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/", get(describe))
        .route("/health", get(health))
        .route("/ws", get(ws::upgrade))
        .route("/mcp/sse", get(sse::stream))
        .route("/mcp/initialize", post(http::initialize))
        .route("/mcp/tools", post(http::tools))
        .route("/mcp/resources", post(http::resources))
        .route("/mcp/prompts", post(http::prompts))
        .route("/mcp/notifications", post(http::notifications))
        .layer(TraceLayer::new_for_http())
        .layer(cors_layer(&state.config))
        .with_state(state)
}

async fn describe() -> impl IntoResponse {
    Json(json!({
        "name": catalog::SERVER_NAME,
        "version": catalog::SERVER_VERSION,
        "description": "Model Context Protocol demo server over WebSocket and Server-Sent Events",
        "endpoints": {
            "websocket": "GET /ws",
            "initialize": "POST /mcp/initialize",
            "tools": "POST /mcp/tools",
            "resources": "POST /mcp/resources",
            "prompts": "POST /mcp/prompts",
            "notifications": "POST /mcp/notifications",
            "sse": "GET /mcp/sse",
            "health": "GET /health",
        }
    }))
}

async fn health(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    Json(json!({
        "status": "healthy",
        "timestamp": chrono::Utc::now().timestamp_millis() as f64 / 1000.0,
        "connections": state.connections(),
        "uptime_secs": state.started_at.elapsed().as_secs(),
    }))
}
