//! Bidirectional transport: one JSON-RPC message per text frame

use std::sync::Arc;

use axum::{
    extract::{
        ws::{Message, WebSocket, WebSocketUpgrade},
        State,
    },
    response::IntoResponse,
};
use futures::{SinkExt, StreamExt};
use tokio::sync::{broadcast, mpsc};
use tracing::{debug, info, warn};

use super::AppState;
use crate::rpc::{codes, RpcError, RpcRequest, RpcResponse};

/// Outbound frames queued per session
const OUTBOUND_CAPACITY: usize = 32;

pub async fn upgrade(ws: WebSocketUpgrade, State(state): State<Arc<AppState>>) -> impl IntoResponse {
    ws.on_upgrade(move |socket| run_session(socket, state))
}

async fn run_session(socket: WebSocket, state: Arc<AppState>) {
    let _guard = state.track_connection();
    let session = uuid::Uuid::new_v4();
    info!("{}: WebSocket session started", session);

    let (ws_sender, mut ws_receiver) = socket.split();
    let (tx, rx) = mpsc::channel::<String>(OUTBOUND_CAPACITY);

    let send_handle = tokio::spawn(send_loop(ws_sender, rx));
    let forward_handle = tokio::spawn(forward_notifications(state.notifications.subscribe(), tx.clone()));

    while let Some(frame) = ws_receiver.next().await {
        let text = match frame {
            Ok(Message::Text(text)) => text,
            Ok(Message::Binary(bytes)) => String::from_utf8_lossy(&bytes).into_owned(),
            Ok(Message::Close(_)) => break,
            Ok(_) => continue,
            Err(e) => {
                debug!("{}: receive error: {}", session, e);
                break;
            }
        };

        // Replies may go out in a different order than the requests arrived
        let state = Arc::clone(&state);
        let tx = tx.clone();
        tokio::spawn(async move {
            if let Some(reply) = answer(&state, &text).await {
                let _ = tx.send(reply).await;
            }
        });
    }

    forward_handle.abort();
    send_handle.abort();
    info!("{}: WebSocket session ended", session);
}

/// Reply text for one inbound frame, if it warrants one
async fn answer(state: &AppState, text: &str) -> Option<String> {
    debug!("<- {}", text);
    let reply = match serde_json::from_str::<RpcRequest>(text) {
        Ok(request) => state.handler.handle(request).await?,
        Err(e) => {
            warn!("Invalid JSON-RPC frame: {}", e);
            RpcResponse::failure(
                None,
                RpcError {
                    code: codes::PARSE_ERROR,
                    message: format!("Parse error: {}", e),
                },
            )
        }
    };
    match serde_json::to_string(&reply) {
        Ok(text) => Some(text),
        Err(e) => {
            warn!("Failed to encode reply: {}", e);
            None
        }
    }
}

async fn send_loop(
    mut ws_sender: futures::stream::SplitSink<WebSocket, Message>,
    mut rx: mpsc::Receiver<String>,
) {
    while let Some(text) = rx.recv().await {
        debug!("-> {}", text);
        if ws_sender.send(Message::Text(text)).await.is_err() {
            break;
        }
    }
}

async fn forward_notifications(
    mut notifications: broadcast::Receiver<crate::rpc::RpcNotification>,
    tx: mpsc::Sender<String>,
) {
    loop {
        match notifications.recv().await {
            Ok(notification) => {
                let Ok(text) = serde_json::to_string(&notification) else {
                    continue;
                };
                if tx.send(text).await.is_err() {
                    break;
                }
            }
            Err(broadcast::error::RecvError::Lagged(skipped)) => {
                warn!("Dropped {} notifications for a slow WebSocket client", skipped);
            }
            Err(broadcast::error::RecvError::Closed) => break,
        }
    }
}
