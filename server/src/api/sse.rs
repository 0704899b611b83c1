//! Server-to-client half of the split transport

use std::collections::VecDeque;
use std::convert::Infallible;
use std::sync::Arc;

use axum::{
    extract::State,
    response::sse::{Event, Sse},
};
use futures::stream::{self, Stream};
use serde_json::{json, Value};
use tokio::sync::broadcast::{self, error::RecvError};
use tokio::time::{interval_at, Instant, Interval, MissedTickBehavior};
use tracing::{debug, info, warn};

use super::{AppState, ConnectionGuard};
use crate::catalog;
use crate::rpc::RpcNotification;

/// Per-connection stream state
struct Subscriber {
    client_id: String,
    queued: VecDeque<Value>,
    heartbeat: Interval,
    notifications: broadcast::Receiver<RpcNotification>,
    _guard: ConnectionGuard,
}

impl Subscriber {
    async fn next_payload(&mut self) -> Option<Value> {
        if let Some(payload) = self.queued.pop_front() {
            return Some(payload);
        }
        loop {
            tokio::select! {
                _ = self.heartbeat.tick() => {
                    return Some(json!({
                        "type": "heartbeat",
                        "timestamp": chrono::Utc::now().timestamp_millis() as f64 / 1000.0,
                    }));
                }
                received = self.notifications.recv() => match received {
                    Ok(notification) => {
                        return Some(json!({
                            "type": "notification",
                            "method": notification.method,
                            "params": notification.params,
                        }));
                    }
                    Err(RecvError::Lagged(skipped)) => {
                        warn!("{}: dropped {} notifications", self.client_id, skipped);
                    }
                    Err(RecvError::Closed) => return None,
                },
            }
        }
    }
}

impl Drop for Subscriber {
    fn drop(&mut self) {
        info!("{}: event stream closed", self.client_id);
    }
}

/// `GET /mcp/sse`: greet, then heartbeats and notifications until the client leaves
pub async fn stream(
    State(state): State<Arc<AppState>>,
) -> Sse<impl Stream<Item = Result<Event, Infallible>>> {
    let client_id = format!("client_{}", uuid::Uuid::new_v4().simple());
    info!("{}: event stream opened", client_id);

    let period = state.config.heartbeat_interval();
    let mut heartbeat = interval_at(Instant::now() + period, period);
    heartbeat.set_missed_tick_behavior(MissedTickBehavior::Delay);

    let subscriber = Subscriber {
        queued: VecDeque::from([
            json!({ "type": "connected", "clientId": client_id }),
            json!({ "type": "serverInfo", "data": catalog::server_info() }),
        ]),
        client_id,
        heartbeat,
        notifications: state.notifications.subscribe(),
        _guard: state.track_connection(),
    };

    let events = stream::unfold(subscriber, |mut subscriber| async move {
        let payload = subscriber.next_payload().await?;
        debug!("{}: -> {}", subscriber.client_id, payload);
        let event = Event::default().data(payload.to_string());
        Some((Ok::<_, Infallible>(event), subscriber))
    });
    Sse::new(events)
}
