//! Transports carrying MCP envelopes to and from a server

pub mod sse;
pub mod websocket;

use std::fmt;
use std::time::Duration;

use async_trait::async_trait;
use serde_json::Value;
use tokio::sync::mpsc;
use tokio::time::Instant;

use crate::mcp::error::McpResult;
use crate::mcp::protocol::JsonRpcMessage;

pub use sse::SseTransport;
pub use websocket::WebSocketTransport;

/// How long `open` may take before it counts as a failure
pub const OPEN_TIMEOUT: Duration = Duration::from_secs(10);

/// Inbound traffic delivered by an open transport
#[derive(Debug, Clone, PartialEq)]
pub enum TransportEvent {
    /// A reply to one of our requests
    Message(JsonRpcMessage),
    /// A server-initiated notification
    Notification { method: String, params: Value },
    /// Server-info announcement from the event stream
    ServerInfo(Value),
    /// The channel ended without `close()` being called
    Terminated(String),
}

pub type EventSink = mpsc::UnboundedSender<TransportEvent>;

/// Which wire shape a transport speaks
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransportKind {
    WebSocket,
    Sse,
}

impl fmt::Display for TransportKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TransportKind::WebSocket => write!(f, "websocket"),
            TransportKind::Sse => write!(f, "sse"),
        }
    }
}

/// A channel to an MCP server
#[async_trait]
pub trait Transport: Send + Sync {
    /// Open the channel. Once this returns, inbound traffic flows into `events`
    /// until the channel is closed or terminates.
    async fn open(&self, events: EventSink) -> McpResult<()>;

    /// Send one envelope. Replies arrive as [`TransportEvent::Message`].
    async fn send(&self, message: JsonRpcMessage) -> McpResult<()>;

    /// Close the channel. No `Terminated` event follows.
    async fn close(&self) -> McpResult<()>;

    fn is_open(&self) -> bool;

    fn kind(&self) -> TransportKind;

    /// Server-assigned client id, for transports that receive one
    fn client_id(&self) -> Option<String> {
        None
    }

    /// When the server last proved it was alive
    fn last_heartbeat(&self) -> Option<Instant> {
        None
    }
}

/// Sort a decoded inbound envelope into the event it represents.
///
/// Returns `None` for server-to-client requests, which this client does not serve.
pub(crate) fn classify(message: JsonRpcMessage) -> Option<TransportEvent> {
    use crate::mcp::protocol::MessageKind;

    match message.kind() {
        MessageKind::Notification => Some(TransportEvent::Notification {
            method: message.method.unwrap_or_default(),
            params: message.params.unwrap_or(Value::Null),
        }),
        MessageKind::Request => None,
        _ => Some(TransportEvent::Message(message)),
    }
}
