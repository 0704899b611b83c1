//! WebSocket transport: one duplex channel carries every envelope

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use futures::{
    stream::{SplitSink, SplitStream},
    SinkExt, StreamExt,
};
use tokio::net::TcpStream;
use tokio::sync::{mpsc, oneshot};
use tokio_tungstenite::tungstenite::Message as WsMessage;
use tokio_tungstenite::{connect_async, MaybeTlsStream, WebSocketStream};
use tracing::{debug, info, warn};
use url::Url;

use super::{classify, EventSink, Transport, TransportEvent, TransportKind, OPEN_TIMEOUT};
use crate::mcp::error::{McpError, McpResult};
use crate::mcp::protocol::JsonRpcMessage;

type WebSocketSender = SplitSink<WebSocketStream<MaybeTlsStream<TcpStream>>, WsMessage>;
type WebSocketReceiver = SplitStream<WebSocketStream<MaybeTlsStream<TcpStream>>>;

/// Command messages for the connection task
enum Command {
    /// Write one frame; the outcome of the write is reported back
    Send {
        text: String,
        written: oneshot::Sender<McpResult<()>>,
    },
    /// Close the connection
    Close,
}

/// Handle to a running connection task
struct Link {
    command_sender: mpsc::Sender<Command>,
    connected: Arc<AtomicBool>,
}

/// WebSocket transport
pub struct WebSocketTransport {
    url: Url,
    link: Mutex<Option<Link>>,
}

impl WebSocketTransport {
    pub fn new(url: &str) -> McpResult<Self> {
        let url = Url::parse(url)?;
        match url.scheme() {
            "ws" | "wss" => {}
            other => {
                return Err(McpError::Transport(format!(
                    "Unsupported WebSocket scheme: {}",
                    other
                )))
            }
        }
        Ok(Self {
            url,
            link: Mutex::new(None),
        })
    }

    pub fn url(&self) -> &Url {
        &self.url
    }

    fn command_sender(&self) -> Option<mpsc::Sender<Command>> {
        let guard = self.link.lock().unwrap_or_else(|p| p.into_inner());
        guard
            .as_ref()
            .filter(|link| link.connected.load(Ordering::SeqCst))
            .map(|link| link.command_sender.clone())
    }

    fn take_link(&self) -> Option<Link> {
        self.link.lock().unwrap_or_else(|p| p.into_inner()).take()
    }

    /// Connection task: owns both socket halves until close or failure
    async fn connection_task(
        mut ws_sender: WebSocketSender,
        mut ws_receiver: WebSocketReceiver,
        mut cmd_receiver: mpsc::Receiver<Command>,
        connected: Arc<AtomicBool>,
        events: EventSink,
    ) {
        // Set when the loop ends for any reason other than a Close command
        let mut terminated: Option<String> = None;

        loop {
            tokio::select! {
                // Handle incoming WebSocket messages
                ws_msg = ws_receiver.next() => {
                    match ws_msg {
                        Some(Ok(WsMessage::Text(text))) => Self::handle_text(&text, &events),
                        Some(Ok(WsMessage::Close(frame))) => {
                            debug!("Server closed WebSocket: {:?}", frame);
                            terminated = Some("server closed the connection".to_string());
                            break;
                        }
                        Some(Ok(_)) => {} // Ping/pong and binary frames carry no envelopes
                        Some(Err(e)) => {
                            warn!("WebSocket error: {}", e);
                            terminated = Some(e.to_string());
                            break;
                        }
                        None => {
                            terminated = Some("connection lost".to_string());
                            break;
                        }
                    }
                },

                // Handle commands from the transport handle
                cmd = cmd_receiver.recv() => {
                    match cmd {
                        Some(Command::Send { text, written }) => {
                            let outcome = ws_sender
                                .send(WsMessage::Text(text))
                                .await
                                .map_err(|e| McpError::Transport(format!("WebSocket write failed: {}", e)));
                            let failed = outcome.is_err();
                            let _ = written.send(outcome);
                            if failed {
                                terminated = Some("write failed".to_string());
                                break;
                            }
                        },
                        Some(Command::Close) | None => {
                            if let Err(e) = ws_sender.close().await {
                                debug!("Error closing WebSocket: {}", e);
                            }
                            break;
                        }
                    }
                }
            }
        }

        connected.store(false, Ordering::SeqCst);

        if let Some(reason) = terminated {
            info!("WebSocket connection ended: {}", reason);
            let _ = events.send(TransportEvent::Terminated(reason));
        }
    }

    fn handle_text(text: &str, events: &EventSink) {
        debug!("<- {}", text);
        match serde_json::from_str::<JsonRpcMessage>(text) {
            Ok(message) => match classify(message) {
                Some(event) => {
                    let _ = events.send(event);
                }
                None => debug!("Ignoring server-initiated request"),
            },
            Err(e) => warn!("Dropping malformed frame: {}", e),
        }
    }
}

#[async_trait]
impl Transport for WebSocketTransport {
    async fn open(&self, events: EventSink) -> McpResult<()> {
        if let Some(stale) = self.take_link() {
            let _ = stale.command_sender.send(Command::Close).await;
        }

        info!("Connecting to {}", self.url);
        let (ws_stream, _) = tokio::time::timeout(OPEN_TIMEOUT, connect_async(self.url.as_str()))
            .await
            .map_err(|_| McpError::Transport(format!("Timed out connecting to {}", self.url)))?
            .map_err(|e| McpError::Transport(format!("Failed to connect: {}", e)))?;

        let (ws_sender, ws_receiver) = ws_stream.split();
        let (cmd_sender, cmd_receiver) = mpsc::channel(32);
        let connected = Arc::new(AtomicBool::new(true));

        tokio::spawn(Self::connection_task(
            ws_sender,
            ws_receiver,
            cmd_receiver,
            connected.clone(),
            events,
        ));

        *self.link.lock().unwrap_or_else(|p| p.into_inner()) = Some(Link {
            command_sender: cmd_sender,
            connected,
        });
        Ok(())
    }

    async fn send(&self, message: JsonRpcMessage) -> McpResult<()> {
        let sender = self
            .command_sender()
            .ok_or_else(|| McpError::Transport("WebSocket is not open".to_string()))?;

        let text = serde_json::to_string(&message)?;
        debug!("-> {}", text);

        let (written, outcome) = oneshot::channel();
        sender
            .send(Command::Send { text, written })
            .await
            .map_err(|_| McpError::Transport("connection lost".to_string()))?;
        outcome
            .await
            .map_err(|_| McpError::Transport("connection lost".to_string()))?
    }

    async fn close(&self) -> McpResult<()> {
        if let Some(link) = self.take_link() {
            if link.connected.load(Ordering::SeqCst) {
                let _ = link.command_sender.send(Command::Close).await;
            }
        }
        Ok(())
    }

    fn is_open(&self) -> bool {
        self.command_sender().is_some()
    }

    fn kind(&self) -> TransportKind {
        TransportKind::WebSocket
    }
}

impl Drop for WebSocketTransport {
    fn drop(&mut self) {
        if self.is_open() {
            debug!("WebSocketTransport dropped while still connected");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_rejects_non_websocket_urls() {
        assert!(WebSocketTransport::new("ws://localhost:8765/ws").is_ok());
        assert!(matches!(
            WebSocketTransport::new("http://localhost:8765"),
            Err(McpError::Transport(_))
        ));
        assert!(matches!(
            WebSocketTransport::new("not a url"),
            Err(McpError::Url(_))
        ));
    }

    #[tokio::test]
    async fn test_send_before_open_fails() {
        let transport = WebSocketTransport::new("ws://localhost:1/ws").unwrap();
        assert!(!transport.is_open());
        let err = transport
            .send(JsonRpcMessage::request(1, "tools/list", Some(json!({}))))
            .await
            .unwrap_err();
        assert!(matches!(err, McpError::Transport(_)));
        // Closing an unopened transport is harmless
        transport.close().await.unwrap();
    }

    #[test]
    fn test_text_frames_become_events() {
        let (tx, mut rx) = mpsc::unbounded_channel();
        WebSocketTransport::handle_text(r#"{"jsonrpc":"2.0","id":2,"result":{}}"#, &tx);
        WebSocketTransport::handle_text("not json", &tx);
        WebSocketTransport::handle_text(
            r#"{"jsonrpc":"2.0","method":"notifications/message","params":{"level":"info"}}"#,
            &tx,
        );

        assert!(matches!(rx.try_recv(), Ok(TransportEvent::Message(m)) if m.numeric_id() == Some(2)));
        assert!(matches!(
            rx.try_recv(),
            Ok(TransportEvent::Notification { method, .. }) if method == "notifications/message"
        ));
        assert!(rx.try_recv().is_err());
    }
}
