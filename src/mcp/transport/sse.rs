//! HTTP+SSE transport: requests are independent POSTs, server events
//! arrive on a long-lived `text/event-stream` subscription.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use futures::StreamExt;
use reqwest::header::ACCEPT;
use serde_json::Value;
use tokio::sync::oneshot;
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tracing::{debug, info, warn};
use url::Url;

use super::{EventSink, Transport, TransportEvent, TransportKind, OPEN_TIMEOUT};
use crate::mcp::error::{McpError, McpResult};
use crate::mcp::protocol::JsonRpcMessage;

/// Splits a byte stream into trimmed, non-empty lines.
///
/// Chunks may end mid-line; the tail is kept until the next push.
#[derive(Debug, Default)]
pub struct SseLineBuffer {
    buffer: Vec<u8>,
}

impl SseLineBuffer {
    pub fn push(&mut self, chunk: &[u8]) -> Vec<String> {
        self.buffer.extend_from_slice(chunk);
        self.drain_lines(false)
    }

    /// Flush whatever is left once the stream has ended
    pub fn finish(&mut self) -> Vec<String> {
        self.drain_lines(true)
    }

    fn drain_lines(&mut self, flush: bool) -> Vec<String> {
        let mut lines = Vec::new();
        let mut start = 0;

        while let Some(offset) = self.buffer[start..].iter().position(|b| *b == b'\n') {
            let newline = start + offset;
            let mut end = newline;
            if end > start && self.buffer[end - 1] == b'\r' {
                end -= 1;
            }
            push_trimmed(&mut lines, &self.buffer[start..end]);
            start = newline + 1;
        }

        if flush {
            push_trimmed(&mut lines, &self.buffer[start..]);
            self.buffer.clear();
        } else {
            self.buffer.drain(..start);
        }
        lines
    }
}

fn push_trimmed(lines: &mut Vec<String>, bytes: &[u8]) {
    if let Ok(text) = std::str::from_utf8(bytes) {
        let trimmed = text.trim();
        if !trimmed.is_empty() {
            lines.push(trimmed.to_string());
        }
    }
}

/// Payload of a `data:` line; other fields and comments yield `None`
pub fn sse_data_payload(line: &str) -> Option<&str> {
    line.strip_prefix("data:").map(str::trim)
}

/// Tagged event carried on the subscription
#[derive(Debug, Clone, PartialEq)]
pub enum StreamEvent {
    Connected { client_id: Option<String> },
    ServerInfo(Value),
    Heartbeat,
    Notification { method: String, params: Value },
    Unknown(String),
}

/// Decode one `data:` payload into a [`StreamEvent`]
pub fn decode_stream_event(payload: &str) -> McpResult<StreamEvent> {
    let value: Value = serde_json::from_str(payload)?;
    let kind = value.get("type").and_then(Value::as_str).unwrap_or_default();

    Ok(match kind {
        "connected" => StreamEvent::Connected {
            client_id: value
                .get("clientId")
                .and_then(Value::as_str)
                .map(str::to_string),
        },
        "serverInfo" => StreamEvent::ServerInfo(value.get("data").cloned().unwrap_or(Value::Null)),
        "heartbeat" => StreamEvent::Heartbeat,
        "notification" => StreamEvent::Notification {
            method: value
                .get("method")
                .and_then(Value::as_str)
                .unwrap_or_default()
                .to_string(),
            params: value.get("params").cloned().unwrap_or(Value::Null),
        },
        other => StreamEvent::Unknown(other.to_string()),
    })
}

/// POST endpoint serving a method family
pub fn endpoint_for(method: &str) -> Option<&'static str> {
    let family = method.split('/').next().unwrap_or_default();
    match family {
        "initialize" => Some("mcp/initialize"),
        "tools" => Some("mcp/tools"),
        "resources" => Some("mcp/resources"),
        "prompts" => Some("mcp/prompts"),
        "notifications" => Some("mcp/notifications"),
        _ => None,
    }
}

/// State shared with the subscription task
#[derive(Default)]
struct StreamState {
    open: AtomicBool,
    client_id: Mutex<Option<String>>,
    last_heartbeat: Mutex<Option<Instant>>,
}

impl StreamState {
    fn touch(&self) {
        *self.last_heartbeat.lock().unwrap_or_else(|p| p.into_inner()) = Some(Instant::now());
    }
}

/// HTTP+SSE transport
pub struct SseTransport {
    base: Url,
    http: reqwest::Client,
    state: Arc<StreamState>,
    subscription: Mutex<Option<JoinHandle<()>>>,
    events: Mutex<Option<EventSink>>,
}

impl SseTransport {
    pub fn new(base_url: &str) -> McpResult<Self> {
        let mut base = Url::parse(base_url)?;
        match base.scheme() {
            "http" | "https" => {}
            other => {
                return Err(McpError::Transport(format!(
                    "Unsupported HTTP scheme: {}",
                    other
                )))
            }
        }
        // Joining relative paths needs a trailing slash on the base
        if !base.path().ends_with('/') {
            let path = format!("{}/", base.path());
            base.set_path(&path);
        }

        Ok(Self {
            base,
            http: reqwest::Client::new(),
            state: Arc::new(StreamState::default()),
            subscription: Mutex::new(None),
            events: Mutex::new(None),
        })
    }

    pub fn base_url(&self) -> &Url {
        &self.base
    }

    fn stop_subscription(&self) {
        self.state.open.store(false, Ordering::SeqCst);
        if let Some(handle) = self
            .subscription
            .lock()
            .unwrap_or_else(|p| p.into_inner())
            .take()
        {
            handle.abort();
        }
    }

    fn sink(&self) -> Option<EventSink> {
        self.events
            .lock()
            .unwrap_or_else(|p| p.into_inner())
            .clone()
    }

    async fn health_check(&self) -> McpResult<()> {
        let url = self.base.join("health")?;
        let response = self
            .http
            .get(url)
            .send()
            .await
            .map_err(|e| McpError::Transport(format!("Health check failed: {}", e)))?;
        if !response.status().is_success() {
            return Err(McpError::Transport(format!(
                "Health check failed: HTTP {}",
                response.status()
            )));
        }
        Ok(())
    }

    async fn subscription_task(
        response: reqwest::Response,
        state: Arc<StreamState>,
        events: EventSink,
        ready: oneshot::Sender<()>,
    ) {
        let mut ready = Some(ready);
        let mut stream = response.bytes_stream();
        let mut buffer = SseLineBuffer::default();

        let reason = loop {
            match stream.next().await {
                Some(Ok(chunk)) => {
                    for line in buffer.push(&chunk) {
                        Self::handle_line(&line, &state, &events, &mut ready);
                    }
                }
                Some(Err(e)) => break format!("event stream failed: {}", e),
                None => {
                    for line in buffer.finish() {
                        Self::handle_line(&line, &state, &events, &mut ready);
                    }
                    break "event stream ended".to_string();
                }
            }
        };

        if state.open.swap(false, Ordering::SeqCst) {
            info!("SSE subscription dropped: {}", reason);
            let _ = events.send(TransportEvent::Terminated(reason));
        }
    }

    fn handle_line(
        line: &str,
        state: &StreamState,
        events: &EventSink,
        ready: &mut Option<oneshot::Sender<()>>,
    ) {
        let Some(payload) = sse_data_payload(line) else {
            return;
        };
        let event = match decode_stream_event(payload) {
            Ok(event) => event,
            Err(e) => {
                warn!("Dropping malformed SSE payload: {}", e);
                return;
            }
        };
        debug!("SSE event: {:?}", event);
        state.touch();

        match event {
            StreamEvent::Connected { client_id } => {
                info!("SSE stream acknowledged, client id {:?}", client_id);
                *state.client_id.lock().unwrap_or_else(|p| p.into_inner()) = client_id;
            }
            StreamEvent::ServerInfo(info) => {
                let _ = events.send(TransportEvent::ServerInfo(info));
            }
            StreamEvent::Heartbeat => {}
            StreamEvent::Notification { method, params } => {
                let _ = events.send(TransportEvent::Notification { method, params });
            }
            StreamEvent::Unknown(kind) => warn!("Ignoring unknown SSE event type '{}'", kind),
        }

        if let Some(ready) = ready.take() {
            state.open.store(true, Ordering::SeqCst);
            let _ = ready.send(());
        }
    }
}

#[async_trait]
impl Transport for SseTransport {
    async fn open(&self, events: EventSink) -> McpResult<()> {
        self.stop_subscription();
        self.health_check().await?;

        let url = self.base.join("mcp/sse")?;
        info!("Opening SSE subscription at {}", url);
        let response = self
            .http
            .get(url)
            .header(ACCEPT, "text/event-stream")
            .send()
            .await
            .map_err(|e| McpError::Transport(format!("Failed to open event stream: {}", e)))?;
        if !response.status().is_success() {
            return Err(McpError::Transport(format!(
                "Failed to open event stream: HTTP {}",
                response.status()
            )));
        }

        let (ready_tx, ready_rx) = oneshot::channel();
        let handle = tokio::spawn(Self::subscription_task(
            response,
            self.state.clone(),
            events.clone(),
            ready_tx,
        ));
        *self.subscription.lock().unwrap_or_else(|p| p.into_inner()) = Some(handle);

        match tokio::time::timeout(OPEN_TIMEOUT, ready_rx).await {
            Ok(Ok(())) => {
                *self.events.lock().unwrap_or_else(|p| p.into_inner()) = Some(events);
                Ok(())
            }
            Ok(Err(_)) => {
                self.stop_subscription();
                Err(McpError::Transport(
                    "Event stream closed before its first event".to_string(),
                ))
            }
            Err(_) => {
                self.stop_subscription();
                Err(McpError::Transport(
                    "Timed out waiting for the event stream".to_string(),
                ))
            }
        }
    }

    async fn send(&self, message: JsonRpcMessage) -> McpResult<()> {
        let events = self
            .sink()
            .filter(|_| self.is_open())
            .ok_or_else(|| McpError::Transport("Event stream is not open".to_string()))?;

        let path = endpoint_for(message.method_name()).ok_or_else(|| {
            McpError::Protocol(format!("No endpoint for method '{}'", message.method_name()))
        })?;
        let url = self.base.join(path)?;
        debug!("POST {} {}", url, message.method_name());

        let response = self
            .http
            .post(url)
            .json(&message)
            .send()
            .await
            .map_err(|e| McpError::Transport(format!("POST failed: {}", e)))?;
        let status = response.status();

        if message.id.is_none() {
            if !status.is_success() {
                warn!(
                    "Notification {} was not accepted: HTTP {}",
                    message.method_name(),
                    status
                );
            }
            return Ok(());
        }

        if !status.is_success() {
            return Err(McpError::Transport(format!("POST failed: HTTP {}", status)));
        }

        let mut reply: JsonRpcMessage = response
            .json()
            .await
            .map_err(|e| McpError::Protocol(format!("Malformed reply: {}", e)))?;
        if reply.id.is_none() {
            reply.id = message.id.clone();
        }

        events
            .send(TransportEvent::Message(reply))
            .map_err(|_| McpError::Transport("connection lost".to_string()))
    }

    async fn close(&self) -> McpResult<()> {
        self.stop_subscription();
        self.events.lock().unwrap_or_else(|p| p.into_inner()).take();
        Ok(())
    }

    fn is_open(&self) -> bool {
        self.state.open.load(Ordering::SeqCst)
    }

    fn kind(&self) -> TransportKind {
        TransportKind::Sse
    }

    fn client_id(&self) -> Option<String> {
        self.state
            .client_id
            .lock()
            .unwrap_or_else(|p| p.into_inner())
            .clone()
    }

    fn last_heartbeat(&self) -> Option<Instant> {
        *self
            .state
            .last_heartbeat
            .lock()
            .unwrap_or_else(|p| p.into_inner())
    }
}

impl Drop for SseTransport {
    fn drop(&mut self) {
        self.stop_subscription();
    }
}
