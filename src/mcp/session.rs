//! MCP session: handshake, connection state, catalogs and typed operations

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, RwLock, Weak};
use std::time::Duration;

use async_trait::async_trait;
use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::{json, Map, Value};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tracing::{debug, info, warn};

use crate::mcp::correlator::{RequestCorrelator, DEFAULT_REQUEST_TIMEOUT};
use crate::mcp::error::{McpError, McpResult};
use crate::mcp::events::{EventBus, EventKind, SessionEvent, SubscriptionId};
use crate::mcp::protocol::tools::result_failure;
use crate::mcp::protocol::{
    methods, CallToolParams, ClientCapabilities, ClientInfo, GetPromptParams, InitializeParams,
    InitializeResult, JsonRpcMessage, ListPromptsResult, ListResourceTemplatesResult,
    ListResourcesResult, ListToolsResult, Prompt, ReadResourceParams, Resource, ResourceTemplate,
    RootsCapabilities, ServerInfo, Tool, PROTOCOL_VERSION,
};
use crate::mcp::reconnect::{ReconnectController, ReconnectPolicy};
use crate::mcp::transport::{Transport, TransportEvent, TransportKind};

/// Connection state of a session
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    Disconnected,
    Connecting,
    Connected,
}

/// Settings injected into a session
#[derive(Debug, Clone)]
pub struct SessionConfig {
    pub client_name: String,
    pub client_version: String,
    pub request_timeout: Duration,
    pub reconnect: ReconnectPolicy,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            client_name: env!("CARGO_PKG_NAME").to_string(),
            client_version: env!("CARGO_PKG_VERSION").to_string(),
            request_timeout: DEFAULT_REQUEST_TIMEOUT,
            reconnect: ReconnectPolicy::default(),
        }
    }
}

/// The operations tool execution needs from a session
#[async_trait]
pub trait McpOperations: Send + Sync {
    async fn call_tool(&self, name: &str, arguments: Value) -> McpResult<Value>;
    async fn read_resource(&self, uri: &str) -> McpResult<Value>;
    async fn get_prompt(&self, name: &str, arguments: Value) -> McpResult<Value>;
}

#[derive(Default)]
struct ServerDetails {
    capabilities: Map<String, Value>,
    server_info: Option<ServerInfo>,
    announced: Option<Value>,
}

#[derive(Default)]
struct Catalogs {
    tools: Vec<Tool>,
    resources: Vec<Resource>,
    resource_templates: Vec<ResourceTemplate>,
    prompts: Vec<Prompt>,
}

struct SessionInner {
    transport: Arc<dyn Transport>,
    config: SessionConfig,
    correlator: RequestCorrelator,
    events: Arc<EventBus>,
    reconnect: Arc<ReconnectController>,
    state: RwLock<SessionState>,
    /// Bumped on every open and on disconnect; events from older channels are dropped
    generation: AtomicU64,
    details: RwLock<ServerDetails>,
    catalogs: RwLock<Catalogs>,
    dispatcher: Mutex<Option<JoinHandle<()>>>,
}

/// Handle to one logical MCP session. Cloning shares the session.
#[derive(Clone)]
pub struct McpSession {
    inner: Arc<SessionInner>,
}

impl McpSession {
    pub fn new(transport: Arc<dyn Transport>, config: SessionConfig) -> Self {
        let correlator = RequestCorrelator::new(config.request_timeout);
        let reconnect = Arc::new(ReconnectController::new(config.reconnect));
        Self {
            inner: Arc::new(SessionInner {
                transport,
                config,
                correlator,
                events: Arc::new(EventBus::new()),
                reconnect,
                state: RwLock::new(SessionState::Disconnected),
                generation: AtomicU64::new(0),
                details: RwLock::new(ServerDetails::default()),
                catalogs: RwLock::new(Catalogs::default()),
                dispatcher: Mutex::new(None),
            }),
        }
    }

    /// Connect and initialize. A no-op while connected or connecting.
    ///
    /// On failure the reconnection controller takes over in the background
    /// and the error is returned.
    pub async fn connect(&self) -> McpResult<()> {
        if self.state() != SessionState::Disconnected {
            debug!("connect() ignored in state {:?}", self.state());
            return Ok(());
        }

        self.inner.reconnect.cancel();
        if self.inner.reconnect.is_exhausted() {
            self.inner.reconnect.reset();
        }

        match self.inner.establish().await {
            Ok(()) => Ok(()),
            Err(McpError::SessionClosed) => Err(McpError::SessionClosed),
            Err(e) => {
                self.inner.engage_reconnect();
                Err(e)
            }
        }
    }

    /// Tear the session down. Safe to call repeatedly.
    pub async fn disconnect(&self) -> McpResult<()> {
        let inner = &self.inner;
        inner.reconnect.cancel();

        let previous = inner.set_state(SessionState::Disconnected);
        inner.generation.fetch_add(1, Ordering::SeqCst);
        inner.stop_dispatcher();

        if let Err(e) = inner.transport.close().await {
            warn!("Error closing {} transport: {}", inner.transport.kind(), e);
        }
        let rejected = inner.correlator.reject_all(|| McpError::SessionClosed);
        if rejected > 0 {
            debug!("Rejected {} pending requests on disconnect", rejected);
        }

        if previous != SessionState::Disconnected {
            info!("Disconnected from MCP server");
            inner.events.emit(&SessionEvent::Disconnected {
                reason: "disconnected by client".to_string(),
            });
        }
        Ok(())
    }

    /// List tools, replacing the tool catalog
    pub async fn list_tools(&self) -> McpResult<Vec<Tool>> {
        let result: ListToolsResult = self.send_request(methods::TOOLS_LIST, json!({})).await?;
        self.inner.write_catalogs().tools = result.tools.clone();
        Ok(result.tools)
    }

    /// List resources, replacing the resource catalog
    pub async fn list_resources(&self) -> McpResult<Vec<Resource>> {
        let result: ListResourcesResult =
            self.send_request(methods::RESOURCES_LIST, json!({})).await?;
        self.inner.write_catalogs().resources = result.resources.clone();
        Ok(result.resources)
    }

    /// List resource templates, replacing the template catalog
    pub async fn list_resource_templates(&self) -> McpResult<Vec<ResourceTemplate>> {
        let result: ListResourceTemplatesResult = self
            .send_request(methods::RESOURCE_TEMPLATES_LIST, json!({}))
            .await?;
        self.inner.write_catalogs().resource_templates = result.resource_templates.clone();
        Ok(result.resource_templates)
    }

    /// List prompts, replacing the prompt catalog
    pub async fn list_prompts(&self) -> McpResult<Vec<Prompt>> {
        let result: ListPromptsResult = self.send_request(methods::PROMPTS_LIST, json!({})).await?;
        self.inner.write_catalogs().prompts = result.prompts.clone();
        Ok(result.prompts)
    }

    /// Call a tool and return its raw result
    pub async fn call_tool(&self, name: &str, arguments: Value) -> McpResult<Value> {
        let params = CallToolParams {
            name: name.to_string(),
            arguments,
        };
        self.invoke(methods::TOOLS_CALL, params).await
    }

    /// Read a resource by URI and return its raw result
    pub async fn read_resource(&self, uri: &str) -> McpResult<Value> {
        let params = ReadResourceParams {
            uri: uri.to_string(),
        };
        self.invoke(methods::RESOURCES_READ, params).await
    }

    /// Render a prompt and return its raw result
    pub async fn get_prompt(&self, name: &str, arguments: Value) -> McpResult<Value> {
        let params = GetPromptParams {
            name: name.to_string(),
            arguments,
        };
        self.invoke(methods::PROMPTS_GET, params).await
    }

    pub fn state(&self) -> SessionState {
        self.inner.state()
    }

    pub fn is_connected(&self) -> bool {
        self.state() == SessionState::Connected
    }

    pub fn server_info(&self) -> Option<ServerInfo> {
        self.inner.read_details().server_info.clone()
    }

    /// Server info last announced on the event stream, if any
    pub fn announced_server_info(&self) -> Option<Value> {
        self.inner.read_details().announced.clone()
    }

    pub fn capabilities(&self) -> Map<String, Value> {
        self.inner.read_details().capabilities.clone()
    }

    pub fn tools(&self) -> Vec<Tool> {
        self.inner.read_catalogs().tools.clone()
    }

    pub fn resources(&self) -> Vec<Resource> {
        self.inner.read_catalogs().resources.clone()
    }

    pub fn resource_templates(&self) -> Vec<ResourceTemplate> {
        self.inner.read_catalogs().resource_templates.clone()
    }

    pub fn prompts(&self) -> Vec<Prompt> {
        self.inner.read_catalogs().prompts.clone()
    }

    /// Number of requests awaiting a reply
    pub fn pending_requests(&self) -> usize {
        self.inner.correlator.pending_count()
    }

    pub fn client_id(&self) -> Option<String> {
        self.inner.transport.client_id()
    }

    pub fn last_heartbeat(&self) -> Option<Instant> {
        self.inner.transport.last_heartbeat()
    }

    pub fn transport_kind(&self) -> TransportKind {
        self.inner.transport.kind()
    }

    /// Consecutive failed connection attempts since the last success
    pub fn reconnect_attempts(&self) -> u32 {
        self.inner.reconnect.attempts()
    }

    pub fn subscribe<F>(&self, kind: EventKind, handler: F) -> SubscriptionId
    where
        F: Fn(&SessionEvent) + Send + Sync + 'static,
    {
        self.inner.events.subscribe(kind, handler)
    }

    pub fn subscribe_all<F>(&self, handler: F) -> SubscriptionId
    where
        F: Fn(&SessionEvent) + Send + Sync + 'static,
    {
        self.inner.events.subscribe_all(handler)
    }

    pub fn unsubscribe(&self, id: SubscriptionId) -> bool {
        self.inner.events.unsubscribe(id)
    }

    /// Send a request and parse the response
    async fn send_request<P: Serialize, R: DeserializeOwned>(
        &self,
        method: &str,
        params: P,
    ) -> McpResult<R> {
        let reply = self.inner.request(method, serde_json::to_value(params)?).await?;
        if let Some(error) = reply.error {
            return Err(McpError::from_rpc(&error));
        }
        let result = reply.result.unwrap_or(Value::Null);
        serde_json::from_value(result)
            .map_err(|e| McpError::Protocol(format!("Unexpected {} result: {}", method, e)))
    }

    /// Send a tool/resource/prompt request whose failures are invocation errors
    async fn invoke<P: Serialize>(&self, method: &str, params: P) -> McpResult<Value> {
        let reply = self.inner.request(method, serde_json::to_value(params)?).await?;
        if let Some(error) = reply.error {
            return Err(McpError::ToolInvocation(error.message));
        }
        let result = reply.result.unwrap_or(Value::Null);
        if let Some(message) = result_failure(&result) {
            return Err(McpError::ToolInvocation(message));
        }
        Ok(result)
    }
}

#[async_trait]
impl McpOperations for McpSession {
    async fn call_tool(&self, name: &str, arguments: Value) -> McpResult<Value> {
        McpSession::call_tool(self, name, arguments).await
    }

    async fn read_resource(&self, uri: &str) -> McpResult<Value> {
        McpSession::read_resource(self, uri).await
    }

    async fn get_prompt(&self, name: &str, arguments: Value) -> McpResult<Value> {
        McpSession::get_prompt(self, name, arguments).await
    }
}

impl SessionInner {
    fn state(&self) -> SessionState {
        *self.state.read().unwrap_or_else(|p| p.into_inner())
    }

    /// Set the state, returning the previous one
    fn set_state(&self, next: SessionState) -> SessionState {
        let mut state = self.state.write().unwrap_or_else(|p| p.into_inner());
        std::mem::replace(&mut *state, next)
    }

    /// Move `from` -> `to` only if the session is still in `from`
    fn transition(&self, from: SessionState, to: SessionState) -> bool {
        let mut state = self.state.write().unwrap_or_else(|p| p.into_inner());
        if *state == from {
            *state = to;
            true
        } else {
            false
        }
    }

    fn read_details(&self) -> std::sync::RwLockReadGuard<'_, ServerDetails> {
        self.details.read().unwrap_or_else(|p| p.into_inner())
    }

    fn write_details(&self) -> std::sync::RwLockWriteGuard<'_, ServerDetails> {
        self.details.write().unwrap_or_else(|p| p.into_inner())
    }

    fn read_catalogs(&self) -> std::sync::RwLockReadGuard<'_, Catalogs> {
        self.catalogs.read().unwrap_or_else(|p| p.into_inner())
    }

    fn write_catalogs(&self) -> std::sync::RwLockWriteGuard<'_, Catalogs> {
        self.catalogs.write().unwrap_or_else(|p| p.into_inner())
    }

    fn stop_dispatcher(&self) {
        if let Some(handle) = self
            .dispatcher
            .lock()
            .unwrap_or_else(|p| p.into_inner())
            .take()
        {
            handle.abort();
        }
    }

    /// Correlated request on a connected session
    async fn request(&self, method: &str, params: Value) -> McpResult<JsonRpcMessage> {
        if self.state() != SessionState::Connected {
            return Err(McpError::NotConnected);
        }
        self.exchange(method, Some(params)).await
    }

    /// Send one request and wait for its correlated reply
    async fn exchange(&self, method: &str, params: Option<Value>) -> McpResult<JsonRpcMessage> {
        let id = self.correlator.next_id();
        let pending = self.correlator.register(id);
        debug!("Request {} {}", id, method);

        let message = JsonRpcMessage::request(id, method, params);
        pending.deliver(self.transport.send(message)).await
    }

    /// Open the transport and run the initialize handshake
    async fn establish(self: &Arc<Self>) -> McpResult<()> {
        if !self.transition(SessionState::Disconnected, SessionState::Connecting) {
            return Ok(());
        }
        info!("Connecting over {}", self.transport.kind());
        self.events.emit(&SessionEvent::Connecting);

        let generation = self.generation.fetch_add(1, Ordering::SeqCst) + 1;
        let (sender, receiver) = mpsc::unbounded_channel();
        let handle = tokio::spawn(dispatch(Arc::downgrade(self), generation, receiver));
        if let Some(previous) = self
            .dispatcher
            .lock()
            .unwrap_or_else(|p| p.into_inner())
            .replace(handle)
        {
            previous.abort();
        }

        let outcome = match self.transport.open(sender).await {
            Ok(()) => self.initialize().await,
            Err(e) => Err(e),
        };

        match outcome {
            Ok(result) => {
                {
                    let mut details = self.write_details();
                    details.capabilities = result.capabilities;
                    details.server_info = result.server_info;
                }
                *self.write_catalogs() = Catalogs::default();

                if !self.transition(SessionState::Connecting, SessionState::Connected) {
                    // Torn down while the handshake was in flight
                    return Err(McpError::SessionClosed);
                }

                let initialized = JsonRpcMessage::notification(methods::INITIALIZED, None);
                if let Err(e) = self.transport.send(initialized).await {
                    warn!("Failed to send initialized notification: {}", e);
                }

                self.reconnect.reset();
                info!(
                    "Connected to {}",
                    self.read_details()
                        .server_info
                        .as_ref()
                        .map(|s| s.name.as_str())
                        .unwrap_or("MCP server")
                );
                self.events.emit(&SessionEvent::Connected);
                Ok(())
            }
            Err(e) => {
                warn!("Connection failed: {}", e);
                if self.transition(SessionState::Connecting, SessionState::Disconnected) {
                    self.stop_dispatcher();
                    if let Err(close_err) = self.transport.close().await {
                        debug!("Error closing transport after failed connect: {}", close_err);
                    }
                    self.events.emit(&SessionEvent::Disconnected {
                        reason: e.to_string(),
                    });
                    Err(e)
                } else {
                    Err(McpError::SessionClosed)
                }
            }
        }
    }

    async fn initialize(&self) -> McpResult<InitializeResult> {
        let params = InitializeParams {
            protocol_version: PROTOCOL_VERSION.to_string(),
            capabilities: ClientCapabilities {
                roots: RootsCapabilities { list_changed: true },
            },
            client_info: ClientInfo {
                name: self.config.client_name.clone(),
                version: self.config.client_version.clone(),
            },
        };

        let reply = self
            .exchange(methods::INITIALIZE, Some(serde_json::to_value(params)?))
            .await?;
        if let Some(error) = reply.error {
            return Err(McpError::from_rpc(&error));
        }
        serde_json::from_value(reply.result.unwrap_or(Value::Null))
            .map_err(|e| McpError::Protocol(format!("Unexpected initialize result: {}", e)))
    }

    /// Hand the session to the reconnection controller
    fn engage_reconnect(self: &Arc<Self>) {
        let controller = self.reconnect.clone();
        let events = self.events.clone();
        let weak = Arc::downgrade(self);

        let handle = tokio::spawn(async move {
            controller
                .run(&events, move || {
                    let weak = weak.clone();
                    async move {
                        match weak.upgrade() {
                            Some(inner) => inner.establish().await,
                            None => Err(McpError::SessionClosed),
                        }
                    }
                })
                .await;
        });
        self.reconnect.set_task(handle);
    }

    /// The channel ended without us closing it
    fn on_terminated(self: &Arc<Self>, reason: String) {
        if !self.transition(SessionState::Connected, SessionState::Disconnected) {
            // A handshake in flight fails through its own pending request
            self.correlator
                .reject_all(|| McpError::Transport("connection lost".to_string()));
            return;
        }

        warn!("Connection lost: {}", reason);
        let rejected = self
            .correlator
            .reject_all(|| McpError::Transport("connection lost".to_string()));
        if rejected > 0 {
            debug!("Rejected {} pending requests after connection loss", rejected);
        }
        self.events.emit(&SessionEvent::Disconnected { reason });
        self.engage_reconnect();
    }
}

/// Route inbound transport events for one channel generation
async fn dispatch(
    session: Weak<SessionInner>,
    generation: u64,
    mut receiver: mpsc::UnboundedReceiver<TransportEvent>,
) {
    while let Some(event) = receiver.recv().await {
        let Some(inner) = session.upgrade() else {
            break;
        };
        if inner.generation.load(Ordering::SeqCst) != generation {
            debug!("Dropping event from a previous connection");
            break;
        }

        match event {
            TransportEvent::Message(message) => match message.numeric_id() {
                Some(id) => {
                    inner.correlator.resolve(id, message);
                }
                None => warn!("Dropping reply without a usable id"),
            },
            TransportEvent::Notification { method, params } => {
                debug!("Notification {}", method);
                inner
                    .events
                    .emit(&SessionEvent::Notification { method, params });
            }
            TransportEvent::ServerInfo(info) => {
                inner.write_details().announced = Some(info.clone());
                inner.events.emit(&SessionEvent::ServerInfo(info));
            }
            TransportEvent::Terminated(reason) => {
                inner.on_terminated(reason);
                break;
            }
        }
    }
}

impl Drop for SessionInner {
    fn drop(&mut self) {
        self.reconnect.cancel();
        self.stop_dispatcher();
    }
}
