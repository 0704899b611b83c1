//! The client against the in-process demo server, over both transports.
//!
//! Only resources, prompts and locally rejected tool calls are exercised so
//! nothing here reaches the public weather APIs.

use std::net::SocketAddr;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use serde_json::{json, Value};
use tokio::net::TcpListener;
use tokio::sync::mpsc;

use mcp_duet::agent::{AgentConfig, Orchestrator, ToolCatalog};
use mcp_duet::llm::{Backend, FunctionCall, FunctionDeclaration, LlmError, LlmResponse, Part, Turn};
use mcp_duet::mcp::{
    EventKind, McpError, McpSession, SessionConfig, SessionEvent, SessionState, SseTransport,
    Transport, TransportKind, WebSocketTransport,
};
use mcp_duet_server::{AppState, Config};

async fn start_server() -> (SocketAddr, Arc<AppState>) {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let state = AppState::new(Config::local(addr.port())).unwrap();
    tokio::spawn(mcp_duet_server::serve(listener, state.clone()));
    (addr, state)
}

fn transport(kind: TransportKind, addr: SocketAddr) -> Arc<dyn Transport> {
    match kind {
        TransportKind::WebSocket => {
            Arc::new(WebSocketTransport::new(&format!("ws://{}/ws", addr)).unwrap())
        }
        TransportKind::Sse => Arc::new(SseTransport::new(&format!("http://{}", addr)).unwrap()),
    }
}

async fn connected_session(kind: TransportKind) -> (McpSession, Arc<AppState>) {
    let (addr, state) = start_server().await;
    let session = McpSession::new(transport(kind, addr), SessionConfig::default());
    session.connect().await.unwrap();
    (session, state)
}

fn text_of(result: &Value) -> &str {
    result["contents"][0]["text"].as_str().unwrap()
}

async fn catalogs_and_reads(kind: TransportKind) {
    let (session, _state) = connected_session(kind).await;
    assert_eq!(session.state(), SessionState::Connected);
    assert_eq!(session.server_info().unwrap().name, "mcp-duet-server");

    let tools = session.list_tools().await.unwrap();
    let names: Vec<&str> = tools.iter().map(|t| t.name.as_str()).collect();
    assert_eq!(
        names,
        ["get_weather_alerts", "get_coordinates", "get_weather_forecast"]
    );

    let resources = session.list_resources().await.unwrap();
    assert!(resources.iter().any(|r| r.uri == "animal://cloudwhale"));
    let templates = session.list_resource_templates().await.unwrap();
    assert_eq!(templates.len(), 4);
    let prompts = session.list_prompts().await.unwrap();
    assert_eq!(prompts.len(), 3);

    let facts = session.read_resource("animal://facts/elephant/diet").await.unwrap();
    assert_eq!(
        text_of(&facts),
        "Elephant - Diet: Elephants are herbivores, consuming up to 300 pounds of vegetation daily."
    );

    let missing = session.read_resource("weather://report/paris-fr/3").await;
    assert!(matches!(missing, Err(McpError::ToolInvocation(m)) if m.contains("not supported")));

    let prompt = session
        .get_prompt("habitat_weather", json!({"animal": "lion", "location": "Kenya"}))
        .await
        .unwrap();
    assert_eq!(prompt["description"], "Habitat and weather analysis for lion in Kenya");

    let unknown = session.call_tool("get_tides", json!({})).await;
    assert!(matches!(unknown, Err(McpError::ToolInvocation(m)) if m == "Unknown tool: get_tides"));

    session.disconnect().await.unwrap();
    assert_eq!(session.state(), SessionState::Disconnected);
    assert!(matches!(
        session.list_tools().await,
        Err(McpError::NotConnected)
    ));
}

#[tokio::test]
async fn test_catalogs_and_reads_over_websocket() {
    catalogs_and_reads(TransportKind::WebSocket).await;
}

#[tokio::test]
async fn test_catalogs_and_reads_over_sse() {
    catalogs_and_reads(TransportKind::Sse).await;
}

#[tokio::test]
async fn test_sse_stream_assigns_client_id() {
    let (session, state) = connected_session(TransportKind::Sse).await;
    assert!(session.client_id().unwrap().starts_with("client_"));
    assert!(session.last_heartbeat().is_some());
    assert_eq!(state.connections(), 1);
    session.disconnect().await.unwrap();
}

async fn tool_failure_is_broadcast(kind: TransportKind) {
    let (session, _state) = connected_session(kind).await;
    let (tx, mut rx) = mpsc::unbounded_channel();
    session.subscribe(EventKind::Notification, move |event| {
        if let SessionEvent::Notification { method, params } = event {
            let _ = tx.send((method.clone(), params.clone()));
        }
    });

    // Rejected before any upstream request is made
    let failed = session.call_tool("get_weather_alerts", json!({})).await;
    assert!(matches!(failed, Err(McpError::ToolInvocation(m)) if m.contains("state")));

    let (method, params) = tokio::time::timeout(Duration::from_secs(5), rx.recv())
        .await
        .expect("notification not delivered")
        .unwrap();
    assert_eq!(method, "notifications/message");
    assert_eq!(params["level"], "error");
    session.disconnect().await.unwrap();
}

#[tokio::test]
async fn test_tool_failure_is_broadcast_over_websocket() {
    tool_failure_is_broadcast(TransportKind::WebSocket).await;
}

#[tokio::test]
async fn test_tool_failure_is_broadcast_over_sse() {
    tool_failure_is_broadcast(TransportKind::Sse).await;
}

#[tokio::test]
async fn test_concurrent_requests_resolve_independently() {
    let (session, _state) = connected_session(TransportKind::WebSocket).await;
    let species = ["dolphin", "elephant", "lion", "cloudwhale"];
    let reads = species.iter().map(|s| {
        let session = session.clone();
        let uri = format!("animal://facts/{}/habitat", s);
        async move { session.read_resource(&uri).await }
    });
    let results = futures::future::join_all(reads).await;
    for (species, result) in species.iter().zip(results) {
        let result = result.unwrap();
        assert!(text_of(&result).to_lowercase().starts_with(species));
    }
    assert_eq!(session.pending_requests(), 0);
    session.disconnect().await.unwrap();
}

#[tokio::test]
async fn test_unreachable_server_is_a_transport_error() {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    drop(listener);

    let session = McpSession::new(transport(TransportKind::Sse, addr), SessionConfig::default());
    assert!(matches!(session.connect().await, Err(McpError::Transport(_))));
    session.disconnect().await.unwrap();
}

/// Replays canned model turns and records what it was sent
struct ScriptedModel {
    replies: Mutex<Vec<LlmResponse>>,
    seen: Mutex<Vec<Vec<Turn>>>,
}

#[async_trait]
impl Backend for ScriptedModel {
    async fn generate(
        &self,
        contents: &[Turn],
        _tools: &[FunctionDeclaration],
    ) -> Result<LlmResponse, LlmError> {
        self.seen.lock().unwrap().push(contents.to_vec());
        let mut replies = self.replies.lock().unwrap();
        if replies.is_empty() {
            return Err(LlmError::Api("script exhausted".to_string()));
        }
        Ok(replies.remove(0))
    }

    fn name(&self) -> &str {
        "scripted"
    }

    fn model(&self) -> &str {
        "scripted-1"
    }
}

#[tokio::test]
async fn test_orchestrator_reads_templates_through_virtual_tools() {
    let (session, _state) = connected_session(TransportKind::WebSocket).await;
    let catalog = ToolCatalog::from_session(&session).await.unwrap();

    let call = LlmResponse {
        parts: vec![Part::FunctionCall(FunctionCall {
            name: "read_animal_facts".to_string(),
            args: json!({"species": "dolphin", "category": "behavior"}),
        })],
        usage: None,
        finish_reason: None,
    };
    let model = Arc::new(ScriptedModel {
        replies: Mutex::new(vec![call, LlmResponse::text_only("Dolphins live in pods.")]),
        seen: Mutex::new(Vec::new()),
    });

    let orchestrator = Orchestrator::new(
        model.clone(),
        Arc::new(session.clone()),
        catalog,
        AgentConfig::default(),
    );
    let answer = orchestrator.ask("How do dolphins behave?").await.unwrap();

    assert_eq!(answer.text, "Dolphins live in pods.");
    assert_eq!(answer.round_trips, 2);
    assert_eq!(answer.tool_calls.len(), 1);
    assert!(!answer.tool_calls[0].failed());
    assert!(text_of(&answer.tool_calls[0].response).contains("groups called pods"));

    let seen = model.seen.lock().unwrap();
    let fed_back = &seen[1][2];
    assert!(matches!(&fed_back.parts[0], Part::FunctionResponse(r) if r.name == "read_animal_facts"));
    drop(seen);
    session.disconnect().await.unwrap();
}
