//! mcp-duet - MCP client console
//!
//! Connects to an MCP server over WebSocket or HTTP+SSE, lists its
//! catalogs, and answers questions through a Gemini tool-calling loop.

use std::sync::Arc;

use anyhow::{bail, Context, Result};
use clap::Parser;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tracing::warn;
use tracing_subscriber::EnvFilter;

use mcp_duet::agent::{AgentAnswer, Orchestrator, ToolCatalog};
use mcp_duet::cli::{cli_to_config, Cli, Commands};
use mcp_duet::config::Config;
use mcp_duet::constants::{
    FORMAT_BOLD, FORMAT_CYAN, FORMAT_GRAY, FORMAT_GREEN, FORMAT_RED, FORMAT_RESET, FORMAT_YELLOW,
    HELP_TEMPLATE,
};
use mcp_duet::llm::GeminiBackend;
use mcp_duet::mcp::{
    McpSession, SessionEvent, SseTransport, Transport, TransportKind, WebSocketTransport,
};

/// Main entry point for the application
#[tokio::main]
async fn main() -> Result<()> {
    // Load environment variables from .env file
    let _ = dotenvy::dotenv();

    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    let mut config = cli_to_config(&cli);
    config.apply_env();

    let session = open_session(&config).await?;

    let outcome = match &cli.command {
        Some(Commands::Tools) => print_tools(&session).await,
        Some(Commands::Resources) => print_resources(&session).await,
        Some(Commands::Prompts) => print_prompts(&session).await,
        Some(Commands::Ask { question }) => run_single_query(&session, &config, &question.join(" ")).await,
        None => run_interactive_mode(&session, &config).await,
    };

    session.disconnect().await.context("Failed to disconnect")?;
    outcome
}

/// Build the transport for the configured URL and connect
async fn open_session(config: &Config) -> Result<McpSession> {
    let url = config.server_url();
    let transport: Arc<dyn Transport> = match config.transport {
        TransportKind::WebSocket => Arc::new(WebSocketTransport::new(url)?),
        TransportKind::Sse => Arc::new(SseTransport::new(url)?),
    };

    let session = McpSession::new(transport, config.session_config());
    session.subscribe_all(print_event);
    session
        .connect()
        .await
        .with_context(|| format!("Failed to connect to {} over {}", url, config.transport))?;

    if let Some(info) = session.server_info() {
        println!(
            "{}Connected{} to {} {} over {}",
            FORMAT_BOLD, FORMAT_RESET, info.name, info.version, config.transport
        );
    }
    Ok(session)
}

fn print_event(event: &SessionEvent) {
    match event {
        SessionEvent::Disconnected { reason } => {
            eprintln!("{}Disconnected: {}{}", FORMAT_YELLOW, reason, FORMAT_RESET)
        }
        SessionEvent::Reconnecting {
            attempt,
            max_attempts,
        } => eprintln!(
            "{}Reconnecting ({}/{})...{}",
            FORMAT_GRAY, attempt, max_attempts, FORMAT_RESET
        ),
        SessionEvent::ReconnectExhausted { attempts } => eprintln!(
            "{}Gave up reconnecting after {} attempts{}",
            FORMAT_RED, attempts, FORMAT_RESET
        ),
        SessionEvent::Notification { method, params } => {
            eprintln!("{}[{}] {}{}", FORMAT_GRAY, method, params, FORMAT_RESET)
        }
        _ => {}
    }
}

async fn print_tools(session: &McpSession) -> Result<()> {
    let tools = session.list_tools().await.context("tools/list failed")?;
    println!("{}Tools ({}){}", FORMAT_BOLD, tools.len(), FORMAT_RESET);
    for tool in tools {
        println!("  {}{}{} - {}", FORMAT_CYAN, tool.name, FORMAT_RESET, tool.description);
    }
    Ok(())
}

async fn print_resources(session: &McpSession) -> Result<()> {
    let resources = session
        .list_resources()
        .await
        .context("resources/list failed")?;
    println!("{}Resources ({}){}", FORMAT_BOLD, resources.len(), FORMAT_RESET);
    for resource in resources {
        println!("  {}{}{} - {}", FORMAT_CYAN, resource.uri, FORMAT_RESET, resource.name);
    }

    match session.list_resource_templates().await {
        Ok(templates) => {
            println!("{}Resource templates ({}){}", FORMAT_BOLD, templates.len(), FORMAT_RESET);
            for template in templates {
                println!(
                    "  {}{}{} - {}",
                    FORMAT_CYAN, template.uri_template, FORMAT_RESET, template.name
                );
            }
        }
        Err(e) => warn!("Resource templates unavailable: {}", e),
    }
    Ok(())
}

async fn print_prompts(session: &McpSession) -> Result<()> {
    let prompts = session.list_prompts().await.context("prompts/list failed")?;
    println!("{}Prompts ({}){}", FORMAT_BOLD, prompts.len(), FORMAT_RESET);
    for prompt in prompts {
        let args: Vec<String> = prompt
            .arguments
            .iter()
            .map(|arg| {
                if arg.required {
                    arg.name.clone()
                } else {
                    format!("[{}]", arg.name)
                }
            })
            .collect();
        println!(
            "  {}{}{}({}) - {}",
            FORMAT_CYAN,
            prompt.name,
            FORMAT_RESET,
            args.join(", "),
            prompt.description
        );
    }
    Ok(())
}

async fn build_orchestrator(session: &McpSession, config: &Config) -> Result<Orchestrator> {
    let Some(api_key) = config.api_key.clone() else {
        bail!("Set GEMINI_API_KEY or GOOGLE_API_KEY to ask questions");
    };
    let backend = GeminiBackend::new(api_key, config.model.clone())?;
    let catalog = ToolCatalog::from_session(session)
        .await
        .context("Failed to load the server catalogs")?;
    Ok(Orchestrator::new(
        Arc::new(backend),
        Arc::new(session.clone()),
        catalog,
        config.agent_config(),
    ))
}

fn print_answer(answer: &AgentAnswer) {
    for call in &answer.tool_calls {
        let marker = if call.failed() { FORMAT_RED } else { FORMAT_GREEN };
        println!(
            "{}  -> {}{}({}){}",
            FORMAT_GRAY, marker, call.name, call.arguments, FORMAT_RESET
        );
    }
    println!();
    println!("{}", answer.text.trim());
    println!(
        "{}({} tool call(s), {} model round trip(s)){}",
        FORMAT_GRAY,
        answer.tool_calls.len(),
        answer.round_trips,
        FORMAT_RESET
    );
}

/// Answer one question and return
async fn run_single_query(session: &McpSession, config: &Config, question: &str) -> Result<()> {
    let orchestrator = build_orchestrator(session, config).await?;
    let answer = orchestrator.ask(question).await?;
    print_answer(&answer);
    Ok(())
}

/// Read questions and slash commands from stdin until EOF or /exit
async fn run_interactive_mode(session: &McpSession, config: &Config) -> Result<()> {
    let mut orchestrator = build_orchestrator(session, config).await?;
    println!("{}", HELP_TEMPLATE.trim());

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    let mut stdout = tokio::io::stdout();
    loop {
        stdout.write_all(b"\n> ").await?;
        stdout.flush().await?;

        let Some(line) = lines.next_line().await? else {
            break;
        };
        let line = line.trim();
        if line.is_empty() {
            continue;
        }

        match line {
            "/exit" | "/quit" => break,
            "/help" => println!("{}", HELP_TEMPLATE.trim()),
            "/tools" => report(print_tools(session).await),
            "/resources" => report(print_resources(session).await),
            "/prompts" => report(print_prompts(session).await),
            "/status" => print_status(session),
            "/reconnect" => {
                session.disconnect().await?;
                match session.connect().await {
                    Ok(()) => orchestrator = build_orchestrator(session, config).await?,
                    Err(e) => eprintln!("{}Error:{} {}", FORMAT_RED, FORMAT_RESET, e),
                }
            }
            command if command.starts_with('/') => {
                eprintln!("Unknown command {}. Type /help for the list.", command)
            }
            question => match orchestrator.ask(question).await {
                Ok(answer) => print_answer(&answer),
                Err(e) => eprintln!("{}Error:{} {}", FORMAT_RED, FORMAT_RESET, e),
            },
        }
    }
    Ok(())
}

fn print_status(session: &McpSession) {
    println!("State: {:?} over {}", session.state(), session.transport_kind());
    if let Some(info) = session.server_info() {
        println!("Server: {} {}", info.name, info.version);
    }
    if let Some(client_id) = session.client_id() {
        println!("Client id: {}", client_id);
    }
    if let Some(heartbeat) = session.last_heartbeat() {
        println!("Last heartbeat: {}s ago", heartbeat.elapsed().as_secs());
    }
    println!("Pending requests: {}", session.pending_requests());
    println!("Failed reconnection attempts: {}", session.reconnect_attempts());
}

fn report(result: Result<()>) {
    if let Err(e) = result {
        eprintln!("{}Error:{} {:#}", FORMAT_RED, FORMAT_RESET, e);
    }
}
