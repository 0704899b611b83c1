//! Command-line interface definition and argument parsing
//!
//! This module uses clap to define and parse command-line arguments.

use std::time::Duration;

use clap::{Parser, Subcommand, ValueEnum};

use crate::config::Config;
use crate::mcp::TransportKind;

/// Command-line arguments for mcp-duet
#[derive(Parser, Debug)]
#[command(
    name = "mcp-duet",
    about = "MCP client speaking WebSocket or HTTP+SSE, with a Gemini tool loop",
    version,
    long_about = "mcp-duet connects to an MCP server over WebSocket or HTTP+SSE, lists its catalogs, and answers questions by letting Gemini call the server's tools."
)]
pub struct Cli {
    /// Transport to use
    #[arg(long, value_enum, default_value_t = TransportArg::Ws)]
    pub transport: TransportArg,

    /// Server URL (defaults to the demo server for the chosen transport)
    #[arg(long)]
    pub url: Option<String>,

    /// The Gemini model to use
    #[arg(long, default_value = crate::llm::gemini::DEFAULT_MODEL)]
    pub model: String,

    /// Tool rounds allowed per question
    #[arg(long, default_value_t = crate::agent::DEFAULT_MAX_ROUNDS)]
    pub max_rounds: u32,

    /// Seconds to wait for each MCP reply
    #[arg(long, default_value_t = 10)]
    pub request_timeout: u64,

    /// Seconds between reconnection attempts
    #[arg(long, default_value_t = 3)]
    pub reconnect_delay: u64,

    /// Failed connections tolerated before giving up
    #[arg(long, default_value_t = 10)]
    pub max_reconnect_attempts: u32,

    /// Do not offer resource templates and prompts as tools
    #[arg(long)]
    pub no_virtual_tools: bool,

    /// Subcommand to execute; interactive mode when omitted
    #[command(subcommand)]
    pub command: Option<Commands>,
}

/// Transport selector
#[derive(ValueEnum, Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransportArg {
    /// Single WebSocket channel
    Ws,
    /// HTTP POST requests plus a server-sent event stream
    Sse,
}

impl From<TransportArg> for TransportKind {
    fn from(arg: TransportArg) -> Self {
        match arg {
            TransportArg::Ws => TransportKind::WebSocket,
            TransportArg::Sse => TransportKind::Sse,
        }
    }
}

/// Subcommands for mcp-duet
#[derive(Subcommand, Debug, Clone, PartialEq, Eq)]
pub enum Commands {
    /// List the server's tools
    Tools,

    /// List resources and resource templates
    Resources,

    /// List prompts
    Prompts,

    /// Answer one question and exit
    Ask {
        /// The question, words are joined with spaces
        #[arg(required = true, trailing_var_arg = true)]
        question: Vec<String>,
    },
}

/// Convert the Cli struct to the application's Config
pub fn cli_to_config(cli: &Cli) -> Config {
    Config {
        transport: cli.transport.into(),
        url: cli.url.clone(),
        model: cli.model.clone(),
        api_key: None,
        max_rounds: cli.max_rounds,
        virtual_tools: !cli.no_virtual_tools,
        request_timeout: Duration::from_secs(cli.request_timeout),
        reconnect_delay: Duration::from_secs(cli.reconnect_delay),
        max_reconnect_attempts: cli.max_reconnect_attempts,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let cli = Cli::parse_from(["mcp-duet"]);
        assert_eq!(cli.transport, TransportArg::Ws);
        assert!(cli.command.is_none());
        let config = cli_to_config(&cli);
        assert_eq!(config, Config::new());
    }

    #[test]
    fn test_ask_with_flags() {
        let cli = Cli::parse_from([
            "mcp-duet",
            "--transport",
            "sse",
            "--max-rounds",
            "2",
            "--no-virtual-tools",
            "--request-timeout",
            "4",
            "ask",
            "Is",
            "it",
            "raining?",
        ]);
        assert_eq!(
            cli.command,
            Some(Commands::Ask {
                question: vec!["Is".into(), "it".into(), "raining?".into()]
            })
        );
        let config = cli_to_config(&cli);
        assert_eq!(config.transport, TransportKind::Sse);
        assert_eq!(config.max_rounds, 2);
        assert!(!config.virtual_tools);
        assert_eq!(config.request_timeout, Duration::from_secs(4));
    }

    #[test]
    fn test_unknown_transport_is_rejected() {
        assert!(Cli::try_parse_from(["mcp-duet", "--transport", "grpc"]).is_err());
    }
}
