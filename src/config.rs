//! Configuration for the mcp-duet client
//!
//! Command-line flags are folded over environment values (loaded from
//! `.env` by `main`), producing the session and agent settings.

use std::time::Duration;

use crate::agent::{AgentConfig, DEFAULT_MAX_ROUNDS};
use crate::constants::{API_KEY_ENVS, DEFAULT_SSE_URL, DEFAULT_WS_URL, URL_ENV};
use crate::llm::gemini::DEFAULT_MODEL;
use crate::mcp::correlator::DEFAULT_REQUEST_TIMEOUT;
use crate::mcp::{ReconnectPolicy, SessionConfig, TransportKind};

/// Application configuration structure
#[derive(Debug, Clone, PartialEq)]
pub struct Config {
    /// Which transport to speak
    pub transport: TransportKind,

    /// Server URL; `None` picks the demo default for the transport
    pub url: Option<String>,

    /// Gemini model name
    pub model: String,

    /// Gemini API key, if one was found
    pub api_key: Option<String>,

    /// Tool rounds per question
    pub max_rounds: u32,

    /// Offer resource templates and prompts as tools
    pub virtual_tools: bool,

    /// How long each MCP request may wait for its reply
    pub request_timeout: Duration,

    /// Pause between reconnection attempts
    pub reconnect_delay: Duration,

    /// Consecutive failed connections before giving up
    pub max_reconnect_attempts: u32,
}

impl Config {
    /// Create a new configuration with default values
    pub fn new() -> Self {
        let reconnect = ReconnectPolicy::default();
        Self {
            transport: TransportKind::WebSocket,
            url: None,
            model: DEFAULT_MODEL.to_string(),
            api_key: None,
            max_rounds: DEFAULT_MAX_ROUNDS,
            virtual_tools: true,
            request_timeout: DEFAULT_REQUEST_TIMEOUT,
            reconnect_delay: reconnect.delay,
            max_reconnect_attempts: reconnect.max_attempts,
        }
    }

    /// Fill the URL and API key from the process environment
    pub fn apply_env(&mut self) {
        self.apply_lookup(|name| std::env::var(name).ok());
    }

    /// Fill unset values from `lookup`; explicit values win
    pub fn apply_lookup(&mut self, lookup: impl Fn(&str) -> Option<String>) {
        let present = |name: &str| lookup(name).filter(|value| !value.trim().is_empty());
        if self.url.is_none() {
            self.url = present(URL_ENV);
        }
        if self.api_key.is_none() {
            self.api_key = API_KEY_ENVS.iter().find_map(|name| present(name));
        }
    }

    /// The server URL to connect to
    pub fn server_url(&self) -> &str {
        match (&self.url, self.transport) {
            (Some(url), _) => url,
            (None, TransportKind::WebSocket) => DEFAULT_WS_URL,
            (None, TransportKind::Sse) => DEFAULT_SSE_URL,
        }
    }

    pub fn session_config(&self) -> SessionConfig {
        SessionConfig {
            request_timeout: self.request_timeout,
            reconnect: ReconnectPolicy {
                delay: self.reconnect_delay,
                max_attempts: self.max_reconnect_attempts,
            },
            ..SessionConfig::default()
        }
    }

    pub fn agent_config(&self) -> AgentConfig {
        AgentConfig {
            max_rounds: self.max_rounds,
            virtual_tools: self.virtual_tools,
        }
    }
}

impl Default for Config {
    fn default() -> Self {
        Self::new()
    }
}
