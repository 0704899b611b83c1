//! Types shared by the tool-orchestration loop

use serde_json::Value;

use crate::llm::{LlmError, LlmResponse};
use crate::mcp::McpError;

/// Default number of tool rounds after the first model reply
pub const DEFAULT_MAX_ROUNDS: u32 = 5;

/// Settings for one orchestration loop
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AgentConfig {
    /// Tool rounds allowed after the first reply. The request following the
    /// last round is sent without tool declarations.
    pub max_rounds: u32,

    /// Offer resource templates and prompts as callable tools
    pub virtual_tools: bool,
}

impl Default for AgentConfig {
    fn default() -> Self {
        Self {
            max_rounds: DEFAULT_MAX_ROUNDS,
            virtual_tools: true,
        }
    }
}

/// One executed function call and what was fed back for it
#[derive(Debug, Clone, PartialEq)]
pub struct ToolCallRecord {
    pub round: u32,
    pub name: String,
    pub arguments: Value,
    pub response: Value,
}

impl ToolCallRecord {
    /// Whether the call was answered with an in-band error payload
    pub fn failed(&self) -> bool {
        self.response.get("error").is_some()
    }
}

/// The outcome of a completed loop
#[derive(Debug, Clone, PartialEq)]
pub struct AgentAnswer {
    /// Text of the final reply
    pub text: String,

    /// Every call performed, in execution order
    pub tool_calls: Vec<ToolCallRecord>,

    /// Number of requests sent to the model
    pub round_trips: u32,

    /// The last model reply, unmodified
    pub final_reply: LlmResponse,
}

/// Errors that abort the orchestration loop
#[derive(Debug, thiserror::Error)]
pub enum AgentError {
    #[error("MCP session failed: {0}")]
    Session(#[from] McpError),

    #[error("LLM request failed: {0}")]
    Llm(#[from] LlmError),
}

pub type AgentResult<T> = Result<T, AgentError>;
