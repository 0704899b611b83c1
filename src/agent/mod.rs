//! Tool-orchestration loop
//!
//! This module contains the agent side of the client:
//! - The bounded round loop between the model and the MCP session
//! - Virtual tools synthesized from resource templates and prompts
//! - Schema reduction for function declarations

mod orchestrator;
mod schema;
mod transcript;
mod types;
mod virtual_tools;

pub use orchestrator::{Orchestrator, ToolCatalog};
pub use schema::{sanitize_schema, tool_declaration};
pub use transcript::Transcript;
pub use types::{
    AgentAnswer, AgentConfig, AgentError, AgentResult, ToolCallRecord, DEFAULT_MAX_ROUNDS,
};
pub use virtual_tools::{UriTemplate, VirtualTool, VirtualToolSet, BUILTIN_TEMPLATES};
