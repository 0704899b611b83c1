//! The tools, resources and prompts this server advertises

pub mod prompts;
pub mod resources;
pub mod tools;

use serde::Serialize;
use serde_json::Value;

pub const SERVER_NAME: &str = "mcp-duet-server";
pub const SERVER_VERSION: &str = env!("CARGO_PKG_VERSION");

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ToolDefinition {
    pub name: &'static str,
    pub description: &'static str,
    pub input_schema: Value,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ResourceDefinition {
    pub uri: String,
    pub name: String,
    pub description: String,
    pub mime_type: &'static str,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TemplateDefinition {
    pub uri_template: &'static str,
    pub name: &'static str,
    pub description: &'static str,
    pub mime_type: &'static str,
}

#[derive(Debug, Clone, Serialize)]
pub struct PromptArgumentDefinition {
    pub name: &'static str,
    pub description: &'static str,
    pub required: bool,
}

#[derive(Debug, Clone, Serialize)]
pub struct PromptDefinition {
    pub name: &'static str,
    pub description: &'static str,
    pub arguments: Vec<PromptArgumentDefinition>,
}

/// Capability block announced by `initialize` and the event stream
pub fn capabilities() -> Value {
    serde_json::json!({
        "tools": {},
        "resources": {},
        "prompts": {},
    })
}

/// Server descriptor carried in `initialize` replies and `serverInfo` events
pub fn server_info() -> Value {
    serde_json::json!({
        "name": SERVER_NAME,
        "version": SERVER_VERSION,
        "capabilities": capabilities(),
    })
}
