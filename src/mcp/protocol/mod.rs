//! MCP protocol messages and data structures

pub mod content;
pub mod messages;
pub mod prompts;
pub mod resources;
pub mod tools;

/// Protocol revision announced during `initialize`
pub const PROTOCOL_VERSION: &str = "2024-11-05";

/// Method names consumed by the client
pub mod methods {
    pub const INITIALIZE: &str = "initialize";
    pub const INITIALIZED: &str = "notifications/initialized";
    pub const TOOLS_LIST: &str = "tools/list";
    pub const TOOLS_CALL: &str = "tools/call";
    pub const RESOURCES_LIST: &str = "resources/list";
    pub const RESOURCE_TEMPLATES_LIST: &str = "resources/templates/list";
    pub const RESOURCES_READ: &str = "resources/read";
    pub const PROMPTS_LIST: &str = "prompts/list";
    pub const PROMPTS_GET: &str = "prompts/get";
}

// Re-export common types for easier imports
pub use content::{Content, TextContent};
pub use messages::{
    ClientCapabilities, ClientInfo, InitializeParams, InitializeResult, JsonRpcError,
    JsonRpcMessage, MessageKind, RootsCapabilities, ServerInfo, JSONRPC_VERSION,
};
pub use prompts::{GetPromptParams, ListPromptsResult, Prompt, PromptArgument};
pub use resources::{
    ListResourceTemplatesResult, ListResourcesResult, ReadResourceParams, Resource,
    ResourceTemplate,
};
pub use tools::{CallToolParams, ListToolsResult, Tool};
