// Terminal formatting
pub const FORMAT_RESET: &str = "\x1b[0m";
pub const FORMAT_BOLD: &str = "\x1b[1m";
pub const FORMAT_GRAY: &str = "\x1b[90m";
pub const FORMAT_RED: &str = "\x1b[31m";
pub const FORMAT_GREEN: &str = "\x1b[32m";
pub const FORMAT_YELLOW: &str = "\x1b[33m";
pub const FORMAT_CYAN: &str = "\x1b[36m";

/// Demo server address for the WebSocket transport
pub const DEFAULT_WS_URL: &str = "ws://127.0.0.1:8765/ws";

/// Demo server address for the HTTP+SSE transport
pub const DEFAULT_SSE_URL: &str = "http://127.0.0.1:8765";

/// Environment variable overriding the server URL
pub const URL_ENV: &str = "MCP_DUET_URL";

/// Environment variables holding the Gemini key, in lookup order
pub const API_KEY_ENVS: &[&str] = &["GEMINI_API_KEY", "GOOGLE_API_KEY"];

// Templates for help and usage
pub const HELP_TEMPLATE: &str = r#"
# mcp-duet Help

## Available Commands
  /help                  - Display this help
  /tools                 - List the server's tools
  /resources             - List resources and resource templates
  /prompts               - List prompts
  /status                - Show connection state
  /reconnect             - Drop and re-establish the session
  /exit, /quit           - Leave

Anything else is sent to the model, which may call the server's tools.
"#;
