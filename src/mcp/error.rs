//! Error types for the MCP client

use thiserror::Error;

use crate::mcp::protocol::JsonRpcError;

/// Errors that can occur in the MCP client
#[derive(Error, Debug)]
pub enum McpError {
    /// The channel could not be opened, a write failed, or the connection was lost
    #[error("Transport error: {0}")]
    Transport(String),

    /// A request was attempted while the session was not connected
    #[error("Session is not connected")]
    NotConnected,

    /// No correlated reply arrived within the request timeout
    #[error("Request timed out")]
    RequestTimeout,

    /// The reply carried an error field, or the envelope was malformed
    #[error("Protocol error: {0}")]
    Protocol(String),

    /// A tool, resource or prompt call returned an error
    #[error("Tool invocation error: {0}")]
    ToolInvocation(String),

    /// The session was torn down while the operation was pending
    #[error("Session closed")]
    SessionClosed,

    /// The bounded reconnection budget was used up
    #[error("Reconnection gave up after {0} attempts")]
    ReconnectExhausted(u32),

    /// JSON serialization/deserialization error
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// WebSocket error
    #[error("WebSocket error: {0}")]
    WebSocket(#[from] tokio_tungstenite::tungstenite::Error),

    /// HTTP error from the split transport
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    /// URL parsing error
    #[error("URL parsing error: {0}")]
    Url(#[from] url::ParseError),
}

impl McpError {
    /// Build a protocol error from a JSON-RPC error object
    pub fn from_rpc(error: &JsonRpcError) -> Self {
        McpError::Protocol(error.to_string())
    }

    /// Whether this error invalidates the whole session rather than a single call.
    ///
    /// Session-level failures leave nothing to retry against, so callers
    /// driving multi-step work should stop instead of carrying on.
    pub fn is_session_level(&self) -> bool {
        matches!(
            self,
            McpError::SessionClosed | McpError::NotConnected | McpError::ReconnectExhausted(_)
        )
    }
}

/// Result type for MCP operations
pub type McpResult<T> = Result<T, McpError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_session_level_classification() {
        assert!(McpError::SessionClosed.is_session_level());
        assert!(McpError::NotConnected.is_session_level());
        assert!(McpError::ReconnectExhausted(10).is_session_level());
        assert!(!McpError::RequestTimeout.is_session_level());
        assert!(!McpError::ToolInvocation("boom".to_string()).is_session_level());
        assert!(!McpError::Transport("write failed".to_string()).is_session_level());
    }

    #[test]
    fn test_rpc_error_message_is_kept() {
        let rpc = JsonRpcError {
            code: Some(-32601),
            message: "Unknown tool: nope".to_string(),
            data: None,
        };
        let err = McpError::from_rpc(&rpc);
        assert!(err.to_string().contains("Unknown tool: nope"));
    }
}
