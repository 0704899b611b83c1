//! JSON-RPC message types for MCP protocol

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// JSON-RPC version carried by every envelope
pub const JSONRPC_VERSION: &str = "2.0";

/// Base JSON-RPC 2.0 envelope
///
/// One flat structure covers requests, notifications and responses; which
/// one a message is follows from the fields present (see [`MessageKind`]).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JsonRpcMessage {
    #[serde(default = "jsonrpc_version")]
    pub jsonrpc: String, // Always "2.0"
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub method: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub params: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub result: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<JsonRpcError>,
}

fn jsonrpc_version() -> String {
    JSONRPC_VERSION.to_string()
}

/// Shape of an envelope
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MessageKind {
    /// Has an id and a method
    Request,
    /// Has a method but no id
    Notification,
    /// Has an id and a result
    Response,
    /// Has an error member
    Error,
    /// None of the above
    Invalid,
}

impl JsonRpcMessage {
    /// Create a request carrying a numeric id
    pub fn request(id: u64, method: &str, params: Option<Value>) -> Self {
        Self {
            jsonrpc: JSONRPC_VERSION.to_string(),
            id: Some(Value::from(id)),
            method: Some(method.to_string()),
            params,
            result: None,
            error: None,
        }
    }

    /// Create a one-way notification (no id, no reply expected)
    pub fn notification(method: &str, params: Option<Value>) -> Self {
        Self {
            jsonrpc: JSONRPC_VERSION.to_string(),
            id: None,
            method: Some(method.to_string()),
            params,
            result: None,
            error: None,
        }
    }

    /// Create a successful response
    pub fn response(id: Option<Value>, result: Value) -> Self {
        Self {
            jsonrpc: JSONRPC_VERSION.to_string(),
            id,
            method: None,
            params: None,
            result: Some(result),
            error: None,
        }
    }

    /// Create an error response
    pub fn error_response(id: Option<Value>, error: JsonRpcError) -> Self {
        Self {
            jsonrpc: JSONRPC_VERSION.to_string(),
            id,
            method: None,
            params: None,
            result: None,
            error: Some(error),
        }
    }

    /// Classify the envelope
    pub fn kind(&self) -> MessageKind {
        if self.error.is_some() {
            return MessageKind::Error;
        }
        match (&self.id, &self.method, &self.result) {
            (Some(_), Some(_), _) => MessageKind::Request,
            (None, Some(_), _) => MessageKind::Notification,
            (Some(_), None, Some(_)) => MessageKind::Response,
            _ => MessageKind::Invalid,
        }
    }

    /// The id as an integer, if it is one
    pub fn numeric_id(&self) -> Option<u64> {
        self.id.as_ref().and_then(Value::as_u64)
    }

    /// Method name, empty for responses
    pub fn method_name(&self) -> &str {
        self.method.as_deref().unwrap_or("")
    }
}

/// Error member of a response
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JsonRpcError {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub code: Option<i64>,
    pub message: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data: Option<Value>,
}

impl std::fmt::Display for JsonRpcError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self.code {
            Some(code) => write!(f, "JSON-RPC error {}: {}", code, self.message),
            None => write!(f, "{}", self.message),
        }
    }
}

/// Client information sent during initialize
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ClientInfo {
    pub name: String,
    pub version: String,
}

/// Client capabilities
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ClientCapabilities {
    pub roots: RootsCapabilities,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RootsCapabilities {
    pub list_changed: bool,
}

/// Initialize request parameters
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct InitializeParams {
    pub protocol_version: String,
    pub capabilities: ClientCapabilities,
    pub client_info: ClientInfo,
}

/// Initialize response
///
/// Servers differ in how much they send back, so every member is optional.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct InitializeResult {
    #[serde(default)]
    pub protocol_version: Option<String>,
    #[serde(default)]
    pub capabilities: Map<String, Value>,
    #[serde(default)]
    pub server_info: Option<ServerInfo>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ServerInfo {
    pub name: String,
    #[serde(default)]
    pub version: String,
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_request_serialization_omits_empty_members() {
        let msg = JsonRpcMessage::request(7, "tools/list", Some(json!({})));
        let value = serde_json::to_value(&msg).unwrap();
        assert_eq!(
            value,
            json!({"jsonrpc": "2.0", "id": 7, "method": "tools/list", "params": {}})
        );
    }

    #[test]
    fn test_message_kinds() {
        let response: JsonRpcMessage =
            serde_json::from_str(r#"{"jsonrpc":"2.0","id":3,"result":{"tools":[]}}"#).unwrap();
        assert_eq!(response.kind(), MessageKind::Response);
        assert_eq!(response.numeric_id(), Some(3));

        let error: JsonRpcMessage = serde_json::from_str(
            r#"{"jsonrpc":"2.0","id":4,"result":null,"error":{"message":"upstream unavailable"}}"#,
        )
        .unwrap();
        assert_eq!(error.kind(), MessageKind::Error);
        assert_eq!(error.error.unwrap().to_string(), "upstream unavailable");

        let note: JsonRpcMessage = serde_json::from_str(
            r#"{"jsonrpc":"2.0","method":"notifications/resources/updated","params":{"uri":"animal://lion"}}"#,
        )
        .unwrap();
        assert_eq!(note.kind(), MessageKind::Notification);
        assert_eq!(note.numeric_id(), None);
    }

    #[test]
    fn test_initialize_result_tolerates_sparse_reply() {
        let result: InitializeResult = serde_json::from_value(json!({
            "capabilities": {"tools": {}},
            "serverInfo": {"name": "mcp-sse-server", "version": "1.0.0", "capabilities": {}}
        }))
        .unwrap();
        assert!(result.capabilities.contains_key("tools"));
        assert_eq!(result.server_info.unwrap().name, "mcp-sse-server");

        let empty: InitializeResult = serde_json::from_value(json!({})).unwrap();
        assert!(empty.server_info.is_none());
    }
}
