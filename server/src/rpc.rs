//! JSON-RPC 2.0 envelopes as the server reads and writes them

use serde::{Deserialize, Serialize};
use serde_json::Value;

pub const JSONRPC_VERSION: &str = "2.0";

/// MCP protocol revision announced by `initialize`
pub const PROTOCOL_VERSION: &str = "2024-11-05";

/// Standard JSON-RPC error codes
pub mod codes {
    pub const PARSE_ERROR: i64 = -32700;
    pub const INVALID_REQUEST: i64 = -32600;
    pub const METHOD_NOT_FOUND: i64 = -32601;
    pub const INVALID_PARAMS: i64 = -32602;
    pub const INTERNAL_ERROR: i64 = -32603;
}

fn jsonrpc_version() -> String {
    JSONRPC_VERSION.to_string()
}

/// An inbound request or notification
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RpcRequest {
    #[serde(default = "jsonrpc_version")]
    pub jsonrpc: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<Value>,
    pub method: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub params: Option<Value>,
}

impl RpcRequest {
    /// Notifications carry no id and get no reply
    pub fn is_notification(&self) -> bool {
        self.id.is_none()
    }

    pub fn params(&self) -> Value {
        self.params.clone().unwrap_or(Value::Null)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RpcError {
    pub code: i64,
    pub message: String,
}

/// A reply to one request
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RpcResponse {
    pub jsonrpc: String,
    pub id: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub result: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<RpcError>,
}

impl RpcResponse {
    pub fn success(id: Option<Value>, result: Value) -> Self {
        Self {
            jsonrpc: jsonrpc_version(),
            id,
            result: Some(result),
            error: None,
        }
    }

    pub fn failure(id: Option<Value>, error: RpcError) -> Self {
        Self {
            jsonrpc: jsonrpc_version(),
            id,
            result: None,
            error: Some(error),
        }
    }
}

/// A server-initiated notification
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RpcNotification {
    pub jsonrpc: String,
    pub method: String,
    pub params: Value,
}

impl RpcNotification {
    pub fn new(method: &str, params: Value) -> Self {
        Self {
            jsonrpc: jsonrpc_version(),
            method: method.to_string(),
            params,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_request_without_version_or_id() {
        let request: RpcRequest =
            serde_json::from_value(json!({"method": "notifications/initialized"})).unwrap();
        assert_eq!(request.jsonrpc, "2.0");
        assert!(request.is_notification());
        assert_eq!(request.params(), Value::Null);
    }

    #[test]
    fn test_failure_omits_result() {
        let reply = RpcResponse::failure(
            Some(json!(4)),
            RpcError {
                code: codes::METHOD_NOT_FOUND,
                message: "Unknown method: nope".to_string(),
            },
        );
        let wire = serde_json::to_value(&reply).unwrap();
        assert_eq!(
            wire,
            json!({"jsonrpc": "2.0", "id": 4, "error": {"code": -32601, "message": "Unknown method: nope"}})
        );
    }
}
