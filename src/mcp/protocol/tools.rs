//! Tool-related structures for MCP protocol

use serde::{Deserialize, Serialize};
use serde_json::Value;

use super::content::Content;

/// Represents a tool provided by an MCP server
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Tool {
    pub name: String,
    #[serde(default)]
    pub description: String,
    #[serde(rename = "inputSchema", default = "empty_object_schema")]
    pub input_schema: Value, // JSON Schema for tool input
}

fn empty_object_schema() -> Value {
    serde_json::json!({"type": "object", "properties": {}})
}

/// Response from a ListToolsRequest
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ListToolsResult {
    #[serde(default)]
    pub tools: Vec<Tool>,
}

/// Parameters for a CallToolRequest
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CallToolParams {
    pub name: String,
    pub arguments: Value,
}

/// Look for an in-band failure in a `tools/call` (or read/get) result.
///
/// Servers report failures without an error envelope in two ways: a result
/// flagged `isError: true` whose text content is the message, or a result
/// object with a string `error` member.
pub fn result_failure(result: &Value) -> Option<String> {
    if let Some(message) = result.get("error").and_then(Value::as_str) {
        return Some(message.to_string());
    }

    if result.get("isError").and_then(Value::as_bool) == Some(true) {
        let text = result
            .get("content")
            .cloned()
            .and_then(|content| serde_json::from_value::<Vec<Content>>(content).ok())
            .map(|content| Content::join_text(&content))
            .unwrap_or_default();
        return Some(if text.is_empty() {
            "Tool reported an error".to_string()
        } else {
            text
        });
    }

    None
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_tool_defaults() {
        let tool: Tool = serde_json::from_value(json!({"name": "get_weather_alerts"})).unwrap();
        assert_eq!(tool.description, "");
        assert_eq!(tool.input_schema["type"], "object");
    }

    #[test]
    fn test_result_failure_detection() {
        assert_eq!(
            result_failure(&json!({"error": "Resource not found"})),
            Some("Resource not found".to_string())
        );
        assert_eq!(
            result_failure(&json!({
                "isError": true,
                "content": [{"type": "text", "text": "upstream unavailable"}]
            })),
            Some("upstream unavailable".to_string())
        );
        assert_eq!(
            result_failure(&json!({"content": [{"type": "text", "text": "ok"}]})),
            None
        );
        // A structured error member is payload, not a failure marker
        assert_eq!(result_failure(&json!({"error": {"code": 1}})), None);
    }
}
