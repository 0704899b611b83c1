//! Transport-independent JSON-RPC dispatch

use serde_json::{json, Value};
use tokio::sync::broadcast;
use tracing::{debug, info, warn};

use crate::catalog::{self, prompts, resources, tools};
use crate::errors::{ServerError, ServerResult};
use crate::rpc::{RpcNotification, RpcRequest, RpcResponse, PROTOCOL_VERSION};
use crate::weather::WeatherClient;

pub const LOG_NOTIFICATION: &str = "notifications/message";

/// Answers MCP requests for every transport
pub struct McpHandler {
    weather: WeatherClient,
    notifications: broadcast::Sender<RpcNotification>,
}

impl McpHandler {
    pub fn new(weather: WeatherClient, notifications: broadcast::Sender<RpcNotification>) -> Self {
        Self {
            weather,
            notifications,
        }
    }

    /// Handle one request. Notifications produce no reply.
    pub async fn handle(&self, request: RpcRequest) -> Option<RpcResponse> {
        if request.is_notification() {
            debug!("Notification {} received", request.method);
            return None;
        }

        let id = request.id.clone();
        match self.dispatch(&request).await {
            Ok(result) => Some(RpcResponse::success(id, result)),
            Err(e) => {
                warn!("{} failed: {}", request.method, e);
                Some(RpcResponse::failure(id, e.to_rpc()))
            }
        }
    }

    async fn dispatch(&self, request: &RpcRequest) -> ServerResult<Value> {
        let params = request.params();
        match request.method.as_str() {
            "initialize" => Ok(json!({
                "protocolVersion": PROTOCOL_VERSION,
                "capabilities": catalog::capabilities(),
                "serverInfo": {
                    "name": catalog::SERVER_NAME,
                    "version": catalog::SERVER_VERSION,
                },
            })),
            "ping" => Ok(json!({})),
            "tools/list" => Ok(json!({ "tools": tools::definitions() })),
            "tools/call" => self.call_tool(&params).await,
            "resources/list" => Ok(json!({ "resources": resources::list() })),
            "resources/templates/list" => {
                Ok(json!({ "resourceTemplates": resources::templates() }))
            }
            "resources/read" => {
                let uri = required_str(&params, "uri")?;
                Ok(resources::read(uri))
            }
            "prompts/list" => Ok(json!({ "prompts": prompts::definitions() })),
            "prompts/get" => {
                let name = required_str(&params, "name")?;
                prompts::render(name, params.get("arguments").unwrap_or(&Value::Null))
            }
            other => Err(ServerError::MethodNotFound(format!("Unknown method: {}", other))),
        }
    }

    /// Tool failures come back as `isError` results, not error replies
    async fn call_tool(&self, params: &Value) -> ServerResult<Value> {
        let name = required_str(params, "name")?;
        if !tools::is_known(name) {
            return Err(ServerError::MethodNotFound(format!("Unknown tool: {}", name)));
        }
        let arguments = params.get("arguments").cloned().unwrap_or_else(|| json!({}));

        let (text, is_error) = match tools::call(&self.weather, name, &arguments).await {
            Ok(payload) => (serde_json::to_string_pretty(&payload)?, false),
            Err(e) => (format!("Tool execution failed: {}", e), true),
        };
        self.announce(json!({
            "level": if is_error { "error" } else { "info" },
            "logger": catalog::SERVER_NAME,
            "data": format!("{} {}", name, if is_error { "failed" } else { "completed" }),
        }));

        Ok(json!({
            "content": [{ "type": "text", "text": text }],
            "isError": is_error,
        }))
    }

    fn announce(&self, params: Value) {
        // No subscribers is not an error
        if self
            .notifications
            .send(RpcNotification::new(LOG_NOTIFICATION, params))
            .is_ok()
        {
            info!("Broadcast {}", LOG_NOTIFICATION);
        }
    }
}

fn required_str<'a>(params: &'a Value, key: &str) -> ServerResult<&'a str> {
    params
        .get(key)
        .and_then(Value::as_str)
        .filter(|value| !value.is_empty())
        .ok_or_else(|| ServerError::InvalidParams(format!("Missing required parameter: {}", key)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Config;
    use crate::rpc::codes;

    fn handler() -> (McpHandler, broadcast::Receiver<RpcNotification>) {
        let (tx, rx) = broadcast::channel(8);
        let weather = WeatherClient::new(Config::local(0).upstream).unwrap();
        (McpHandler::new(weather, tx), rx)
    }

    fn request(id: i64, method: &str, params: Value) -> RpcRequest {
        RpcRequest {
            jsonrpc: "2.0".to_string(),
            id: Some(json!(id)),
            method: method.to_string(),
            params: Some(params),
        }
    }

    #[tokio::test]
    async fn test_initialize_announces_server() {
        let (handler, _rx) = handler();
        let reply = handler.handle(request(1, "initialize", json!({}))).await.unwrap();
        let result = reply.result.unwrap();
        assert_eq!(result["serverInfo"]["name"], "mcp-duet-server");
        assert_eq!(result["protocolVersion"], PROTOCOL_VERSION);
        assert_eq!(reply.id, Some(json!(1)));
    }

    #[tokio::test]
    async fn test_notifications_get_no_reply() {
        let (handler, _rx) = handler();
        let notification = RpcRequest {
            jsonrpc: "2.0".to_string(),
            id: None,
            method: "notifications/initialized".to_string(),
            params: None,
        };
        assert!(handler.handle(notification).await.is_none());
    }

    #[tokio::test]
    async fn test_unknown_method_and_tool() {
        let (handler, _rx) = handler();
        let reply = handler.handle(request(2, "sampling/createMessage", json!({}))).await.unwrap();
        assert_eq!(reply.error.unwrap().code, codes::METHOD_NOT_FOUND);

        let reply = handler
            .handle(request(3, "tools/call", json!({"name": "get_tides", "arguments": {}})))
            .await
            .unwrap();
        let error = reply.error.unwrap();
        assert_eq!(error.code, codes::METHOD_NOT_FOUND);
        assert!(error.message.contains("Unknown tool: get_tides"));
    }

    #[tokio::test]
    async fn test_tool_argument_errors_are_flagged_results() {
        let (handler, mut rx) = handler();
        let reply = handler
            .handle(request(4, "tools/call", json!({"name": "get_weather_alerts", "arguments": {}})))
            .await
            .unwrap();
        let result = reply.result.unwrap();
        assert_eq!(result["isError"], true);
        assert!(result["content"][0]["text"].as_str().unwrap().contains("state"));

        let notification = rx.recv().await.unwrap();
        assert_eq!(notification.method, LOG_NOTIFICATION);
        assert_eq!(notification.params["level"], "error");
    }

    #[tokio::test]
    async fn test_missing_params() {
        let (handler, _rx) = handler();
        let reply = handler.handle(request(5, "resources/read", json!({}))).await.unwrap();
        assert_eq!(reply.error.unwrap().code, codes::INVALID_PARAMS);

        let reply = handler.handle(request(6, "prompts/get", json!({}))).await.unwrap();
        assert_eq!(reply.error.unwrap().code, codes::INVALID_PARAMS);
    }

    #[tokio::test]
    async fn test_catalog_listings() {
        let (handler, _rx) = handler();
        let tools = handler.handle(request(7, "tools/list", json!({}))).await.unwrap();
        assert_eq!(tools.result.unwrap()["tools"].as_array().unwrap().len(), 3);

        let templates = handler
            .handle(request(8, "resources/templates/list", json!({})))
            .await
            .unwrap();
        let templates = templates.result.unwrap();
        assert_eq!(templates["resourceTemplates"][1]["uriTemplate"], "animal://facts/{species}/{category}");

        let read = handler
            .handle(request(9, "resources/read", json!({"uri": "animal://facts/lion/behavior"})))
            .await
            .unwrap();
        assert!(read.result.unwrap()["contents"][0]["text"]
            .as_str()
            .unwrap()
            .starts_with("Lion - Behavior:"));
    }
}
