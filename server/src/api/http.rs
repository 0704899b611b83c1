//! Client-to-server half of the split transport: one POST per request

use std::sync::Arc;

use axum::{
    extract::{rejection::JsonRejection, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use tracing::debug;

use super::AppState;
use crate::errors::ServerError;
use crate::rpc::{codes, RpcError, RpcRequest, RpcResponse};

type RpcBody = Result<Json<RpcRequest>, JsonRejection>;

/// Route a request posted to the endpoint for `family`.
///
/// A method from another family gets a method-not-found reply.
async fn dispatch(state: &AppState, family: &str, body: RpcBody) -> Response {
    let Json(request) = match body {
        Ok(body) => body,
        Err(rejection) => return ServerError::BadRequest(rejection.body_text()).into_response(),
    };
    debug!("POST /mcp/{} {}", family, request.method);

    if request.method.split('/').next() != Some(family) {
        let reply = RpcResponse::failure(
            request.id,
            RpcError {
                code: codes::METHOD_NOT_FOUND,
                message: format!("Unknown method: {}", request.method),
            },
        );
        return Json(reply).into_response();
    }

    match state.handler.handle(request).await {
        Some(reply) => Json(reply).into_response(),
        None => StatusCode::ACCEPTED.into_response(),
    }
}

pub async fn initialize(State(state): State<Arc<AppState>>, body: RpcBody) -> Response {
    dispatch(&state, "initialize", body).await
}

pub async fn tools(State(state): State<Arc<AppState>>, body: RpcBody) -> Response {
    dispatch(&state, "tools", body).await
}

pub async fn resources(State(state): State<Arc<AppState>>, body: RpcBody) -> Response {
    dispatch(&state, "resources", body).await
}

pub async fn prompts(State(state): State<Arc<AppState>>, body: RpcBody) -> Response {
    dispatch(&state, "prompts", body).await
}

pub async fn notifications(State(state): State<Arc<AppState>>, body: RpcBody) -> Response {
    dispatch(&state, "notifications", body).await
}

#[cfg(test)]
mod tests {
    use super::super::tests::{app, body_json};
    use axum::body::Body;
    use axum::http::{header, Request, StatusCode};
    use serde_json::{json, Value};
    use tower::ServiceExt;

    fn post(uri: &str, body: Value) -> Request<Body> {
        Request::builder()
            .method("POST")
            .uri(uri)
            .header(header::CONTENT_TYPE, "application/json")
            .body(Body::from(body.to_string()))
            .unwrap()
    }

    #[tokio::test]
    async fn test_initialize_over_post() {
        let response = app()
            .oneshot(post(
                "/mcp/initialize",
                json!({"jsonrpc": "2.0", "id": 1, "method": "initialize", "params": {}}),
            ))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        let reply = body_json(response).await;
        assert_eq!(reply["id"], 1);
        assert_eq!(reply["result"]["serverInfo"]["name"], "mcp-duet-server");
    }

    #[tokio::test]
    async fn test_method_from_another_family() {
        let response = app()
            .oneshot(post(
                "/mcp/tools",
                json!({"jsonrpc": "2.0", "id": 2, "method": "prompts/list"}),
            ))
            .await
            .unwrap();
        let reply = body_json(response).await;
        assert_eq!(reply["error"]["code"], -32601);
        assert_eq!(reply["error"]["message"], "Unknown method: prompts/list");
    }

    #[tokio::test]
    async fn test_prompt_rendering() {
        let response = app()
            .oneshot(post(
                "/mcp/prompts",
                json!({
                    "jsonrpc": "2.0",
                    "id": 3,
                    "method": "prompts/get",
                    "params": {"name": "animal_profile", "arguments": {"animal": "elephant"}}
                }),
            ))
            .await
            .unwrap();
        let reply = body_json(response).await;
        assert_eq!(reply["result"]["description"], "Educational profile for elephant");
    }

    #[tokio::test]
    async fn test_notifications_are_accepted() {
        let response = app()
            .oneshot(post(
                "/mcp/notifications",
                json!({"jsonrpc": "2.0", "method": "notifications/initialized"}),
            ))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::ACCEPTED);
    }

    #[tokio::test]
    async fn test_malformed_body() {
        let request = Request::builder()
            .method("POST")
            .uri("/mcp/resources")
            .header(header::CONTENT_TYPE, "application/json")
            .body(Body::from("{not json"))
            .unwrap();
        let response = app().oneshot(request).await.unwrap();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        assert_eq!(body_json(response).await["error"], "bad_request");
    }
}
