use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::rpc::{codes, RpcError};

#[derive(Error, Debug)]
pub enum ServerError {
    #[error("Method not found: {0}")]
    MethodNotFound(String),

    #[error("Invalid params: {0}")]
    InvalidParams(String),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Bad request: {0}")]
    BadRequest(String),

    #[error("External service error: {0}")]
    External(String),

    #[error("Internal server error: {0}")]
    Internal(String),

    #[error("Configuration error: {0}")]
    Config(String),
}

impl ServerError {
    /// The JSON-RPC error object carried in an error reply
    pub fn to_rpc(&self) -> RpcError {
        let code = match self {
            ServerError::MethodNotFound(_) => codes::METHOD_NOT_FOUND,
            ServerError::InvalidParams(_) | ServerError::NotFound(_) => codes::INVALID_PARAMS,
            ServerError::BadRequest(_) => codes::INVALID_REQUEST,
            ServerError::External(_) | ServerError::Internal(_) | ServerError::Config(_) => {
                codes::INTERNAL_ERROR
            }
        };
        let message = match self {
            ServerError::MethodNotFound(message) | ServerError::InvalidParams(message) => {
                message.clone()
            }
            other => other.to_string(),
        };
        RpcError { code, message }
    }
}

#[derive(Serialize, Deserialize)]
struct ErrorResponse {
    error: String,
    message: String,
    status_code: u16,
}

impl IntoResponse for ServerError {
    fn into_response(self) -> Response {
        let status = match &self {
            ServerError::MethodNotFound(_) => StatusCode::NOT_FOUND,
            ServerError::InvalidParams(_) => StatusCode::BAD_REQUEST,
            ServerError::NotFound(_) => StatusCode::NOT_FOUND,
            ServerError::BadRequest(_) => StatusCode::BAD_REQUEST,
            ServerError::External(_) => StatusCode::BAD_GATEWAY,
            ServerError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
            ServerError::Config(_) => StatusCode::INTERNAL_SERVER_ERROR,
        };

        let error_type = match &self {
            ServerError::MethodNotFound(_) => "method_not_found",
            ServerError::InvalidParams(_) => "invalid_params",
            ServerError::NotFound(_) => "not_found",
            ServerError::BadRequest(_) => "bad_request",
            ServerError::External(_) => "external_service_error",
            ServerError::Internal(_) => "internal_server_error",
            ServerError::Config(_) => "configuration_error",
        };

        let body = Json(ErrorResponse {
            error: error_type.to_string(),
            message: self.to_string(),
            status_code: status.as_u16(),
        });

        (status, body).into_response()
    }
}

impl From<reqwest::Error> for ServerError {
    fn from(err: reqwest::Error) -> Self {
        ServerError::External(format!("HTTP request error: {}", err))
    }
}

impl From<config::ConfigError> for ServerError {
    fn from(err: config::ConfigError) -> Self {
        ServerError::Config(format!("Configuration error: {}", err))
    }
}

impl From<serde_json::Error> for ServerError {
    fn from(err: serde_json::Error) -> Self {
        ServerError::BadRequest(format!("Malformed JSON: {}", err))
    }
}

pub type ServerResult<T> = Result<T, ServerError>;
