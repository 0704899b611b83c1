//! LLM provider abstraction layer
//!
//! The orchestration loop talks to a function-calling model through the
//! [`Backend`] trait; [`gemini::GeminiBackend`] is the HTTP implementation.

pub use async_trait::async_trait;

pub mod gemini;
pub mod retry_utils;
mod types;

pub use self::gemini::GeminiBackend;
pub use self::types::*;

use thiserror::Error;

/// Common trait for all LLM backends
#[async_trait]
pub trait Backend: Send + Sync {
    /// Send the conversation so far and get the model's next turn.
    ///
    /// An empty `tools` slice sends the request without any function
    /// declarations, which forces a plain reply.
    async fn generate(
        &self,
        contents: &[Turn],
        tools: &[FunctionDeclaration],
    ) -> Result<LlmResponse, LlmError>;

    /// Get the provider name
    fn name(&self) -> &str;

    /// Get the model name
    fn model(&self) -> &str;
}

/// Error types for LLM operations
#[derive(Error, Debug)]
pub enum LlmError {
    /// API request error
    #[error("API error: {0}")]
    Api(String),

    /// Configuration error
    #[error("Configuration error: {0}")]
    Config(String),

    /// Rate limit error
    #[error("Rate limit exceeded{}", retry_suffix(.retry_after))]
    RateLimit { retry_after: Option<u64> },

    /// Transport-level HTTP failure
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),
}

fn retry_suffix(retry_after: &Option<u64>) -> String {
    match retry_after {
        Some(seconds) => format!(". Retry after {} seconds", seconds),
        None => String::new(),
    }
}
