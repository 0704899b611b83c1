//! Google Gemini API integration
//!
//! Function-calling client for the `generateContent` endpoint.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::debug;

use crate::llm::retry_utils::{send_api_request_with_retry, RetryConfig};
use crate::llm::{
    Backend, FunctionCall, FunctionDeclaration, FunctionResponse, LlmError, LlmResponse, Part,
    Role, TokenUsage, Turn,
};

// Constants for Gemini API
pub const API_BASE_URL: &str = "https://generativelanguage.googleapis.com/v1beta";
pub const DEFAULT_MODEL: &str = "gemini-2.0-flash";

/// Gemini API request types
#[derive(Debug, Serialize)]
struct GeminiRequest<'a> {
    contents: Vec<GeminiContent>,
    #[serde(skip_serializing_if = "Option::is_none")]
    tools: Option<Vec<GeminiTool<'a>>>,
}

#[derive(Debug, Serialize)]
struct GeminiTool<'a> {
    function_declarations: &'a [FunctionDeclaration],
}

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
struct GeminiContent {
    #[serde(default)]
    parts: Vec<GeminiPart>,
    #[serde(skip_serializing_if = "Option::is_none")]
    role: Option<String>,
}

#[derive(Debug, Default, Serialize, Deserialize, Clone, PartialEq)]
#[serde(rename_all = "camelCase")]
struct GeminiPart {
    #[serde(skip_serializing_if = "Option::is_none")]
    text: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    function_call: Option<FunctionCall>,
    #[serde(skip_serializing_if = "Option::is_none")]
    function_response: Option<FunctionResponse>,
}

// Gemini API response types

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct PromptFeedback {
    block_reason: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct GeminiResponse {
    // Missing when the prompt was blocked
    #[serde(default)]
    candidates: Vec<GeminiCandidate>,
    #[serde(default)]
    usage_metadata: Option<GeminiUsageMetadata>,
    #[serde(default)]
    prompt_feedback: Option<PromptFeedback>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct GeminiCandidate {
    #[serde(default)]
    content: Option<GeminiContent>,
    finish_reason: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct GeminiUsageMetadata {
    prompt_token_count: Option<u32>,
    candidates_token_count: Option<u32>,
}

/// Google Gemini API client implementation
pub struct GeminiBackend {
    api_key: String,
    client: reqwest::Client,
    model_name: String,
    base_url: String,
    retry: RetryConfig,
}

impl GeminiBackend {
    /// Create a new Gemini client
    pub fn new(api_key: String, model_name: String) -> Result<Self, LlmError> {
        if api_key.trim().is_empty() {
            return Err(LlmError::Config("Gemini API key is empty".to_string()));
        }
        let client = reqwest::Client::builder()
            .build()
            .map_err(|e| LlmError::Config(format!("Failed to create HTTP client: {}", e)))?;

        Ok(Self {
            api_key,
            client,
            model_name,
            base_url: API_BASE_URL.to_string(),
            retry: RetryConfig::default(),
        })
    }

    /// Point the client at another API root (used by tests and proxies)
    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into().trim_end_matches('/').to_string();
        self
    }

    pub fn with_retry_config(mut self, retry: RetryConfig) -> Self {
        self.retry = retry;
        self
    }

    fn endpoint(&self) -> String {
        format!(
            "{}/models/{}:generateContent",
            self.base_url, self.model_name
        )
    }
}

/// Convert a conversation into Gemini API format
fn convert_turns(turns: &[Turn]) -> Vec<GeminiContent> {
    turns
        .iter()
        .map(|turn| GeminiContent {
            role: Some(
                match turn.role {
                    Role::User => "user",
                    Role::Model => "model",
                }
                .to_string(),
            ),
            parts: turn.parts.iter().map(convert_part).collect(),
        })
        .collect()
}

fn convert_part(part: &Part) -> GeminiPart {
    match part {
        Part::Text(text) => GeminiPart {
            text: Some(text.clone()),
            ..GeminiPart::default()
        },
        Part::FunctionCall(call) => GeminiPart {
            function_call: Some(call.clone()),
            ..GeminiPart::default()
        },
        Part::FunctionResponse(response) => GeminiPart {
            function_response: Some(response.clone()),
            ..GeminiPart::default()
        },
    }
}

/// Convert the first candidate back into our response type
fn convert_response(response: GeminiResponse) -> Result<LlmResponse, LlmError> {
    if let Some(reason) = response
        .prompt_feedback
        .as_ref()
        .and_then(|feedback| feedback.block_reason.as_deref())
    {
        return Err(LlmError::Api(format!(
            "Gemini API request blocked. Reason: {}. No candidates generated.",
            reason
        )));
    }

    let usage = response.usage_metadata.map(|usage| TokenUsage {
        input_tokens: usage.prompt_token_count.unwrap_or(0) as usize,
        output_tokens: usage.candidates_token_count.unwrap_or(0) as usize,
    });

    let candidate = response.candidates.into_iter().next().ok_or_else(|| {
        LlmError::Api("No candidates returned from Gemini API".to_string())
    })?;

    let mut parts = Vec::new();
    for part in candidate.content.map(|c| c.parts).unwrap_or_default() {
        if let Some(mut call) = part.function_call {
            // Calls without arguments arrive with `args` missing
            if call.args.is_null() {
                call.args = Value::Object(Default::default());
            }
            parts.push(Part::FunctionCall(call));
        } else if let Some(text) = part.text {
            parts.push(Part::Text(text));
        }
    }

    Ok(LlmResponse {
        parts,
        usage,
        finish_reason: candidate.finish_reason,
    })
}

#[async_trait]
impl Backend for GeminiBackend {
    async fn generate(
        &self,
        contents: &[Turn],
        tools: &[FunctionDeclaration],
    ) -> Result<LlmResponse, LlmError> {
        let request = GeminiRequest {
            contents: convert_turns(contents),
            tools: if tools.is_empty() {
                None
            } else {
                Some(vec![GeminiTool {
                    function_declarations: tools,
                }])
            },
        };
        debug!(
            "Gemini request: {} turns, {} function declarations",
            contents.len(),
            tools.len()
        );

        let url = self.endpoint();
        let response: GeminiResponse = send_api_request_with_retry(
            || {
                self.client
                    .post(&url)
                    .query(&[("key", self.api_key.as_str())])
                    .json(&request)
            },
            &self.retry,
            "Gemini",
        )
        .await?;

        convert_response(response)
    }

    fn name(&self) -> &str {
        "gemini"
    }

    fn model(&self) -> &str {
        &self.model_name
    }
}
