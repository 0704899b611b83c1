//! Common types for LLM interactions
//!
//! A conversation is a list of [`Turn`]s, each made of [`Part`]s. Function
//! calls and their responses are parts like any other.

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Who produced a turn
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    User,
    Model,
}

/// One piece of a turn
#[derive(Debug, Clone, PartialEq)]
pub enum Part {
    Text(String),
    FunctionCall(FunctionCall),
    FunctionResponse(FunctionResponse),
}

/// A tool invocation requested by the model
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FunctionCall {
    pub name: String,
    #[serde(default)]
    pub args: Value,
}

/// The outcome of a tool invocation, sent back to the model
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FunctionResponse {
    pub name: String,
    pub response: Value,
}

/// A tool the model may call
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FunctionDeclaration {
    pub name: String,
    pub description: String,
    /// Omitted for functions without parameters
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub parameters: Option<Value>,
}

/// A message in a conversation
#[derive(Debug, Clone, PartialEq)]
pub struct Turn {
    pub role: Role,
    pub parts: Vec<Part>,
}

impl Turn {
    /// Create a user turn holding plain text
    pub fn user_text(text: impl Into<String>) -> Self {
        Self {
            role: Role::User,
            parts: vec![Part::Text(text.into())],
        }
    }

    /// Create a user turn carrying function results
    pub fn function_responses(responses: Vec<FunctionResponse>) -> Self {
        Self {
            role: Role::User,
            parts: responses.into_iter().map(Part::FunctionResponse).collect(),
        }
    }
}

/// Token usage statistics
#[derive(Debug, Clone, Default, PartialEq)]
pub struct TokenUsage {
    pub input_tokens: usize,
    pub output_tokens: usize,
}

/// Response from an LLM provider
#[derive(Debug, Clone, PartialEq)]
pub struct LlmResponse {
    /// Parts of the model's turn, in order
    pub parts: Vec<Part>,

    /// Usage statistics, if available
    pub usage: Option<TokenUsage>,

    /// Why generation stopped (e.g. "STOP", "MAX_TOKENS")
    pub finish_reason: Option<String>,
}

impl LlmResponse {
    /// A reply holding only text
    pub fn text_only(text: impl Into<String>) -> Self {
        Self {
            parts: vec![Part::Text(text.into())],
            usage: None,
            finish_reason: None,
        }
    }

    /// All text parts joined together
    pub fn text(&self) -> String {
        self.parts
            .iter()
            .filter_map(|part| match part {
                Part::Text(text) => Some(text.as_str()),
                _ => None,
            })
            .collect::<Vec<_>>()
            .join("")
    }

    /// Function calls requested by the model, in order
    pub fn function_calls(&self) -> Vec<&FunctionCall> {
        self.parts
            .iter()
            .filter_map(|part| match part {
                Part::FunctionCall(call) => Some(call),
                _ => None,
            })
            .collect()
    }

    /// Any function-call part means the model wants another tool round
    pub fn has_function_calls(&self) -> bool {
        self.parts
            .iter()
            .any(|part| matches!(part, Part::FunctionCall(_)))
    }

    /// The reply as a model turn for the transcript
    pub fn to_turn(&self) -> Turn {
        Turn {
            role: Role::Model,
            parts: self.parts.clone(),
        }
    }
}
