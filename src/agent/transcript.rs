//! Conversation turns for a single prompt

use crate::llm::{FunctionResponse, LlmResponse, Turn};

/// Ordered turns owned by one loop invocation
#[derive(Debug, Clone, Default)]
pub struct Transcript {
    turns: Vec<Turn>,
}

impl Transcript {
    /// Start with the user's prompt
    pub fn new(prompt: &str) -> Self {
        Self {
            turns: vec![Turn::user_text(prompt)],
        }
    }

    /// Record a model reply and the results of the calls it requested
    pub fn push_round(&mut self, reply: &LlmResponse, responses: Vec<FunctionResponse>) {
        self.turns.push(reply.to_turn());
        self.turns.push(Turn::function_responses(responses));
    }

    pub fn turns(&self) -> &[Turn] {
        &self.turns
    }

    pub fn len(&self) -> usize {
        self.turns.len()
    }

    pub fn is_empty(&self) -> bool {
        self.turns.is_empty()
    }
}
