//! Model context limits.

use serde::{Deserialize, Serialize};

/// Context window limits for a target model.
///
/// Wire names follow the token stats panel (`context_window`, `max_output`,
/// `safety_buffer`); camelCase request spellings are accepted as aliases.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ModelLimits {
    /// Total context window of the model
    #[serde(alias = "contextWindow")]
    pub context_window: u32,

    /// Tokens reserved for the model's reply
    #[serde(rename = "max_output", alias = "maxOutputTokens", alias = "max_output_tokens")]
    pub max_output_tokens: u32,

    /// Extra margin against estimation error
    #[serde(rename = "safety_buffer", alias = "safetyBufferTokens", alias = "safety_buffer_tokens")]
    pub safety_buffer_tokens: u32,
}

impl ModelLimits {
    pub const fn new(context_window: u32, max_output_tokens: u32, safety_buffer_tokens: u32) -> Self {
        Self {
            context_window,
            max_output_tokens,
            safety_buffer_tokens,
        }
    }

    /// Tokens available for prompt construction. May be zero or negative.
    pub fn total_budget(&self) -> i64 {
        i64::from(self.context_window)
            - i64::from(self.max_output_tokens)
            - i64::from(self.safety_buffer_tokens)
    }
}

impl Default for ModelLimits {
    fn default() -> Self {
        Self::new(16384, 4096, 500)
    }
}
