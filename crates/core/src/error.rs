//! Error types for the LoreWeave domain.
//!
//! Uses `thiserror` for ergonomic error definitions.
//! Each bounded context has its own error type: [`PromptError`] is fatal for
//! the turn, [`LoreError`] is recovered and surfaced as a [`LoreWarning`].

use serde::{Deserialize, Serialize};
use thiserror::Error;

// --- Bounded context errors ---

/// Which piece of mandatory content could not be accommodated.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BudgetStage {
    /// Context window minus output and safety reservations is not positive.
    ModelLimits,
    /// The character block and fixed system context alone exceed the budget.
    SystemContent,
    /// No room remains for the user's message.
    UserMessage,
}

impl std::fmt::Display for BudgetStage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let label = match self {
            Self::ModelLimits => "model limits",
            Self::SystemContent => "system content",
            Self::UserMessage => "user message",
        };
        f.write_str(label)
    }
}

/// Hard failures of prompt assembly. Fatal for the turn and never retried.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum PromptError {
    #[error("Token budget exhausted at {stage}: need {required} tokens, {available} available")]
    BudgetExhausted {
        stage: BudgetStage,
        required: i64,
        available: i64,
    },
}

impl PromptError {
    /// HTTP status the API boundary should answer with.
    ///
    /// Budget exhaustion is a client/config problem (model limits too small or
    /// conversation too large), distinct from upstream provider failures.
    pub fn status_code(&self) -> u16 {
        match self {
            Self::BudgetExhausted { .. } => 413,
        }
    }

    /// Short message suitable for showing to the end user.
    pub fn user_hint(&self) -> &'static str {
        match self {
            Self::BudgetExhausted {
                stage: BudgetStage::ModelLimits,
                ..
            } => "The model limits leave no room for a prompt. Check the model settings.",
            Self::BudgetExhausted { .. } => {
                "Message too long for this model. Start a new conversation or shorten the message."
            }
        }
    }
}

/// Entry-level lorebook problems. Recovered locally: the entry (or key) is
/// skipped and a warning is attached to the result.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum LoreError {
    #[error("Invalid lore entry {entry_id}: {reason}")]
    InvalidLoreEntry { entry_id: String, reason: String },
}

impl LoreError {
    pub fn invalid(entry_id: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::InvalidLoreEntry {
            entry_id: entry_id.into(),
            reason: reason.into(),
        }
    }
}

/// Serializable form of a soft [`LoreError`], attached to prompt results.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LoreWarning {
    pub entry_id: String,
    pub reason: String,
}

impl From<LoreError> for LoreWarning {
    fn from(err: LoreError) -> Self {
        match err {
            LoreError::InvalidLoreEntry { entry_id, reason } => Self { entry_id, reason },
        }
    }
}
