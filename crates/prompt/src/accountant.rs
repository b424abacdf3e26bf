//! Token accounting for the assembled prompt.
//!
//! Pure aggregation over an [`AssembledPrompt`]. The field names of
//! [`TokenStats`] are bound by the token panel and must stay stable.

use crate::context::assembler::AssembledPrompt;
use crate::context::token::{self, ESTIMATION_METHOD, EstimationMethod};
use crate::lore::allocator::LoreAllocation;
use loreweave_core::limits::ModelLimits;
use serde::{Deserialize, Serialize};

/// Usage breakdown for one turn.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TokenStats {
    /// Estimated tokens of the final system prompt.
    pub system: usize,
    /// Estimated tokens of the user turn as sent. Includes any
    /// `[Scene Context]` and `[Note]` lore wrapped around the message.
    pub user: usize,
    /// Estimated tokens of the included history, message overheads included.
    pub history: usize,
    /// Tokens spent on lore by the allocator.
    pub lore_budget: usize,
    /// Prompt budget minus `system + user + history`, floored at zero.
    pub budget_left: usize,
    pub model_limits: ModelLimits,
    pub estimation_method: EstimationMethod,
    /// Whether a conversation summary was injected.
    pub smart_context_used: bool,
    /// Tokens of the injected summary. Already counted in `system`.
    pub smart_context_tokens: usize,
}

/// Builds [`TokenStats`] from assembly output.
pub struct TokenAccountant;

impl TokenAccountant {
    pub fn summarize(
        prompt: &AssembledPrompt,
        allocation: &LoreAllocation,
        limits: &ModelLimits,
        summary_block: Option<&str>,
    ) -> TokenStats {
        let system = token::estimate_tokens(&prompt.system_prompt);
        let user = token::estimate_tokens(&prompt.user_turn);
        let history = token::estimate_messages_tokens(prompt.history());

        let spent = (system + user + history) as i64;
        let budget_left = (limits.total_budget() - spent).max(0) as usize;

        TokenStats {
            system,
            user,
            history,
            lore_budget: allocation.spent,
            budget_left,
            model_limits: *limits,
            estimation_method: ESTIMATION_METHOD,
            smart_context_used: summary_block.is_some(),
            smart_context_tokens: summary_block.map(token::estimate_tokens).unwrap_or(0),
        }
    }
}
