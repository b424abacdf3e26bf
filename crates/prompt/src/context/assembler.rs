//! Prompt assembly: fits the turn into the model's context window.
//!
//! Builds the final prompt from four layers:
//!
//! 1. **Fixed system content** (character block, summary, memories, system
//!    modules): never trimmed, and assembly fails if it alone does not fit
//! 2. **Lore** (allocated blocks): spliced around the character block and
//!    around the user message
//! 3. **User turn** (the new message, wrapped by user-side lore): never
//!    dropped; assembly fails if it does not fit
//! 4. **Conversation history**: newest messages kept, oldest dropped, each
//!    message whole or not at all
//!
//! # Determinism
//!
//! Assembly is deterministic: identical inputs always produce identical
//! outputs. Final token usage is re-measured on the assembled text rather
//! than assumed from the fitting arithmetic.

use crate::context::token;
use crate::lore::allocator::LoreBlocks;
use loreweave_core::error::{BudgetStage, PromptError};
use loreweave_core::limits::ModelLimits;
use loreweave_core::message::Message;
use serde::{Deserialize, Serialize};
use tracing::debug;

pub const BEFORE_CHAR_HEADER: &str = "[World Setting]";
pub const AFTER_CHAR_HEADER: &str = "[Additional Lore]";
pub const BEFORE_USER_HEADER: &str = "[Scene Context]";
pub const AFTER_USER_HEADER: &str = "[Note]";

const SECTION_SEPARATOR: &str = "\n\n";

/// Tokens held back from the lore budget for lore section headers and the
/// user-turn wrapper.
pub const LORE_FRAME_RESERVE_TOKENS: usize = 36;

// ── Types ─────────────────────────────────────────────────────────────────

/// Rendered system content that is always included.
#[derive(Debug, Clone, Default)]
pub struct SystemContext {
    /// Character instructions and profile sections.
    pub character: String,
    /// Rolling conversation summary section.
    pub summary: Option<String>,
    /// Long-term memories section.
    pub memories: Option<String>,
    /// Extra instruction modules, appended after lore.
    pub modules: Vec<String>,
}

impl SystemContext {
    /// Compose the system prompt, optionally with lore spliced in.
    pub fn compose(&self, lore: Option<&LoreBlocks>) -> String {
        let mut parts: Vec<String> = vec![self.character.clone()];
        parts.extend(self.summary.iter().cloned());
        parts.extend(self.memories.iter().cloned());

        if let Some(lore) = lore {
            if !lore.before_char.is_empty() {
                parts.push(format!("{BEFORE_CHAR_HEADER}\n{}", lore.before_char));
            }
            if !lore.after_char.is_empty() {
                parts.push(format!("{AFTER_CHAR_HEADER}\n{}", lore.after_char));
            }
        }

        parts.extend(
            self.modules
                .iter()
                .map(|m| m.trim())
                .filter(|m| !m.is_empty())
                .map(str::to_string),
        );

        parts
            .into_iter()
            .filter(|p| !p.is_empty())
            .collect::<Vec<_>>()
            .join(SECTION_SEPARATOR)
    }
}

/// Wrap the user's message with user-side lore. The message itself is kept
/// verbatim.
pub fn wrap_user_turn(message: &str, lore: &LoreBlocks) -> String {
    let mut parts = Vec::with_capacity(3);
    if !lore.before_user.is_empty() {
        parts.push(format!("{BEFORE_USER_HEADER}\n{}", lore.before_user));
    }
    parts.push(message.to_string());
    if !lore.after_user.is_empty() {
        parts.push(format!("{AFTER_USER_HEADER}\n{}", lore.after_user));
    }
    parts.join(SECTION_SEPARATOR)
}

/// All inputs required by the assembler for one turn.
pub struct AssemblyInput<'a> {
    pub system: &'a SystemContext,
    pub lore: &'a LoreBlocks,
    /// Full conversation history, oldest first.
    pub history: &'a [Message],
    pub user_message: &'a str,
    pub limits: ModelLimits,
}

/// The assembled prompt, ready for an LLM API call.
#[derive(Debug, Clone)]
pub struct AssembledPrompt {
    pub system_prompt: String,
    /// History suffix followed by the user turn.
    pub messages: Vec<Message>,
    /// The user turn as sent, lore wrapper included.
    pub user_turn: String,
    /// Number of history messages kept (a suffix of the input history).
    pub included_history: usize,
    pub metadata: AssemblyMetadata,
}

impl AssembledPrompt {
    /// The history messages that made it into the prompt.
    pub fn history(&self) -> &[Message] {
        &self.messages[..self.included_history]
    }
}

/// Measurements taken on the final assembled prompt.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AssemblyMetadata {
    /// Re-measured tokens, message overheads included.
    pub used_tokens: usize,
    /// Context window minus output and safety reservations.
    pub total_budget: i64,
    pub per_layer: Vec<LayerStats>,
    pub drops: Vec<DropInfo>,
    /// History messages removed after re-measuring.
    pub drift_trims: usize,
}

/// Statistics for a single layer.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LayerStats {
    pub name: String,
    pub tokens: usize,
    pub items_included: usize,
    pub items_total: usize,
}

/// Items dropped from a layer during budget enforcement.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DropInfo {
    pub layer: String,
    pub items_dropped: usize,
    pub tokens_dropped: usize,
    pub reason: String,
}

/// Budget left after the mandatory content is reserved.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Reservation {
    pub total_budget: i64,
    pub system_tokens: usize,
    pub user_tokens: usize,
}

impl Reservation {
    pub fn remaining(&self) -> i64 {
        self.total_budget - self.system_tokens as i64 - self.user_tokens as i64
    }
}

// ── Assembler ─────────────────────────────────────────────────────────────

/// The prompt assembler. Stateless; create one and reuse it.
#[derive(Debug, Clone)]
pub struct PromptAssembler {
    max_history_tokens: usize,
}

impl Default for PromptAssembler {
    fn default() -> Self {
        Self {
            max_history_tokens: 4000,
        }
    }
}

impl PromptAssembler {
    pub fn new(max_history_tokens: usize) -> Self {
        Self { max_history_tokens }
    }

    /// Reserve the mandatory content: system text and user turn.
    ///
    /// Fails when the model limits leave no budget, when the system text
    /// alone exceeds it, or when the user turn does not fit beside it.
    pub fn reserve(
        &self,
        system_prompt: &str,
        user_turn: &str,
        limits: &ModelLimits,
    ) -> Result<Reservation, PromptError> {
        let total_budget = limits.total_budget();
        if total_budget <= 0 {
            return Err(PromptError::BudgetExhausted {
                stage: BudgetStage::ModelLimits,
                required: 1,
                available: total_budget,
            });
        }

        let system_tokens = Self::system_tokens(system_prompt);
        if system_tokens as i64 > total_budget {
            return Err(PromptError::BudgetExhausted {
                stage: BudgetStage::SystemContent,
                required: system_tokens as i64,
                available: total_budget,
            });
        }

        let user_tokens = token::estimate_message_tokens(&Message::user(user_turn));
        let reservation = Reservation {
            total_budget,
            system_tokens,
            user_tokens,
        };
        if reservation.remaining() < 0 {
            return Err(PromptError::BudgetExhausted {
                stage: BudgetStage::UserMessage,
                required: user_tokens as i64,
                available: total_budget - system_tokens as i64,
            });
        }
        Ok(reservation)
    }

    /// Tokens available for lore once fixed content and the bare user
    /// message are reserved. Never negative.
    pub fn lore_room(
        &self,
        system: &SystemContext,
        user_message: &str,
        limits: &ModelLimits,
    ) -> Result<usize, PromptError> {
        let reservation = self.reserve(&system.compose(None), user_message, limits)?;
        let room = reservation.remaining() - LORE_FRAME_RESERVE_TOKENS as i64;
        Ok(room.max(0) as usize)
    }

    /// Assemble the prompt.
    ///
    /// # Algorithm
    ///
    /// 1. Reserve fixed system content and the bare user message
    /// 2. Compose the system prompt with lore and wrap the user turn; both
    ///    must still fit
    /// 3. Fill history from newest to oldest within
    ///    `min(max_history_tokens, remaining)`
    /// 4. Re-measure; while over budget drop the oldest kept history message
    pub fn assemble(&self, input: &AssemblyInput<'_>) -> Result<AssembledPrompt, PromptError> {
        // ── Layer 1: Fixed system content ──────────────────────────────────
        self.reserve(&input.system.compose(None), input.user_message, &input.limits)?;

        // ── Layers 2 + 3: Lore and user turn ──────────────────────────────
        let system_prompt = input.system.compose(Some(input.lore));
        let user_turn = wrap_user_turn(input.user_message, input.lore);
        let reservation = self.reserve(&system_prompt, &user_turn, &input.limits)?;
        let total_budget = reservation.total_budget;

        // ── Layer 4: Conversation history ──────────────────────────────────
        let history_budget = (self.max_history_tokens as i64)
            .min(reservation.remaining())
            .max(0) as usize;
        let (mut start, history_tokens) = Self::fit_history(input.history, history_budget);

        let mut drops = Vec::new();
        if start > 0 {
            drops.push(DropInfo {
                layer: "history".into(),
                items_dropped: start,
                tokens_dropped: token::estimate_messages_tokens(&input.history[..start]),
                reason: "Oldest messages dropped to fit the history budget".into(),
            });
        }

        // ── Re-measure ─────────────────────────────────────────────────────
        // The fit above uses the same per-message costs as `measure` and is
        // capped at `remaining()`, so this loop stays idle while estimation
        // is additive per message. It guards a non-additive estimator.
        let mut used = Self::measure(&system_prompt, &user_turn, &input.history[start..]);
        let mut drift_trims = 0;
        while used as i64 > total_budget && start < input.history.len() {
            start += 1;
            drift_trims += 1;
            used = Self::measure(&system_prompt, &user_turn, &input.history[start..]);
        }
        if drift_trims > 0 {
            debug!(drift_trims, used, total_budget, "Re-trimmed history after re-measuring");
        }
        if used as i64 > total_budget {
            return Err(PromptError::BudgetExhausted {
                stage: BudgetStage::UserMessage,
                required: used as i64,
                available: total_budget,
            });
        }

        let included = &input.history[start..];
        let mut messages: Vec<Message> = included.to_vec();
        messages.push(Message::user(user_turn.clone()));

        let lore_tokens = reservation
            .system_tokens
            .saturating_sub(Self::system_tokens(&input.system.compose(None)));
        let per_layer = vec![
            LayerStats {
                name: "system".into(),
                tokens: reservation.system_tokens,
                items_included: 1,
                items_total: 1,
            },
            LayerStats {
                name: "lore".into(),
                tokens: lore_tokens,
                items_included: usize::from(!input.lore.is_empty()),
                items_total: usize::from(!input.lore.is_empty()),
            },
            LayerStats {
                name: "history".into(),
                tokens: token::estimate_messages_tokens(included),
                items_included: included.len(),
                items_total: input.history.len(),
            },
            LayerStats {
                name: "user_message".into(),
                tokens: reservation.user_tokens,
                items_included: 1,
                items_total: 1,
            },
        ];

        debug!(
            used,
            total_budget,
            history_tokens,
            history_kept = included.len(),
            history_total = input.history.len(),
            "Prompt assembled"
        );

        Ok(AssembledPrompt {
            system_prompt,
            messages,
            user_turn,
            included_history: included.len(),
            metadata: AssemblyMetadata {
                used_tokens: used,
                total_budget,
                per_layer,
                drops,
                drift_trims,
            },
        })
    }

    // ── Private helpers ───────────────────────────────────────────────────

    /// The system prompt travels as a message too.
    fn system_tokens(system_prompt: &str) -> usize {
        token::estimate_tokens(system_prompt) + token::MESSAGE_OVERHEAD_TOKENS
    }

    /// Index of the first kept message and the tokens spent.
    ///
    /// Walks from the newest message back and stops at the first message
    /// that does not fit, so the kept messages form a contiguous suffix.
    fn fit_history(history: &[Message], budget: usize) -> (usize, usize) {
        let mut used = 0;
        let mut start = history.len();

        for (idx, msg) in history.iter().enumerate().rev() {
            let msg_tokens = token::estimate_message_tokens(msg);
            if used + msg_tokens > budget {
                break;
            }
            used += msg_tokens;
            start = idx;
        }

        (start, used)
    }

    fn measure(system_prompt: &str, user_turn: &str, history: &[Message]) -> usize {
        Self::system_tokens(system_prompt)
            + token::estimate_message_tokens(&Message::user(user_turn))
            + token::estimate_messages_tokens(history)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use loreweave_core::lorebook::LorePosition;

    // ── Helpers ────────────────────────────────────────────────────────

    fn system(text: &str) -> SystemContext {
        SystemContext {
            character: text.into(),
            ..Default::default()
        }
    }

    fn roomy() -> ModelLimits {
        ModelLimits::new(10_000, 1000, 100)
    }

    fn assemble_with(
        sys: &SystemContext,
        lore: &LoreBlocks,
        history: &[Message],
        user: &str,
        limits: ModelLimits,
    ) -> Result<AssembledPrompt, PromptError> {
        PromptAssembler::default().assemble(&AssemblyInput {
            system: sys,
            lore,
            history,
            user_message: user,
            limits,
        })
    }

    fn chat(n: usize) -> Vec<Message> {
        (0..n)
            .map(|i| {
                if i % 2 == 0 {
                    Message::user(format!("user line number {i}"))
                } else {
                    Message::assistant(format!("assistant line number {i}"))
                }
            })
            .collect()
    }

    // ── Tests ──────────────────────────────────────────────────────────

    #[test]
    fn user_message_always_last() {
        let out = assemble_with(&system("You are a bard."), &LoreBlocks::default(), &chat(4), "Sing!", roomy())
            .unwrap();
        let last = out.messages.last().unwrap();
        assert_eq!(last.content, "Sing!");
        assert_eq!(out.included_history, 4);
        assert_eq!(out.system_prompt, "You are a bard.");
    }

    #[test]
    fn non_positive_budget_fails() {
        let err = assemble_with(
            &system("x"),
            &LoreBlocks::default(),
            &[],
            "hi",
            ModelLimits::new(100, 90, 20),
        )
        .unwrap_err();
        assert!(matches!(
            err,
            PromptError::BudgetExhausted {
                stage: BudgetStage::ModelLimits,
                available: -10,
                ..
            }
        ));
    }

    #[test]
    fn oversized_system_content_fails() {
        let err = assemble_with(
            &system(&"word ".repeat(200)),
            &LoreBlocks::default(),
            &[],
            "hi",
            ModelLimits::new(300, 100, 50),
        )
        .unwrap_err();
        assert!(matches!(
            err,
            PromptError::BudgetExhausted {
                stage: BudgetStage::SystemContent,
                ..
            }
        ));
    }

    #[test]
    fn oversized_user_message_fails() {
        let err = assemble_with(
            &system("short"),
            &LoreBlocks::default(),
            &[],
            &"long ".repeat(200),
            ModelLimits::new(300, 100, 50),
        )
        .unwrap_err();
        assert!(matches!(
            err,
            PromptError::BudgetExhausted {
                stage: BudgetStage::UserMessage,
                ..
            }
        ));
    }

    #[test]
    fn lore_is_spliced_by_position() {
        let mut lore = LoreBlocks::default();
        lore.push(LorePosition::BeforeChar, "The realm is flat.");
        lore.push(LorePosition::AfterChar, "Magic is rare.");
        lore.push(LorePosition::BeforeUser, "It is raining.");
        lore.push(LorePosition::AfterUser, "Answer briefly.");
        let sys = SystemContext {
            character: "You are a bard.".into(),
            modules: vec!["Use British spelling.".into()],
            ..Default::default()
        };

        let out = assemble_with(&sys, &lore, &[], "Hello", roomy()).unwrap();
        assert_eq!(
            out.system_prompt,
            "You are a bard.\n\n[World Setting]\nThe realm is flat.\n\n[Additional Lore]\nMagic is rare.\n\nUse British spelling."
        );
        assert_eq!(
            out.user_turn,
            "[Scene Context]\nIt is raining.\n\nHello\n\n[Note]\nAnswer briefly."
        );
        assert_eq!(out.messages.last().unwrap().content, out.user_turn);
    }

    #[test]
    fn summary_and_memories_follow_character() {
        let sys = SystemContext {
            character: "C".into(),
            summary: Some("S".into()),
            memories: Some("M".into()),
            modules: vec!["  ".into()],
        };
        assert_eq!(sys.compose(None), "C\n\nS\n\nM");
    }

    #[test]
    fn history_is_contiguous_suffix() {
        let history = chat(30);
        let limits = ModelLimits::new(200, 50, 10);
        let out = assemble_with(&system("sys"), &LoreBlocks::default(), &history, "next", limits).unwrap();

        let kept = out.history();
        assert!(out.included_history < history.len());
        assert!(out.included_history > 0);
        assert_eq!(kept, &history[history.len() - kept.len()..]);
        assert!(out.metadata.used_tokens as i64 <= out.metadata.total_budget);
        assert_eq!(out.metadata.drops[0].items_dropped, history.len() - kept.len());
    }

    #[test]
    fn oversized_recent_message_stops_history() {
        let history = vec![
            Message::user("old and short"),
            Message::assistant("x".repeat(2000)),
        ];
        let limits = ModelLimits::new(400, 100, 50);
        let out = assemble_with(&system("sys"), &LoreBlocks::default(), &history, "hi", limits).unwrap();
        // The newest message does not fit, so nothing older is kept either.
        assert_eq!(out.included_history, 0);
    }

    #[test]
    fn history_soft_cap_applies() {
        let history = chat(40);
        let assembler = PromptAssembler::new(30);
        let out = assembler
            .assemble(&AssemblyInput {
                system: &system("sys"),
                lore: &LoreBlocks::default(),
                history: &history,
                user_message: "go",
                limits: roomy(),
            })
            .unwrap();
        assert!(token::estimate_messages_tokens(out.history()) <= 30);
    }

    #[test]
    fn lore_room_accounts_for_fixed_content() {
        let assembler = PromptAssembler::default();
        let limits = ModelLimits::new(1000, 200, 50);
        let sys = system("A short character.");
        let room = assembler.lore_room(&sys, "hello", &limits).unwrap();

        let system_tokens = token::estimate_tokens("A short character.") + token::MESSAGE_OVERHEAD_TOKENS;
        let user_tokens = token::estimate_message_tokens(&Message::user("hello"));
        assert_eq!(
            room,
            750 - system_tokens - user_tokens - LORE_FRAME_RESERVE_TOKENS
        );
    }

    #[test]
    fn remeasure_agrees_with_fit_across_budgets() {
        let history = chat(30);
        let mut assembled = 0;
        for context in (80..400).step_by(7) {
            let limits = ModelLimits::new(context, 50, 10);
            let Ok(out) = assemble_with(&system("sys"), &LoreBlocks::default(), &history, "next", limits)
            else {
                continue;
            };
            assembled += 1;
            assert_eq!(out.metadata.drift_trims, 0, "context {context}");
            assert!(out.metadata.used_tokens as i64 <= out.metadata.total_budget);
        }
        assert!(assembled > 0);
    }

    #[test]
    fn deterministic_assembly() {
        let history = chat(10);
        let a = assemble_with(&system("sys"), &LoreBlocks::default(), &history, "q", roomy()).unwrap();
        let b = assemble_with(&system("sys"), &LoreBlocks::default(), &history, "q", roomy()).unwrap();
        assert_eq!(a.system_prompt, b.system_prompt);
        assert_eq!(a.messages, b.messages);
        assert_eq!(a.metadata.used_tokens, b.metadata.used_tokens);
    }
}
