//! Prompt assembly and context budgeting for character chat.
//!
//! A turn flows through four stages, each feeding the next:
//!
//! 1. **Match**: find the lorebook entries relevant to the turn
//! 2. **Allocate**: pack them into the lore token budget, grouped by position
//! 3. **Assemble**: fit character, lore, history and user turn into the
//!    model's prompt budget
//! 4. **Summarize**: report token usage for the UI
//!
//! [`PromptEngine`] runs the whole pipeline. Every stage is synchronous and
//! free of shared state; randomness only enters through the
//! [`ProbabilityGate`] passed to each build.

pub mod accountant;
pub mod context;
pub mod engine;
pub mod lore;

pub use accountant::{TokenAccountant, TokenStats};
pub use context::{
    AssembledPrompt, AssemblyInput, EstimationMethod, PromptAssembler, SystemContext,
    estimate_message_tokens, estimate_tokens,
};
pub use engine::{EngineOptions, PromptEngine, PromptRequest, PromptRequestRecord, PromptResult};
pub use lore::{
    AlwaysTrigger, LoreAllocation, LoreBlocks, LoreBudgetAllocator, LoreCandidate, LoreMatcher,
    MatchOptions, MatchStrategy, NeverTrigger, ProbabilityGate, SeededGate,
};
