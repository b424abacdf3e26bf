//! Lorebook matching and budgeting.
//!
//! Matching decides which entries are relevant to the turn; allocation packs
//! them into the lore token budget and groups them by injection point.

pub mod allocator;
pub mod gate;
pub mod matcher;

pub use allocator::{LoreAllocation, LoreBlocks, LoreBudgetAllocator};
pub use gate::{AlwaysTrigger, NeverTrigger, ProbabilityGate, SeededGate};
pub use matcher::{
    KeywordStrategy, LoreCandidate, LoreMatcher, MatchOptions, MatchOutcome, MatchStrategy,
    ScanText, StrategyHit, VectorStrategy,
};
