//! # LoreWeave Core
//!
//! Domain types and error definitions for the LoreWeave prompt engine.
//! This crate has **no I/O**: it defines the character, lorebook and message
//! model that the prompt pipeline and its callers share.
//!
//! ## Ingestion boundary
//!
//! Characters and lorebooks arrive as loose serde records (`CharacterRecord`,
//! `LorebookRecord`) and are converted into strongly-typed values before the
//! engine sees them. Legacy fields are dropped there; invalid lore entries
//! become [`LoreError`]s instead of failing the request.

pub mod character;
pub mod error;
pub mod limits;
pub mod lorebook;
pub mod message;

// Re-export key types at crate root for ergonomics
pub use character::{CharacterProfile, CharacterRecord};
pub use error::{BudgetStage, LoreError, LoreWarning, PromptError};
pub use limits::ModelLimits;
pub use lorebook::{
    LoreEntry, LoreEntryRecord, LorePosition, Lorebook, LorebookRecord, MatchKind,
    TriggeredLoreEntry, VectorHit,
};
pub use message::{Message, Role};
