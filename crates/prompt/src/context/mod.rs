//! Context assembly pipeline.
//!
//! Renders the character's fixed instructions, estimates token costs and
//! fits the turn into the model's prompt budget.
//!
//! # Layers (in priority order)
//!
//! | Layer | Source | Trim Strategy |
//! |-------|--------|---------------|
//! | 1. System | Character card, summary, memories, modules | Never trimmed |
//! | 2. Lore | Allocated lore blocks | Sized before assembly |
//! | 3. User turn | New message + user-side lore | Never trimmed |
//! | 4. History | Recent turns | Oldest turns dropped |

pub mod assembler;
pub mod persona;
pub mod token;

pub use assembler::{
    AssembledPrompt, AssemblyInput, AssemblyMetadata, DropInfo, LayerStats, PromptAssembler,
    Reservation, SystemContext,
};
pub use token::{EstimationMethod, estimate_message_tokens, estimate_messages_tokens, estimate_tokens};
