//! The prompt-building pipeline: match → allocate → assemble → summarize.
//!
//! [`PromptEngine::build`] is the one operation callers need. It holds no
//! per-session state; everything about the turn arrives in the
//! [`PromptRequest`] and nothing is cached between calls, so one engine can
//! serve concurrent turns.

use crate::accountant::{TokenAccountant, TokenStats};
use crate::context::assembler::{AssemblyInput, PromptAssembler, SystemContext};
use crate::context::persona;
use crate::lore::allocator::{LoreBlocks, LoreBudgetAllocator};
use crate::lore::gate::{ProbabilityGate, SeededGate};
use crate::lore::matcher::{LoreMatcher, MatchOptions};
use loreweave_config::AppConfig;
use loreweave_core::character::{CharacterProfile, CharacterRecord};
use loreweave_core::error::{LoreWarning, PromptError};
use loreweave_core::limits::ModelLimits;
use loreweave_core::lorebook::{Lorebook, LorebookRecord, TriggeredLoreEntry, VectorHit};
use loreweave_core::message::Message;
use serde::{Deserialize, Serialize};
use tracing::debug;

// ── Request / result ──────────────────────────────────────────────────────

/// Everything needed to build one turn's prompt.
#[derive(Debug, Clone, Default)]
pub struct PromptRequest {
    pub character: CharacterProfile,
    pub lorebook: Option<Lorebook>,
    /// Prior conversation, oldest first.
    pub history: Vec<Message>,
    pub new_user_message: String,
    /// Falls back to the engine's default limits when absent.
    pub model_limits: Option<ModelLimits>,
    /// Overrides the configured scan depth.
    pub scan_depth: Option<usize>,
    /// Pre-scored semantic matches from an external scorer.
    pub vector_hits: Vec<VectorHit>,
    pub history_summary: Option<String>,
    pub memories: Vec<String>,
    pub system_modules: Vec<String>,
    /// Overrides the configured `{{user}}` value.
    pub user_name: Option<String>,
    /// Seed for the probability gate in [`PromptEngine::build_seeded`].
    pub seed: Option<u64>,
    /// Problems found while validating the lorebook.
    pub ingestion_warnings: Vec<LoreWarning>,
}

/// Wire shape of a [`PromptRequest`]. Accepts snake_case and camelCase.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct PromptRequestRecord {
    pub character: CharacterRecord,
    pub lorebook: Option<LorebookRecord>,
    pub history: Vec<Message>,
    #[serde(alias = "newUserMessage", alias = "message")]
    pub new_user_message: String,
    #[serde(alias = "modelLimits")]
    pub model_limits: Option<ModelLimits>,
    #[serde(alias = "scanDepth")]
    pub scan_depth: Option<usize>,
    #[serde(alias = "vectorHits")]
    pub vector_hits: Vec<VectorHit>,
    #[serde(alias = "historySummary", alias = "summary")]
    pub history_summary: Option<String>,
    pub memories: Vec<String>,
    #[serde(alias = "systemModules")]
    pub system_modules: Vec<String>,
    #[serde(alias = "userName")]
    pub user_name: Option<String>,
    pub seed: Option<u64>,
}

impl From<PromptRequestRecord> for PromptRequest {
    fn from(record: PromptRequestRecord) -> Self {
        let (lorebook, errors) = match record.lorebook {
            Some(book) => {
                let (book, errors) = Lorebook::from_record(book);
                (Some(book), errors)
            }
            None => (None, Vec::new()),
        };

        Self {
            character: record.character.into(),
            lorebook,
            history: record.history,
            new_user_message: record.new_user_message,
            model_limits: record.model_limits,
            scan_depth: record.scan_depth,
            vector_hits: record.vector_hits,
            history_summary: record.history_summary,
            memories: record.memories,
            system_modules: record.system_modules,
            user_name: record.user_name,
            seed: record.seed,
            ingestion_warnings: errors.into_iter().map(LoreWarning::from).collect(),
        }
    }
}

/// The built prompt plus what the UI needs to display about it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PromptResult {
    pub system_prompt: String,
    /// History suffix followed by the user turn.
    pub messages: Vec<Message>,
    pub triggered_entries: Vec<TriggeredLoreEntry>,
    pub lore_blocks: LoreBlocks,
    /// Display rendering of `lore_blocks`.
    pub lore_block_preview: String,
    pub token_stats: TokenStats,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub warnings: Vec<LoreWarning>,
}

// ── Engine ────────────────────────────────────────────────────────────────

/// Engine tuning knobs.
#[derive(Debug, Clone)]
pub struct EngineOptions {
    /// Upper bound for lore tokens per turn.
    pub lore_token_budget: usize,
    pub scan_depth: usize,
    pub max_entries: usize,
    pub max_recursion_depth: usize,
    pub vector_min_score: f32,
    pub max_history_tokens: usize,
    pub max_memory_chars: usize,
    pub user_name: String,
    /// Used when a request carries no model limits.
    pub default_limits: ModelLimits,
}

impl Default for EngineOptions {
    fn default() -> Self {
        Self::from(&AppConfig::default())
    }
}

impl From<&AppConfig> for EngineOptions {
    fn from(config: &AppConfig) -> Self {
        Self {
            lore_token_budget: config.lore.token_budget,
            scan_depth: config.lore.scan_depth,
            max_entries: config.lore.max_entries,
            max_recursion_depth: config.lore.max_recursion_depth,
            vector_min_score: config.lore.vector_min_score,
            max_history_tokens: config.history.max_history_tokens,
            max_memory_chars: config.history.max_memory_chars,
            user_name: config.user_name.clone(),
            default_limits: config.model_limits(&config.default_model),
        }
    }
}

/// The prompt engine. Stateless; create one and reuse it.
#[derive(Debug, Clone)]
pub struct PromptEngine {
    options: EngineOptions,
    allocator: LoreBudgetAllocator,
    assembler: PromptAssembler,
}

impl Default for PromptEngine {
    fn default() -> Self {
        Self::new(EngineOptions::default())
    }
}

impl PromptEngine {
    pub fn new(options: EngineOptions) -> Self {
        Self {
            allocator: LoreBudgetAllocator::new(options.max_entries),
            assembler: PromptAssembler::new(options.max_history_tokens),
            options,
        }
    }

    pub fn from_config(config: &AppConfig) -> Self {
        Self::new(EngineOptions::from(config))
    }

    pub fn options(&self) -> &EngineOptions {
        &self.options
    }

    /// Build with a [`SeededGate`] from `request.seed`, or from entropy when
    /// the request has no seed.
    pub fn build_seeded(&self, request: &PromptRequest) -> Result<PromptResult, PromptError> {
        let mut gate = match request.seed {
            Some(seed) => SeededGate::new(seed),
            None => SeededGate::from_entropy(),
        };
        self.build(request, &mut gate)
    }

    /// Build the prompt for one turn.
    ///
    /// Lore problems are reported in `warnings`; only budget exhaustion is
    /// an error.
    pub fn build(
        &self,
        request: &PromptRequest,
        gate: &mut dyn ProbabilityGate,
    ) -> Result<PromptResult, PromptError> {
        let limits = request.model_limits.unwrap_or(self.options.default_limits);
        let user_name = request
            .user_name
            .as_deref()
            .filter(|n| !n.trim().is_empty())
            .unwrap_or(&self.options.user_name);
        let char_name = request.character.display_name();

        // ── Fixed system content ───────────────────────────────────────────
        let summary = persona::render_summary(request.history_summary.as_deref());
        let system = SystemContext {
            character: persona::render_character_block(&request.character, user_name),
            summary: summary.clone(),
            memories: persona::render_memories(&request.memories, self.options.max_memory_chars),
            modules: request
                .system_modules
                .iter()
                .map(|m| persona::apply_macros(m, char_name, user_name))
                .collect(),
        };

        let lore_room = self
            .assembler
            .lore_room(&system, &request.new_user_message, &limits)?;
        let lore_budget = self.options.lore_token_budget.min(lore_room);
        debug!(
            total_budget = limits.total_budget(),
            lore_room, lore_budget, "Budget reserved"
        );

        // ── Match ──────────────────────────────────────────────────────────
        let entries = request
            .lorebook
            .as_ref()
            .map(Lorebook::active_entries)
            .unwrap_or(&[]);
        let matcher = LoreMatcher::new(MatchOptions {
            scan_depth: request.scan_depth.unwrap_or(self.options.scan_depth),
            max_recursion_depth: self.options.max_recursion_depth,
            vector_min_score: self.options.vector_min_score,
        });
        let outcome = matcher.match_entries(
            entries,
            &request.history,
            &request.new_user_message,
            &request.vector_hits,
            gate,
        );
        debug!(
            entries = entries.len(),
            candidates = outcome.candidates.len(),
            "Lore matched"
        );

        // ── Allocate ───────────────────────────────────────────────────────
        let allocation = self
            .allocator
            .allocate(&outcome.candidates, lore_budget as i64);

        // ── Assemble ───────────────────────────────────────────────────────
        let assembled = self.assembler.assemble(&AssemblyInput {
            system: &system,
            lore: &allocation.blocks,
            history: &request.history,
            user_message: &request.new_user_message,
            limits,
        })?;

        // ── Summarize ──────────────────────────────────────────────────────
        let token_stats =
            TokenAccountant::summarize(&assembled, &allocation, &limits, summary.as_deref());

        let mut warnings = request.ingestion_warnings.clone();
        warnings.extend(outcome.warnings);

        debug!(
            system = token_stats.system,
            user = token_stats.user,
            history = token_stats.history,
            lore = token_stats.lore_budget,
            budget_left = token_stats.budget_left,
            "Prompt built"
        );

        Ok(PromptResult {
            system_prompt: assembled.system_prompt,
            messages: assembled.messages,
            triggered_entries: allocation.selected,
            lore_block_preview: allocation.blocks.render_preview(),
            lore_blocks: allocation.blocks,
            token_stats,
            warnings,
        })
    }
}
