//! Lore budget allocation.
//!
//! Greedy packing of matched entries into the lore token budget. Constant
//! entries are placed first; the rest follow in candidate order, and an entry
//! that does not fit is skipped rather than ending the pass, so a cheaper
//! lower-priority entry can still use the remaining space.

use crate::context::token;
use crate::lore::matcher::LoreCandidate;
use loreweave_core::lorebook::{LorePosition, TriggeredLoreEntry};
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

/// Separator placed between entries sharing a position.
pub const ENTRY_SEPARATOR: &str = "\n\n";

/// Tokens charged per entry on top of its content for the separator.
pub const SEPARATOR_OVERHEAD_TOKENS: usize = 2;

/// Selected lore text grouped by injection point.
///
/// This is the canonical form; [`LoreBlocks::render_preview`] is only a
/// display rendering of it.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct LoreBlocks {
    #[serde(default)]
    pub before_char: String,
    #[serde(default)]
    pub after_char: String,
    #[serde(default)]
    pub before_user: String,
    #[serde(default)]
    pub after_user: String,
}

impl LoreBlocks {
    pub fn get(&self, position: LorePosition) -> &str {
        match position {
            LorePosition::BeforeChar => &self.before_char,
            LorePosition::AfterChar => &self.after_char,
            LorePosition::BeforeUser => &self.before_user,
            LorePosition::AfterUser => &self.after_user,
        }
    }

    fn slot_mut(&mut self, position: LorePosition) -> &mut String {
        match position {
            LorePosition::BeforeChar => &mut self.before_char,
            LorePosition::AfterChar => &mut self.after_char,
            LorePosition::BeforeUser => &mut self.before_user,
            LorePosition::AfterUser => &mut self.after_user,
        }
    }

    /// Append an entry's content to its position's block.
    pub fn push(&mut self, position: LorePosition, content: &str) {
        let slot = self.slot_mut(position);
        if !slot.is_empty() {
            slot.push_str(ENTRY_SEPARATOR);
        }
        slot.push_str(content);
    }

    pub fn is_empty(&self) -> bool {
        LorePosition::ALL.iter().all(|p| self.get(*p).is_empty())
    }

    /// Human-readable rendering, one labelled section per non-empty position.
    pub fn render_preview(&self) -> String {
        LorePosition::ALL
            .iter()
            .filter(|p| !self.get(**p).is_empty())
            .map(|p| format!("[{}]\n{}", p.as_str(), self.get(*p)))
            .collect::<Vec<_>>()
            .join("\n\n")
    }
}

/// Outcome of one allocation pass.
#[derive(Debug, Clone, Default)]
pub struct LoreAllocation {
    /// Accepted entries, in candidate (priority) order.
    pub selected: Vec<TriggeredLoreEntry>,
    /// Tokens charged for the accepted entries, separators included.
    pub spent: usize,
    pub blocks: LoreBlocks,
}

/// The lore budget allocator.
#[derive(Debug, Clone)]
pub struct LoreBudgetAllocator {
    max_entries: usize,
}

impl Default for LoreBudgetAllocator {
    fn default() -> Self {
        Self { max_entries: 30 }
    }
}

impl LoreBudgetAllocator {
    pub fn new(max_entries: usize) -> Self {
        Self { max_entries }
    }

    /// Token cost charged for one entry.
    pub fn entry_cost(content: &str) -> usize {
        token::estimate_tokens(content) + SEPARATOR_OVERHEAD_TOKENS
    }

    /// Select entries from `candidates` (already sorted) within `budget` tokens.
    pub fn allocate(&self, candidates: &[LoreCandidate], budget: i64) -> LoreAllocation {
        if budget <= 0 || self.max_entries == 0 || candidates.is_empty() {
            debug!(budget, "Lore allocation skipped");
            return LoreAllocation::default();
        }
        let budget = budget as usize;

        let mut accepted = vec![false; candidates.len()];
        let mut spent = 0usize;
        let mut count = 0usize;

        // Constants first, then everything else in candidate order.
        for constant_pass in [true, false] {
            for (i, candidate) in candidates.iter().enumerate() {
                if candidate.entry.constant != constant_pass {
                    continue;
                }
                if count >= self.max_entries {
                    debug!(max_entries = self.max_entries, "Lore entry cap reached");
                    break;
                }

                let cost = Self::entry_cost(&candidate.entry.content);
                if spent + cost > budget {
                    if constant_pass {
                        warn!(entry = %candidate.entry.id, cost, budget, "Constant lore entry does not fit the lore budget");
                    }
                    continue;
                }

                accepted[i] = true;
                spent += cost;
                count += 1;
            }
        }

        let mut allocation = LoreAllocation {
            spent,
            ..Default::default()
        };
        for candidate in candidates
            .iter()
            .zip(&accepted)
            .filter_map(|(c, ok)| ok.then_some(c))
        {
            let entry = &candidate.entry;
            allocation.blocks.push(entry.position, &entry.content);
            allocation.selected.push(TriggeredLoreEntry {
                id: entry.id.clone(),
                content: entry.content.clone(),
                kind: candidate.kind,
                title: entry.title(),
                priority: entry.priority,
            });
        }

        debug!(
            selected = allocation.selected.len(),
            candidates = candidates.len(),
            spent,
            budget,
            "Lore allocated"
        );
        allocation
    }
}
