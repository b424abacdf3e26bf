//! Lore matching: decides which entries trigger for the current turn.
//!
//! # Pipeline
//!
//! 1. Build the scan text from the last `scan_depth` history messages plus the
//!    new user message.
//! 2. Exclude entries whose keys match that base text are suppressed.
//! 3. Passes run every strategy over the still-pending entries. Constant
//!    entries trigger on the first pass without a keyword scan. Each hit is
//!    gated once by the [`ProbabilityGate`]; entries that pass contribute
//!    their content to the scan text, so later passes can chain off them.
//! 4. Passes stop when one triggers nothing new or after
//!    `1 + max_recursion_depth` passes.
//! 5. Candidates are sorted by priority (desc), order (asc), list position.
//!
//! A malformed regex key is skipped with a warning; the rest of the entry's
//! keys and every other entry are still matched.

use crate::lore::gate::ProbabilityGate;
use loreweave_core::error::{LoreError, LoreWarning};
use loreweave_core::lorebook::{LoreEntry, MatchKind, VectorHit};
use loreweave_core::message::Message;
use regex::{Regex, RegexBuilder};
use std::cmp::Reverse;
use std::collections::HashMap;
use tracing::{debug, warn};

// ── Types ─────────────────────────────────────────────────────────────────

/// Matching settings for one turn.
#[derive(Debug, Clone)]
pub struct MatchOptions {
    /// Recent history messages included in the scan text.
    pub scan_depth: usize,
    /// Extra passes over text contributed by triggered entries.
    pub max_recursion_depth: usize,
    /// Vector hits scoring below this are ignored.
    pub vector_min_score: f32,
}

impl Default for MatchOptions {
    fn default() -> Self {
        Self {
            scan_depth: 5,
            max_recursion_depth: 5,
            vector_min_score: 0.0,
        }
    }
}

/// The text keys are searched in, kept in original and lowercase form.
#[derive(Debug, Clone, Default)]
pub struct ScanText {
    raw: String,
    lowered: String,
}

impl ScanText {
    /// Scan text for the last `depth` history messages and the new message.
    pub fn build(history: &[Message], new_message: &str, depth: usize) -> Self {
        let start = history.len().saturating_sub(depth);
        let mut text = Self::default();
        for message in &history[start..] {
            text.push(&message.content);
        }
        text.push(new_message);
        text
    }

    pub fn push(&mut self, content: &str) {
        if !self.raw.is_empty() {
            self.raw.push('\n');
            self.lowered.push('\n');
        }
        self.raw.push_str(content);
        self.lowered.push_str(&content.to_lowercase());
    }

    pub fn raw(&self) -> &str {
        &self.raw
    }

    pub fn lowered(&self) -> &str {
        &self.lowered
    }
}

/// A single strategy hit on an entry.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct StrategyHit {
    pub matched_keys: Vec<String>,
    pub score: Option<f32>,
}

/// A pluggable way of deciding that an entry is relevant.
pub trait MatchStrategy {
    fn kind(&self) -> MatchKind;

    /// `index` is the entry's position in the slice being matched.
    fn matches(&self, index: usize, entry: &LoreEntry, text: &ScanText) -> Option<StrategyHit>;
}

/// An entry that triggered and passed its probability gate.
#[derive(Debug, Clone)]
pub struct LoreCandidate {
    pub entry: LoreEntry,
    pub matched_keys: Vec<String>,
    pub kind: MatchKind,
    /// Similarity from the vector scorer, for vector hits.
    pub score: Option<f32>,
    /// Position in the input list, the final tie-break.
    pub index: usize,
}

/// Result of a match pass.
#[derive(Debug, Clone, Default)]
pub struct MatchOutcome {
    /// Sorted by priority desc, order asc, input position asc.
    pub candidates: Vec<LoreCandidate>,
    pub warnings: Vec<LoreWarning>,
}

// ── Keyword strategy ──────────────────────────────────────────────────────

#[derive(Debug)]
enum KeyRule {
    Plain {
        key: String,
        needle: String,
        case_sensitive: bool,
        whole_word: bool,
    },
    Pattern {
        key: String,
        regex: Regex,
    },
}

impl KeyRule {
    fn key(&self) -> &str {
        match self {
            Self::Plain { key, .. } | Self::Pattern { key, .. } => key,
        }
    }

    fn is_match(&self, text: &ScanText) -> bool {
        match self {
            Self::Pattern { regex, .. } => regex.is_match(text.raw()),
            Self::Plain {
                needle,
                case_sensitive,
                whole_word,
                ..
            } => {
                if needle.is_empty() {
                    return false;
                }
                let haystack = if *case_sensitive {
                    text.raw()
                } else {
                    text.lowered()
                };
                if *whole_word {
                    contains_word(haystack, needle)
                } else {
                    haystack.contains(needle.as_str())
                }
            }
        }
    }
}

fn is_word_char(c: char) -> bool {
    c.is_alphanumeric() || c == '_'
}

/// Substring search requiring non-word characters (or text edges) around the hit.
fn contains_word(haystack: &str, needle: &str) -> bool {
    if needle.is_empty() {
        return false;
    }
    haystack.match_indices(needle).any(|(start, hit)| {
        let before = haystack[..start].chars().next_back();
        let after = haystack[start + hit.len()..].chars().next();
        !before.is_some_and(is_word_char) && !after.is_some_and(is_word_char)
    })
}

/// Keyword rules compiled once per turn for a list of entries.
#[derive(Debug)]
pub struct KeywordStrategy {
    rules: Vec<Vec<KeyRule>>,
}

impl KeywordStrategy {
    /// Compile every entry's keys. Malformed regex keys are dropped and reported.
    pub fn compile(entries: &[LoreEntry]) -> (Self, Vec<LoreError>) {
        let mut errors = Vec::new();
        let rules = entries
            .iter()
            .map(|entry| {
                entry
                    .keys
                    .iter()
                    .filter_map(|key| match Self::compile_key(entry, key) {
                        Ok(rule) => Some(rule),
                        Err(reason) => {
                            warn!(entry = %entry.id, key = %key, "Skipping lore key: {reason}");
                            errors.push(LoreError::invalid(
                                &entry.id,
                                format!("invalid regex key '{key}': {reason}"),
                            ));
                            None
                        }
                    })
                    .collect()
            })
            .collect();
        (Self { rules }, errors)
    }

    fn compile_key(entry: &LoreEntry, key: &str) -> Result<KeyRule, String> {
        if entry.use_regex {
            let pattern = if entry.match_whole_word {
                format!(r"\b(?:{key})\b")
            } else {
                key.to_string()
            };
            let regex = RegexBuilder::new(&pattern)
                .case_insensitive(!entry.case_sensitive)
                .build()
                .map_err(|e| e.to_string())?;
            return Ok(KeyRule::Pattern {
                key: key.to_string(),
                regex,
            });
        }

        let needle = if entry.case_sensitive {
            key.to_string()
        } else {
            key.to_lowercase()
        };
        Ok(KeyRule::Plain {
            key: key.to_string(),
            needle,
            case_sensitive: entry.case_sensitive,
            whole_word: entry.match_whole_word,
        })
    }
}

impl MatchStrategy for KeywordStrategy {
    fn kind(&self) -> MatchKind {
        MatchKind::Keyword
    }

    fn matches(&self, index: usize, _entry: &LoreEntry, text: &ScanText) -> Option<StrategyHit> {
        let matched_keys: Vec<String> = self
            .rules
            .get(index)?
            .iter()
            .filter(|rule| rule.is_match(text))
            .map(|rule| rule.key().to_string())
            .collect();

        if matched_keys.is_empty() {
            None
        } else {
            Some(StrategyHit {
                matched_keys,
                score: None,
            })
        }
    }
}

// ── Vector strategy ───────────────────────────────────────────────────────

/// Merges pre-scored semantic hits from an external scorer.
#[derive(Debug, Clone, Default)]
pub struct VectorStrategy {
    scores: HashMap<String, f32>,
}

impl VectorStrategy {
    /// Keep the best score per entry id, dropping hits below `min_score`.
    pub fn new(hits: &[VectorHit], min_score: f32) -> Self {
        let mut scores: HashMap<String, f32> = HashMap::new();
        for hit in hits.iter().filter(|h| h.score >= min_score) {
            scores
                .entry(hit.entry_id.clone())
                .and_modify(|s| *s = s.max(hit.score))
                .or_insert(hit.score);
        }
        Self { scores }
    }
}

impl MatchStrategy for VectorStrategy {
    fn kind(&self) -> MatchKind {
        MatchKind::Vector
    }

    fn matches(&self, _index: usize, entry: &LoreEntry, _text: &ScanText) -> Option<StrategyHit> {
        self.scores.get(&entry.id).map(|score| StrategyHit {
            matched_keys: Vec::new(),
            score: Some(*score),
        })
    }
}

// ── Matcher ───────────────────────────────────────────────────────────────

/// The lore matcher. Stateless; create one and reuse it.
#[derive(Debug, Clone, Default)]
pub struct LoreMatcher {
    options: MatchOptions,
}

impl LoreMatcher {
    pub fn new(options: MatchOptions) -> Self {
        Self { options }
    }

    pub fn options(&self) -> &MatchOptions {
        &self.options
    }

    /// Match with the built-in keyword and vector strategies.
    pub fn match_entries(
        &self,
        entries: &[LoreEntry],
        history: &[Message],
        new_message: &str,
        vector_hits: &[VectorHit],
        gate: &mut dyn ProbabilityGate,
    ) -> MatchOutcome {
        let (keyword, errors) = KeywordStrategy::compile(entries);
        let vector = VectorStrategy::new(vector_hits, self.options.vector_min_score);

        let strategies: [&dyn MatchStrategy; 2] = [&keyword, &vector];
        let mut outcome = self.match_with(entries, history, new_message, &strategies, gate);

        let mut warnings: Vec<LoreWarning> = errors.into_iter().map(LoreWarning::from).collect();
        warnings.append(&mut outcome.warnings);
        outcome.warnings = warnings;
        outcome
    }

    /// Match with caller-supplied strategies. Earlier strategies win when
    /// several hit the same entry in one pass.
    pub fn match_with(
        &self,
        entries: &[LoreEntry],
        history: &[Message],
        new_message: &str,
        strategies: &[&dyn MatchStrategy],
        gate: &mut dyn ProbabilityGate,
    ) -> MatchOutcome {
        let base = ScanText::build(history, new_message, self.options.scan_depth);
        let keyword_strategies: Vec<&dyn MatchStrategy> = strategies
            .iter()
            .copied()
            .filter(|s| s.kind() == MatchKind::Keyword)
            .collect();

        // Entries that can never trigger are resolved up front.
        let mut resolved: Vec<bool> = entries
            .iter()
            .map(|e| !e.enabled || e.content.is_empty())
            .collect();

        for (index, entry) in entries.iter().enumerate() {
            if resolved[index] || !entry.exclude {
                continue;
            }
            let suppressed = keyword_strategies
                .iter()
                .any(|s| s.matches(index, entry, &base).is_some());
            if suppressed {
                debug!(entry = %entry.id, "Lore entry suppressed by exclusion key");
                resolved[index] = true;
            }
        }

        let mut text = base;
        let mut candidates = Vec::new();
        let max_passes = self.options.max_recursion_depth + 1;

        for pass in 0..max_passes {
            let mut triggered: Vec<LoreCandidate> = Vec::new();

            for (index, entry) in entries.iter().enumerate() {
                if resolved[index] {
                    continue;
                }
                let Some((kind, hit)) = Self::first_hit(pass, index, entry, &text, strategies)
                else {
                    continue;
                };

                resolved[index] = true;
                if !gate.admits(entry.probability) {
                    debug!(entry = %entry.id, probability = entry.probability, "Lore entry failed probability gate");
                    continue;
                }
                triggered.push(LoreCandidate {
                    entry: entry.clone(),
                    matched_keys: hit.matched_keys,
                    kind,
                    score: hit.score,
                    index,
                });
            }

            if triggered.is_empty() {
                break;
            }
            for candidate in &triggered {
                text.push(&candidate.entry.content);
            }
            debug!(pass, count = triggered.len(), "Lore entries triggered");
            candidates.extend(triggered);
        }

        candidates.sort_by_key(|c| (Reverse(c.entry.priority), c.entry.order, c.index));

        MatchOutcome {
            candidates,
            warnings: Vec::new(),
        }
    }

    fn first_hit(
        pass: usize,
        index: usize,
        entry: &LoreEntry,
        text: &ScanText,
        strategies: &[&dyn MatchStrategy],
    ) -> Option<(MatchKind, StrategyHit)> {
        if entry.constant && pass == 0 {
            return Some((MatchKind::Keyword, StrategyHit::default()));
        }
        strategies
            .iter()
            // Exclude entries use their keys only as a negative filter.
            .filter(|s| !(entry.exclude && s.kind() == MatchKind::Keyword))
            .find_map(|s| s.matches(index, entry, text).map(|hit| (s.kind(), hit)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::lore::gate::{AlwaysTrigger, NeverTrigger, SeededGate};

    // ── Helpers ────────────────────────────────────────────────────────

    fn entry(id: &str, keys: &[&str], content: &str) -> LoreEntry {
        LoreEntry::new(id, keys, content)
    }

    fn ids(outcome: &MatchOutcome) -> Vec<&str> {
        outcome
            .candidates
            .iter()
            .map(|c| c.entry.id.as_str())
            .collect()
    }

    fn run(entries: &[LoreEntry], message: &str) -> MatchOutcome {
        LoreMatcher::default().match_entries(entries, &[], message, &[], &mut AlwaysTrigger)
    }

    // ── Tests ──────────────────────────────────────────────────────────

    #[test]
    fn keyword_in_message_triggers() {
        let entries = vec![entry("dragon", &["dragon"], "A dragon lives here")];
        let outcome = run(&entries, "Tell me about the dragon");
        assert_eq!(ids(&outcome), vec!["dragon"]);
        assert_eq!(outcome.candidates[0].kind, MatchKind::Keyword);
        assert_eq!(outcome.candidates[0].matched_keys, vec!["dragon"]);
    }

    #[test]
    fn matching_is_case_insensitive_by_default() {
        let entries = vec![entry("e", &["Dragon"], "lore")];
        assert_eq!(ids(&run(&entries, "a DRAGON appears")), vec!["e"]);
    }

    #[test]
    fn case_sensitive_flag_is_honored() {
        let mut e = entry("e", &["Dragon"], "lore");
        e.case_sensitive = true;
        assert!(run(&[e.clone()], "a dragon appears").candidates.is_empty());
        assert_eq!(ids(&run(&[e], "a Dragon appears")), vec!["e"]);
    }

    #[test]
    fn whole_word_requires_boundaries() {
        let mut e = entry("e", &["cat"], "lore");
        e.match_whole_word = true;
        assert!(run(&[e.clone()], "concatenate").candidates.is_empty());
        assert_eq!(ids(&run(&[e], "the cat, sleeping")), vec!["e"]);
    }

    #[test]
    fn any_key_is_enough() {
        let entries = vec![entry("e", &["wyrm", "drake"], "lore")];
        let outcome = run(&entries, "a drake flies");
        assert_eq!(outcome.candidates[0].matched_keys, vec!["drake"]);
    }

    #[test]
    fn regex_keys_match() {
        let mut e = entry("e", &[r"dra(g|k)on"], "lore");
        e.use_regex = true;
        assert_eq!(ids(&run(&[e], "DRAKON!")), vec!["e"]);
    }

    #[test]
    fn regex_keys_fold_unicode_case() {
        let mut e = entry("e", &["дракон"], "lore");
        e.use_regex = true;
        assert_eq!(ids(&run(&[e.clone()], "ДРАКОН пришёл")), vec!["e"]);

        e.case_sensitive = true;
        assert!(run(&[e], "ДРАКОН пришёл").candidates.is_empty());
    }

    #[test]
    fn whole_word_regex_handles_unicode() {
        let mut dragon = entry("dragon", &["龙"], "lore");
        dragon.use_regex = true;
        dragon.match_whole_word = true;
        assert_eq!(ids(&run(&[dragon], "龙 sleeps")), vec!["dragon"]);

        let mut cafe = entry("cafe", &["café"], "lore");
        cafe.use_regex = true;
        cafe.match_whole_word = true;
        assert_eq!(ids(&run(&[cafe.clone()], "meet at the café.")), vec!["cafe"]);
        assert!(run(&[cafe], "cafés open late").candidates.is_empty());

        let mut cat = entry("cat", &["cat"], "lore");
        cat.use_regex = true;
        cat.match_whole_word = true;
        assert!(run(&[cat], "concatenate").candidates.is_empty());
    }

    #[test]
    fn empty_plain_key_never_matches() {
        let entries = vec![entry("e", &[""], "lore")];
        assert!(run(&entries, "anything at all").candidates.is_empty());

        let mut exclude = entry("ex", &[""], "hidden");
        exclude.exclude = true;
        exclude.constant = true;
        assert_eq!(ids(&run(&[exclude], "hello")), vec!["ex"]);
    }

    #[test]
    fn malformed_regex_key_is_skipped_not_fatal() {
        let mut bad = entry("bad", &["(unclosed", "castle"], "lore");
        bad.use_regex = true;
        let good = entry("good", &["castle"], "more lore");
        let outcome = run(&[bad, good], "the castle gate");

        assert_eq!(ids(&outcome), vec!["bad", "good"]);
        assert_eq!(outcome.warnings.len(), 1);
        assert_eq!(outcome.warnings[0].entry_id, "bad");
    }

    #[test]
    fn disabled_entries_never_trigger() {
        let mut e = entry("e", &["dragon"], "lore");
        e.enabled = false;
        e.constant = true;
        assert!(run(&[e], "dragon dragon dragon").candidates.is_empty());
    }

    #[test]
    fn constant_entries_always_trigger() {
        let mut e = entry("always", &[], "The sky is green.");
        e.constant = true;
        let outcome = run(&[e], "nothing relevant");
        assert_eq!(ids(&outcome), vec!["always"]);
    }

    #[test]
    fn exclude_entry_with_matching_key_is_removed() {
        let mut e = entry("ex", &["spoiler"], "hidden twist");
        e.exclude = true;
        e.constant = true;
        assert!(run(&[e.clone()], "no spoiler please").candidates.is_empty());
        // Without a key hit the constant exclude entry stays.
        assert_eq!(ids(&run(&[e], "hello")), vec!["ex"]);
    }

    #[test]
    fn exclude_keys_never_trigger_positively() {
        let mut e = entry("ex", &["spoiler"], "hidden twist");
        e.exclude = true;
        assert!(run(&[e.clone()], "hello").candidates.is_empty());
        assert!(run(&[e], "spoiler").candidates.is_empty());
    }

    #[test]
    fn empty_content_is_ignored() {
        let entries = vec![entry("e", &["dragon"], "")];
        assert!(run(&entries, "dragon").candidates.is_empty());
    }

    #[test]
    fn scan_depth_limits_history() {
        let history = vec![
            Message::user("I saw a dragon"),
            Message::assistant("Really?"),
            Message::user("Yes"),
        ];
        let entries = vec![entry("e", &["dragon"], "lore")];

        let shallow = LoreMatcher::new(MatchOptions {
            scan_depth: 2,
            ..Default::default()
        });
        let deep = LoreMatcher::new(MatchOptions {
            scan_depth: 3,
            ..Default::default()
        });

        let out = shallow.match_entries(&entries, &history, "go on", &[], &mut AlwaysTrigger);
        assert!(out.candidates.is_empty());
        let out = deep.match_entries(&entries, &history, "go on", &[], &mut AlwaysTrigger);
        assert_eq!(ids(&out), vec!["e"]);
    }

    #[test]
    fn recursion_chains_through_triggered_content() {
        let entries = vec![
            entry("castle", &["castle"], "The castle is ruled by Queen Mab."),
            entry("mab", &["queen mab"], "Mab commands the fae."),
            entry("fae", &["fae"], "The fae fear iron."),
        ];
        let out = run(&entries, "We reach the castle");
        let mut got = ids(&out);
        got.sort();
        assert_eq!(got, vec!["castle", "fae", "mab"]);

        let flat = LoreMatcher::new(MatchOptions {
            max_recursion_depth: 0,
            ..Default::default()
        });
        let out = flat.match_entries(&entries, &[], "We reach the castle", &[], &mut AlwaysTrigger);
        assert_eq!(ids(&out), vec!["castle"]);
    }

    #[test]
    fn exclusion_uses_base_text_only() {
        let mut ex = entry("ex", &["iron"], "A secret");
        ex.exclude = true;
        ex.constant = true;
        let fae = entry("fae", &["fae"], "The fae fear iron.");
        let out = run(&[ex, fae], "tell me of the fae");
        let mut got = ids(&out);
        got.sort();
        assert_eq!(got, vec!["ex", "fae"]);
    }

    #[test]
    fn vector_hits_are_merged_and_tagged() {
        let entries = vec![
            entry("k", &["dragon"], "keyword lore"),
            entry("v", &["unrelated"], "semantic lore"),
            entry("low", &["nothing"], "weak lore"),
        ];
        let hits = vec![
            VectorHit { entry_id: "v".into(), score: 0.8 },
            VectorHit { entry_id: "low".into(), score: 0.1 },
            VectorHit { entry_id: "k".into(), score: 0.9 },
            VectorHit { entry_id: "ghost".into(), score: 0.99 },
        ];
        let matcher = LoreMatcher::new(MatchOptions {
            vector_min_score: 0.5,
            ..Default::default()
        });
        let out = matcher.match_entries(&entries, &[], "the dragon", &hits, &mut AlwaysTrigger);

        let kinds: Vec<(&str, MatchKind)> = out
            .candidates
            .iter()
            .map(|c| (c.entry.id.as_str(), c.kind))
            .collect();
        assert_eq!(
            kinds,
            vec![("k", MatchKind::Keyword), ("v", MatchKind::Vector)]
        );
        assert_eq!(out.candidates[1].score, Some(0.8));
    }

    #[test]
    fn probability_gate_filters_candidates() {
        let mut e = entry("e", &["dragon"], "lore");
        e.constant = true;
        let out = LoreMatcher::default().match_entries(&[e.clone()], &[], "dragon", &[], &mut NeverTrigger);
        assert!(out.candidates.is_empty());

        e.probability = 0;
        let out = LoreMatcher::default().match_entries(&[e], &[], "dragon", &[], &mut SeededGate::new(3));
        assert!(out.candidates.is_empty());
    }

    #[test]
    fn failed_gate_does_not_feed_recursion() {
        let mut first = entry("first", &["door"], "Beyond the door lies the vault.");
        first.probability = 0;
        let second = entry("second", &["vault"], "The vault is empty.");
        let out = LoreMatcher::default().match_entries(
            &[first, second],
            &[],
            "open the door",
            &[],
            &mut SeededGate::new(9),
        );
        assert!(out.candidates.is_empty());
    }

    #[test]
    fn candidates_sorted_by_priority_then_order_then_position() {
        let mut a = entry("a", &["x"], "a");
        a.priority = 1;
        let mut b = entry("b", &["x"], "b");
        b.priority = 5;
        b.order = 2;
        let mut c = entry("c", &["x"], "c");
        c.priority = 5;
        c.order = 1;
        let mut d = entry("d", &["x"], "d");
        d.priority = 5;
        d.order = 1;

        let out = run(&[a, b, c, d], "x");
        assert_eq!(ids(&out), vec!["c", "d", "b", "a"]);
    }

    #[test]
    fn contains_word_handles_unicode_neighbors() {
        assert!(contains_word("über cat.", "cat"));
        assert!(!contains_word("écat", "cat"));
        assert!(!contains_word("anything", ""));
    }
}
