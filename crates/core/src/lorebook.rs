//! Lorebook domain types.
//!
//! A lorebook is a named collection of keyword- or semantically-triggered
//! snippets injected into the prompt when relevant. Like characters, entries
//! arrive as loose [`LoreEntryRecord`]s and are validated into [`LoreEntry`]
//! at the ingestion boundary; entries that fail validation are skipped with a
//! [`LoreError`] rather than failing the whole book.

use crate::error::LoreError;
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::str::FromStr;

/// Default priority for entries that do not specify one.
pub const DEFAULT_PRIORITY: i32 = 10;

/// Where a triggered entry's text is spliced into the prompt.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LorePosition {
    #[default]
    BeforeChar,
    AfterChar,
    BeforeUser,
    AfterUser,
}

impl LorePosition {
    pub const ALL: [LorePosition; 4] = [
        Self::BeforeChar,
        Self::AfterChar,
        Self::BeforeUser,
        Self::AfterUser,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::BeforeChar => "before_char",
            Self::AfterChar => "after_char",
            Self::BeforeUser => "before_user",
            Self::AfterUser => "after_user",
        }
    }
}

impl FromStr for LorePosition {
    type Err = String;

    /// Accepts `before_char`, `beforeChar`, `BEFORE-CHAR` and friends.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let normalized: String = s
            .chars()
            .filter(|c| !matches!(c, '_' | '-' | ' '))
            .flat_map(char::to_lowercase)
            .collect();
        match normalized.as_str() {
            "beforechar" => Ok(Self::BeforeChar),
            "afterchar" => Ok(Self::AfterChar),
            "beforeuser" => Ok(Self::BeforeUser),
            "afteruser" => Ok(Self::AfterUser),
            _ => Err(format!("unknown position '{s}'")),
        }
    }
}

/// A validated lore entry.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LoreEntry {
    pub id: String,
    /// Trigger keywords, trimmed and de-duplicated
    pub keys: BTreeSet<String>,
    pub content: String,
    /// Editor label; used as the display title when present
    pub comment: String,
    pub enabled: bool,
    /// Higher = more important
    pub priority: i32,
    /// Manual ordering within the same priority (ascending)
    pub order: i32,
    pub position: LorePosition,
    /// Always a candidate, regardless of keyword match
    pub constant: bool,
    pub use_regex: bool,
    pub case_sensitive: bool,
    pub match_whole_word: bool,
    /// A key match suppresses the entry instead of triggering it
    pub exclude: bool,
    /// Inclusion chance in percent, 0..=100
    pub probability: u8,
}

impl LoreEntry {
    /// A plain enabled keyword entry with default settings.
    pub fn new(id: impl Into<String>, keys: &[&str], content: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            keys: keys.iter().map(|k| k.to_string()).collect(),
            content: content.into(),
            comment: String::new(),
            enabled: true,
            priority: DEFAULT_PRIORITY,
            order: 0,
            position: LorePosition::default(),
            constant: false,
            use_regex: false,
            case_sensitive: false,
            match_whole_word: false,
            exclude: false,
            probability: 100,
        }
    }

    /// Human-readable label: the comment, else the first key, else the id.
    pub fn title(&self) -> String {
        if !self.comment.is_empty() {
            return self.comment.clone();
        }
        self.keys
            .iter()
            .next()
            .cloned()
            .unwrap_or_else(|| self.id.clone())
    }
}

/// A validated lorebook.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Lorebook {
    pub id: String,
    pub name: String,
    /// Master switch; a disabled book contributes no entries
    pub enabled: bool,
    pub entries: Vec<LoreEntry>,
}

impl Lorebook {
    /// Validate a loose record. Invalid entries are dropped and reported.
    pub fn from_record(record: LorebookRecord) -> (Self, Vec<LoreError>) {
        let mut entries = Vec::with_capacity(record.entries.len());
        let mut errors = Vec::new();

        for (idx, raw) in record.entries.into_iter().enumerate() {
            match LoreEntry::try_from_record(raw, idx) {
                Ok(entry) => entries.push(entry),
                Err(err) => {
                    tracing::warn!(book = %record.id, "Skipping lore entry: {err}");
                    errors.push(err);
                }
            }
        }

        let book = Self {
            id: record.id,
            name: record.name,
            enabled: record.enabled,
            entries,
        };
        (book, errors)
    }

    /// Entries eligible for matching: none when the book is disabled.
    pub fn active_entries(&self) -> &[LoreEntry] {
        if self.enabled {
            self.entries.as_slice()
        } else {
            &[]
        }
    }
}

// ── Ingestion records ─────────────────────────────────────────────────────

fn default_true() -> bool {
    true
}

/// Loose lorebook shape as received over the wire.
#[derive(Debug, Clone, Deserialize)]
pub struct LorebookRecord {
    #[serde(default)]
    pub id: String,
    #[serde(default)]
    pub name: String,
    #[serde(default = "default_true", alias = "is_active")]
    pub enabled: bool,
    #[serde(default)]
    pub entries: Vec<LoreEntryRecord>,
}

/// Loose lore entry shape. Accepts camelCase and snake_case flag names and
/// the legacy single `key` / `keywords` fields.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct LoreEntryRecord {
    pub id: Option<String>,
    pub key: Option<String>,
    pub keys: Vec<String>,
    pub keywords: Vec<String>,
    pub content: String,
    pub comment: Option<String>,
    pub enabled: Option<bool>,
    pub priority: Option<i32>,
    pub order: Option<i32>,
    pub position: Option<String>,
    pub constant: bool,
    #[serde(alias = "useRegex")]
    pub use_regex: bool,
    #[serde(alias = "caseSensitive")]
    pub case_sensitive: bool,
    #[serde(alias = "matchWholeWord")]
    pub match_whole_word: bool,
    pub exclude: bool,
    pub probability: Option<i64>,
}

impl LoreEntry {
    /// Validate a record. `index` names entries that arrive without an id.
    pub fn try_from_record(record: LoreEntryRecord, index: usize) -> Result<Self, LoreError> {
        let id = record
            .id
            .filter(|s| !s.trim().is_empty())
            .unwrap_or_else(|| format!("entry-{index}"));

        let position = match record.position.as_deref().map(str::trim) {
            None | Some("") => LorePosition::default(),
            Some(raw) => raw
                .parse::<LorePosition>()
                .map_err(|reason| LoreError::invalid(&id, reason))?,
        };

        let keys = record
            .key
            .into_iter()
            .chain(record.keys)
            .chain(record.keywords)
            .map(|k| k.trim().to_string())
            .filter(|k| !k.is_empty())
            .collect();

        Ok(Self {
            id,
            keys,
            content: record.content.trim().to_string(),
            comment: record.comment.unwrap_or_default().trim().to_string(),
            enabled: record.enabled.unwrap_or(true),
            priority: record.priority.unwrap_or(DEFAULT_PRIORITY),
            order: record.order.unwrap_or(0),
            position,
            constant: record.constant,
            use_regex: record.use_regex,
            case_sensitive: record.case_sensitive,
            match_whole_word: record.match_whole_word,
            exclude: record.exclude,
            probability: record.probability.unwrap_or(100).clamp(0, 100) as u8,
        })
    }
}

// ── Output views ──────────────────────────────────────────────────────────

/// How an entry came to trigger.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MatchKind {
    Keyword,
    Vector,
}

/// A semantic match produced by an external scorer.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VectorHit {
    #[serde(alias = "entryId")]
    pub entry_id: String,
    pub score: f32,
}

/// What the caller renders for an injected entry.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TriggeredLoreEntry {
    pub id: String,
    pub content: String,
    #[serde(rename = "type")]
    pub kind: MatchKind,
    pub title: String,
    pub priority: i32,
}
