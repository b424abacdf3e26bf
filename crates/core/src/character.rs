//! Character card domain types.
//!
//! [`CharacterRecord`] is the loose wire shape: it accepts the field spellings
//! used by card editors and Tavern-style imports. [`CharacterProfile`] is the
//! strongly-typed value the prompt engine reads. Unknown or legacy fields are
//! dropped during conversion and never reach the engine.

use serde::{Deserialize, Serialize};

/// An immutable character definition used for a single turn.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CharacterProfile {
    pub name: String,
    pub description: String,
    /// Personality and speaking style
    pub persona: String,
    pub scenario: String,
    /// Greeting / example dialogue shown to the model
    pub first_message: String,
    /// Replaces the default instruction template when non-empty
    pub system_prompt_override: String,
    pub creator_notes: String,
    pub tags: Vec<String>,
}

/// Loose character card as received from the persistence layer or a client.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct CharacterRecord {
    pub name: Option<String>,
    pub description: Option<String>,
    #[serde(alias = "personality")]
    pub persona: Option<String>,
    pub scenario: Option<String>,
    #[serde(alias = "firstMessage", alias = "first_mes")]
    pub first_message: Option<String>,
    #[serde(alias = "mes_example")]
    pub example_dialogue: Option<String>,
    #[serde(alias = "systemPromptOverride", alias = "system_prompt")]
    pub system_prompt_override: Option<String>,
    #[serde(alias = "creatorNotes")]
    pub creator_notes: Option<String>,
    pub tags: Option<Vec<String>>,
}

fn clean(value: Option<String>) -> String {
    value.map(|s| s.trim().to_string()).unwrap_or_default()
}

impl From<CharacterRecord> for CharacterProfile {
    fn from(record: CharacterRecord) -> Self {
        let first_message = match clean(record.first_message) {
            s if s.is_empty() => clean(record.example_dialogue),
            s => s,
        };
        let tags = record
            .tags
            .unwrap_or_default()
            .into_iter()
            .map(|t| t.trim().to_string())
            .filter(|t| !t.is_empty())
            .collect();

        Self {
            name: clean(record.name),
            description: clean(record.description),
            persona: clean(record.persona),
            scenario: clean(record.scenario),
            first_message,
            system_prompt_override: clean(record.system_prompt_override),
            creator_notes: clean(record.creator_notes),
            tags,
        }
    }
}

impl CharacterProfile {
    /// Display name, falling back to a neutral label for unnamed cards.
    pub fn display_name(&self) -> &str {
        if self.name.is_empty() {
            "Assistant"
        } else {
            &self.name
        }
    }
}
