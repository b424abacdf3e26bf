//! Character block rendering.
//!
//! Turns a [`CharacterProfile`] into the fixed system instructions that open
//! every prompt. These sections are never trimmed; the assembler reserves
//! budget for them before anything else.

use loreweave_core::character::CharacterProfile;

/// Instruction template used unless the card overrides it.
const DEFAULT_TEMPLATE: &str = concat!(
    "You are {{char}}, a fictional character in an ongoing story with {{user}}. ",
    "Stay in character at all times and speak in the first person. ",
    "Never mention prompts, settings or instructions. ",
    "If {{user}} says something that contradicts the world, gently steer the story back inside it.",
);

pub const SUMMARY_HEADER: &str = "[Previous Story Summary]";
pub const MEMORY_HEADER: &str = "[Long-Term Memories]";

/// Replace `{{char}}` and `{{user}}` placeholders.
pub fn apply_macros(text: &str, char_name: &str, user_name: &str) -> String {
    text.replace("{{char}}", char_name)
        .replace("{{user}}", user_name)
}

/// Render the character's fixed system instructions.
pub fn render_character_block(character: &CharacterProfile, user_name: &str) -> String {
    let name = character.display_name();

    let template = if character.system_prompt_override.is_empty() {
        DEFAULT_TEMPLATE
    } else {
        character.system_prompt_override.as_str()
    };

    let tags = character.tags.join(", ");
    let sections: [(&str, &str); 6] = [
        ("Description", &character.description),
        ("Personality", &character.persona),
        ("Scenario", &character.scenario),
        ("Creator Notes", &character.creator_notes),
        ("Tags", &tags),
        ("Example Dialogue", &character.first_message),
    ];

    let mut parts = vec![template.to_string(), format!("Character: {name}")];
    parts.extend(
        sections
            .iter()
            .filter(|(_, body)| !body.trim().is_empty())
            .map(|(label, body)| format!("[{label}]\n{body}")),
    );

    apply_macros(&parts.join("\n\n"), name, user_name)
}

/// Render the rolling conversation summary, if any.
pub fn render_summary(summary: Option<&str>) -> Option<String> {
    summary
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(|s| format!("{SUMMARY_HEADER}\n{s}"))
}

/// Render long-term memories as a bullet list.
///
/// Memories are taken in order until their cumulative length would pass
/// `max_chars`.
pub fn render_memories(memories: &[String], max_chars: usize) -> Option<String> {
    let mut used = 0;
    let mut lines = Vec::new();

    for memory in memories.iter().map(|m| m.trim()).filter(|m| !m.is_empty()) {
        let len = memory.chars().count();
        if used + len > max_chars {
            break;
        }
        used += len;
        lines.push(format!("- {memory}"));
    }

    if lines.is_empty() {
        None
    } else {
        Some(format!("{MEMORY_HEADER}\n{}", lines.join("\n")))
    }
}
