//! Token estimation utilities.
//!
//! Uses a character-class heuristic instead of a real tokenizer: CJK and
//! full-width characters cost 2 tokens, everything else half a token, the sum
//! is rounded up and one token of slack is added. The estimate is biased high
//! so that prompts are reported "too long" slightly early rather than
//! overflowing the model's window at generation time.

use loreweave_core::message::Message;
use serde::{Deserialize, Serialize};

/// Fixed per-message overhead for role names and chat-format delimiters.
pub const MESSAGE_OVERHEAD_TOKENS: usize = 4;

/// Identifies the estimator variant that produced a count.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EstimationMethod {
    #[default]
    ManualConservative,
}

impl EstimationMethod {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::ManualConservative => "manual_conservative",
        }
    }
}

/// The estimator in use by this build.
pub const ESTIMATION_METHOD: EstimationMethod = EstimationMethod::ManualConservative;

/// CJK ideographs, kana, Hangul syllables and full-width forms.
fn is_wide(c: char) -> bool {
    matches!(
        c,
        '\u{4E00}'..='\u{9FFF}'
            | '\u{3040}'..='\u{30FF}'
            | '\u{AC00}'..='\u{D7AF}'
            | '\u{FF00}'..='\u{FFEF}'
    )
}

/// Estimate the token count for a string.
///
/// Counted in half-tokens to stay in integer arithmetic.
pub fn estimate_tokens(text: &str) -> usize {
    if text.is_empty() {
        return 0;
    }
    let halves: usize = text.chars().map(|c| if is_wide(c) { 4 } else { 1 }).sum();
    halves.div_ceil(2) + 1
}

/// Estimate tokens for a single message including per-message overhead.
pub fn estimate_message_tokens(message: &Message) -> usize {
    MESSAGE_OVERHEAD_TOKENS + estimate_tokens(&message.content)
}

/// Estimate tokens for a slice of messages.
pub fn estimate_messages_tokens(messages: &[Message]) -> usize {
    messages.iter().map(estimate_message_tokens).sum()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_string_is_zero() {
        assert_eq!(estimate_tokens(""), 0);
    }

    #[test]
    fn single_ascii_char() {
        // ceil(0.5) + 1
        assert_eq!(estimate_tokens("a"), 2);
    }

    #[test]
    fn ascii_is_half_token_per_char() {
        assert_eq!(estimate_tokens(&"a".repeat(100)), 51);
        assert_eq!(estimate_tokens(&"a".repeat(101)), 52);
    }

    #[test]
    fn cjk_is_two_tokens_per_char() {
        assert_eq!(estimate_tokens("你好世界"), 9);
        assert_eq!(estimate_tokens("こんにちは"), 11);
        assert_eq!(estimate_tokens("안녕"), 5);
        assert_eq!(estimate_tokens("ＡＢ"), 5);
    }

    #[test]
    fn mixed_text_sums_both_classes() {
        // 1 CJK (2) + 3 ASCII (1.5) = 3.5 -> 4, +1
        assert_eq!(estimate_tokens("龙 is"), 5);
        // 2 CJK (4) + 3 ASCII (1.5) = 5.5 -> 6, +1
        assert_eq!(estimate_tokens("龙龙abc"), 7);
    }

    #[test]
    fn monotonic_in_length() {
        let mut last = 0;
        for n in 0..50 {
            let tokens = estimate_tokens(&"x".repeat(n));
            assert!(tokens >= last);
            last = tokens;
        }
    }

    #[test]
    fn concatenation_never_costs_more_than_parts() {
        let a = "The dragon sleeps";
        let b = "在山上";
        let joined = format!("{a}{b}");
        assert!(estimate_tokens(&joined) <= estimate_tokens(a) + estimate_tokens(b));
    }

    #[test]
    fn message_includes_overhead() {
        let msg = Message::user("test"); // 4 chars -> 2 + 1 = 3, + 4 overhead
        assert_eq!(estimate_message_tokens(&msg), 7);
    }

    #[test]
    fn multiple_messages() {
        let msgs = vec![Message::user("hello"), Message::assistant("world")];
        // each: ceil(2.5) + 1 = 4, + 4 overhead = 8
        assert_eq!(estimate_messages_tokens(&msgs), 16);
    }

    #[test]
    fn method_tag_is_stable() {
        assert_eq!(ESTIMATION_METHOD.as_str(), "manual_conservative");
        let json = serde_json::to_string(&ESTIMATION_METHOD).unwrap();
        assert_eq!(json, "\"manual_conservative\"");
    }
}
