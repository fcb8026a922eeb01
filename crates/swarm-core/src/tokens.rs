use serde::{Deserialize, Serialize};

/// Rough characters-per-token ratio used wherever exact counts are unavailable.
pub const CHARS_PER_TOKEN: usize = 4;

/// Token usage exactly as the provider reported it for one response.
///
/// `prompt_tokens` is cumulative: it covers the whole request context, not
/// just what was added since the previous turn.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Usage {
    #[serde(default)]
    pub prompt_tokens: u64,
    #[serde(default)]
    pub completion_tokens: u64,
    #[serde(default)]
    pub total_tokens: u64,
}

impl Usage {
    pub fn new(prompt_tokens: u64, completion_tokens: u64) -> Self {
        Self {
            prompt_tokens,
            completion_tokens,
            total_tokens: prompt_tokens + completion_tokens,
        }
    }
}

/// Estimate tokens for a character count.
pub fn estimate_chars(chars: usize) -> i64 {
    (chars / CHARS_PER_TOKEN) as i64
}

/// Estimate tokens for a string.
pub fn estimate_text(text: &str) -> i64 {
    estimate_chars(text.chars().count())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn usage_new_sums_total() {
        let u = Usage::new(100, 20);
        assert_eq!(u.total_tokens, 120);
    }

    #[test]
    fn usage_missing_fields_default_to_zero() {
        let u: Usage = serde_json::from_str(r#"{"prompt_tokens": 7}"#).unwrap();
        assert_eq!(u.prompt_tokens, 7);
        assert_eq!(u.completion_tokens, 0);
    }

    #[test]
    fn estimate_is_quarter_of_chars() {
        assert_eq!(estimate_text(""), 0);
        assert_eq!(estimate_text("abcd"), 1);
        assert_eq!(estimate_text("abcdefg"), 1);
        assert_eq!(estimate_chars(4000), 1000);
    }
}
