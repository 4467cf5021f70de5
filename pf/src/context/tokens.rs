//! Token estimation and budget-aware truncation
//!
//! No tokenizer dependency: a token is approximated as four characters,
//! which is close enough for budgeting prompts and output caps.

/// Characters per token used by the estimator
pub const CHARS_PER_TOKEN: usize = 4;

/// Approximate the token count of `text`
pub fn estimate_tokens(text: &str) -> u32 {
    let chars = text.chars().count();
    chars.div_ceil(CHARS_PER_TOKEN).min(u32::MAX as usize) as u32
}

/// Cut `text` to at most `max_chars` characters, marking the cut
pub fn truncate_chars(text: &str, max_chars: usize) -> String {
    if text.chars().count() <= max_chars {
        return text.to_string();
    }
    let mut cut: String = text.chars().take(max_chars).collect();
    // Prefer ending on a word boundary when one is reasonably close
    if let Some(space) = cut.rfind(char::is_whitespace)
        && space > cut.len() * 3 / 4
    {
        cut.truncate(space);
    }
    cut.push_str("...");
    cut
}

/// Cut `text` to roughly `max_tokens` tokens
pub fn truncate_to_tokens(text: &str, max_tokens: u32) -> String {
    truncate_chars(text, max_tokens as usize * CHARS_PER_TOKEN)
}

/// One-line preview of `text`: whitespace collapsed, capped at `max_chars`
pub fn preview(text: &str, max_chars: usize) -> String {
    let collapsed = text.split_whitespace().collect::<Vec<_>>().join(" ");
    truncate_chars(&collapsed, max_chars)
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn test_estimate_tokens_empty() {
        assert_eq!(estimate_tokens(""), 0);
    }

    #[test]
    fn test_estimate_tokens_rounds_up() {
        assert_eq!(estimate_tokens("abc"), 1);
        assert_eq!(estimate_tokens("abcd"), 1);
        assert_eq!(estimate_tokens("abcde"), 2);
    }

    #[test]
    fn test_estimate_tokens_counts_chars_not_bytes() {
        assert_eq!(estimate_tokens("ééééé"), 2);
    }

    #[test]
    fn test_truncate_chars_short_text_untouched() {
        assert_eq!(truncate_chars("hello", 10), "hello");
    }

    #[test]
    fn test_truncate_chars_marks_cut() {
        let out = truncate_chars("one two three four five six", 12);
        assert!(out.ends_with("..."));
        assert!(out.chars().count() <= 15);
    }

    #[test]
    fn test_preview_collapses_whitespace() {
        assert_eq!(preview("a\n\n  b\tc", 50), "a b c");
    }

    proptest! {
        #[test]
        fn prop_estimate_monotonic(a in ".{0,100}", b in ".{0,100}") {
            let joined = format!("{a}{b}");
            prop_assert!(estimate_tokens(&joined) >= estimate_tokens(&a));
        }

        #[test]
        fn prop_truncate_bounded(text in ".{0,300}", max in 1usize..100) {
            let out = truncate_chars(&text, max);
            prop_assert!(out.chars().count() <= max + 3);
        }
    }
}
