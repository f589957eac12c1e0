//! Input normalization shared by every embedding provider.

/// Conservative character-per-token heuristic.
pub const CHARS_PER_TOKEN: usize = 4;

/// Token budget assumed when the model does not declare one.
pub const DEFAULT_MAX_TOKENS: usize = 8_192;

/// Normalize one embedding input: CRLF to LF, BOM stripped, truncated to the
/// token budget by the char-count heuristic; empty strings become a single
/// space so providers that reject empty input still line up with the batch.
#[must_use]
pub fn preprocess_text(input: &str, max_tokens: usize) -> Box<str> {
    let without_bom = input.strip_prefix('\u{feff}').unwrap_or(input);
    let normalized = without_bom.replace("\r\n", "\n");

    let max_chars = max_tokens.saturating_mul(CHARS_PER_TOKEN);
    let truncated: String = if max_chars > 0 && normalized.chars().count() > max_chars {
        normalized.chars().take(max_chars).collect()
    } else {
        normalized
    };

    if truncated.is_empty() {
        " ".into()
    } else {
        truncated.into_boxed_str()
    }
}

/// Normalize a whole batch.
#[must_use]
pub fn preprocess_batch(inputs: &[Box<str>], max_tokens: usize) -> Vec<Box<str>> {
    inputs
        .iter()
        .map(|input| preprocess_text(input, max_tokens))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn crlf_becomes_lf() {
        assert_eq!(preprocess_text("a\r\nb", 100).as_ref(), "a\nb");
    }

    #[test]
    fn bom_is_stripped() {
        assert_eq!(preprocess_text("\u{feff}abc", 100).as_ref(), "abc");
    }

    #[test]
    fn empty_input_becomes_one_space() {
        assert_eq!(preprocess_text("", 100).as_ref(), " ");
    }

    #[test]
    fn long_input_is_truncated_by_char_budget() {
        let input = "x".repeat(100);
        let output = preprocess_text(&input, 10);
        assert_eq!(output.chars().count(), 10 * CHARS_PER_TOKEN);
    }

    #[test]
    fn truncation_counts_chars_not_bytes() {
        let input = "é".repeat(100);
        let output = preprocess_text(&input, 1);
        assert_eq!(output.chars().count(), CHARS_PER_TOKEN);
    }
}
