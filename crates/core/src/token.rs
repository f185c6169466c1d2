//! Token estimation.
//!
//! Character-based heuristic: ~4 characters per token, rounded up. Every
//! component that budgets tokens goes through [`estimate_tokens`].

/// Estimate the token count for a string.
///
/// `ceil(chars / 4)`, 0 for empty text. Counts Unicode scalar values, not bytes.
pub fn estimate_tokens(text: &str) -> usize {
    text.chars().count().div_ceil(4)
}

/// Maximum number of characters whose estimate fits within `tokens`.
pub fn max_chars_for(tokens: usize) -> usize {
    tokens.saturating_mul(4)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_string_is_zero() {
        assert_eq!(estimate_tokens(""), 0);
    }

    #[test]
    fn four_chars_is_one_token() {
        assert_eq!(estimate_tokens("test"), 1);
    }

    #[test]
    fn five_chars_rounds_up() {
        assert_eq!(estimate_tokens("hello"), 2);
    }

    #[test]
    fn counts_chars_not_bytes() {
        // 4 chars, 8 bytes
        assert_eq!(estimate_tokens("änöü"), 1);
    }

    #[test]
    fn max_chars_round_trips_through_estimate() {
        let text = "a".repeat(max_chars_for(7));
        assert_eq!(estimate_tokens(&text), 7);
    }
}
