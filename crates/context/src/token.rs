//! Token estimation utilities.
//!
//! Uses the character-based heuristic from [`parley_core::token`]: ~4
//! characters per token, rounded up. Turn and chunk token counts are computed
//! with the same function when they are created, so sums here never re-estimate.

use parley_core::{Chunk, Turn};

pub use parley_core::token::{estimate_tokens, max_chars_for};

/// Total tokens of a slice of turns.
pub fn estimate_turns_tokens(turns: &[Turn]) -> usize {
    turns.iter().map(|t| t.token_count()).sum()
}

/// Total tokens of a slice of chunks.
pub fn estimate_chunks_tokens(chunks: &[Chunk]) -> usize {
    chunks.iter().map(|c| c.token_count()).sum()
}

/// Cut `text` to at most `max_chars` characters on a char boundary.
pub fn truncate_chars(text: &str, max_chars: usize) -> String {
    match text.char_indices().nth(max_chars) {
        Some((byte_idx, _)) => text[..byte_idx].to_string(),
        None => text.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn hundred_chars() {
        let text = "a".repeat(100);
        assert_eq!(estimate_tokens(&text), 25);
    }

    #[test]
    fn multiple_turns() {
        let turns = vec![
            Turn::user(1, "hello"),     // 5 chars → 2 tokens
            Turn::assistant(2, "world"), // 5 chars → 2 tokens
        ];
        assert_eq!(estimate_turns_tokens(&turns), 4);
    }

    #[test]
    fn empty_chunks_is_zero() {
        assert_eq!(estimate_chunks_tokens(&[]), 0);
    }

    #[test]
    fn truncate_respects_char_boundaries() {
        assert_eq!(truncate_chars("héllo wörld", 7), "héllo w");
        assert_eq!(truncate_chars("short", 10), "short");
        assert_eq!(truncate_chars("anything", 0), "");
    }

    proptest! {
        #[test]
        fn estimate_is_monotonic_in_length(a in 0usize..2000, b in 0usize..2000) {
            let (short, long) = if a <= b { (a, b) } else { (b, a) };
            prop_assert!(estimate_tokens(&"x".repeat(short)) <= estimate_tokens(&"x".repeat(long)));
        }

        #[test]
        fn truncated_text_fits_its_token_budget(text in ".{0,400}", tokens in 0usize..60) {
            let cut = truncate_chars(&text, max_chars_for(tokens));
            prop_assert!(estimate_tokens(&cut) <= tokens);
        }
    }
}
