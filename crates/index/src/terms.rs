//! Query term handling shared by the backends.

/// Lowercased alphanumeric terms of `text`, deduplicated, in first-seen order.
pub(crate) fn terms(text: &str) -> Vec<String> {
    let mut out: Vec<String> = Vec::new();
    for term in text
        .split(|c: char| !c.is_alphanumeric())
        .filter(|t| !t.is_empty())
        .map(str::to_lowercase)
    {
        if !out.contains(&term) {
            out.push(term);
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn splits_lowercases_and_dedupes() {
        assert_eq!(terms("Rust, rust & RUST-lang"), vec!["rust", "lang"]);
        assert!(terms("  ?! ").is_empty());
    }
}
