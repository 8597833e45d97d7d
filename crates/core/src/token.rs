//! Token estimation utilities.
//!
//! Uses a character-based heuristic: ~4 characters per token.
//! Accurate within ~10% for BPE tokenizers on English text, which is
//! all the budget arithmetic in this workspace needs.

/// Estimate the token count for a string.
///
/// Heuristic: 1 token ≈ 4 characters. Rounds up.
pub fn estimate_tokens(text: &str) -> usize {
    if text.is_empty() {
        return 0;
    }
    text.chars().count().div_ceil(4)
}
