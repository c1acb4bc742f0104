// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: MIT

/// Cheap character-based token estimate: 4 chars per token, floor of 1.
///
/// Used everywhere a budget decision is made (prompt assembly, compaction
/// triggering).  Deliberately tokenizer-free so estimates are stable across
/// providers; provider-reported usage is tracked separately per turn.
pub fn estimate_tokens(text: &str) -> usize {
    (text.len() / 4).max(1)
}

// ─── Unit tests ──────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn divides_by_four() {
        assert_eq!(estimate_tokens("12345678"), 2);
    }

    #[test]
    fn minimum_is_one() {
        assert_eq!(estimate_tokens("hi"), 1);
        assert_eq!(estimate_tokens(""), 1);
    }
}
