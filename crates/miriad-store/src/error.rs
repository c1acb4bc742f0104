// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: Apache-2.0
use thiserror::Error;

/// Errors surfaced by the storage layer.
///
/// `NotFound` / `Archived` / `Conflict` carry enough detail for the LTM tools
/// to hand the model an actionable error payload without re-reading the row.
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("not found: {0}")]
    NotFound(String),

    #[error("entry is archived: {0}")]
    Archived(String),

    #[error("version conflict: expected {expected}, actual {actual}")]
    Conflict { expected: i64, actual: i64 },

    #[error("invalid: {0}")]
    Invalid(String),

    #[error(transparent)]
    Db(#[from] rusqlite::Error),

    #[error(transparent)]
    Json(#[from] serde_json::Error),
}

pub type Result<T> = std::result::Result<T, StoreError>;

// ─── Unit tests ──────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn conflict_message_names_both_versions() {
        let e = StoreError::Conflict {
            expected: 1,
            actual: 3,
        };
        let msg = e.to_string();
        assert!(msg.contains("expected 1"));
        assert!(msg.contains("actual 3"));
    }

    #[test]
    fn not_found_names_the_key() {
        let e = StoreError::NotFound("identity".into());
        assert!(e.to_string().contains("identity"));
    }
}
