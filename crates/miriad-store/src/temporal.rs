// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: Apache-2.0
use rusqlite::params;
use serde::{Deserialize, Serialize};

use crate::{Result, Storage, StoreError};

/// What produced a temporal message.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MessageKind {
    User,
    Assistant,
    ToolCall,
    ToolResult,
}

impl MessageKind {
    pub fn as_str(self) -> &'static str {
        match self {
            MessageKind::User => "user",
            MessageKind::Assistant => "assistant",
            MessageKind::ToolCall => "tool_call",
            MessageKind::ToolResult => "tool_result",
        }
    }

    fn parse(s: &str) -> Result<Self> {
        match s {
            "user" => Ok(MessageKind::User),
            "assistant" => Ok(MessageKind::Assistant),
            "tool_call" => Ok(MessageKind::ToolCall),
            "tool_result" => Ok(MessageKind::ToolResult),
            other => Err(StoreError::Invalid(format!("unknown message kind: {other}"))),
        }
    }
}

/// One event in the append-only temporal log.  Never mutated, never deleted;
/// compaction covers ranges with summaries instead.
#[derive(Debug, Clone)]
pub struct TemporalMessage {
    pub id: String,
    pub kind: MessageKind,
    pub content: String,
    pub token_estimate: usize,
    pub created_at: String,
}

/// A summary covering an inclusive id range of the temporal log.
///
/// Order 1 summarises raw messages; order n+1 summarises at least one order-n
/// summary.  A summary subsumes any summary whose [start,end] lies inside its
/// own.
#[derive(Debug, Clone)]
pub struct TemporalSummary {
    pub id: String,
    pub order: u32,
    pub start_id: String,
    pub end_id: String,
    pub narrative: String,
    pub key_observations: Vec<String>,
    pub tags: Vec<String>,
    pub token_estimate: usize,
    pub created_at: String,
}

impl TemporalSummary {
    pub fn subsumes(&self, other: &TemporalSummary) -> bool {
        self.start_id <= other.start_id && other.end_id <= self.end_id
    }
}

impl Storage {
    /// Insert a message.  The id comes from the identifier service; the
    /// insert is individually atomic.
    pub fn append_message(&self, msg: &TemporalMessage) -> Result<()> {
        let conn = self.lock();
        conn.execute(
            "INSERT INTO temporal_messages (id, kind, content, token_estimate, created_at)
             VALUES (?1, ?2, ?3, ?4, ?5)",
            params![
                msg.id,
                msg.kind.as_str(),
                msg.content,
                msg.token_estimate as i64,
                msg.created_at,
            ],
        )?;
        Ok(())
    }

    /// All raw messages, ascending by id (= creation order).
    pub fn get_messages(&self) -> Result<Vec<TemporalMessage>> {
        let conn = self.lock();
        let mut stmt = conn.prepare(
            "SELECT id, kind, content, token_estimate, created_at
             FROM temporal_messages ORDER BY id",
        )?;
        let rows = stmt.query_map([], |row| {
            Ok((
                row.get::<_, String>(0)?,
                row.get::<_, String>(1)?,
                row.get::<_, String>(2)?,
                row.get::<_, i64>(3)?,
                row.get::<_, String>(4)?,
            ))
        })?;
        let mut messages = Vec::new();
        for row in rows {
            let (id, kind, content, tokens, created_at) = row?;
            messages.push(TemporalMessage {
                id,
                kind: MessageKind::parse(&kind)?,
                content,
                token_estimate: tokens as usize,
                created_at,
            });
        }
        Ok(messages)
    }

    /// Insert a summary.  Boundaries and ordering are validated by the
    /// compaction agent before this point; the storage layer only enforces
    /// the structural `start_id <= end_id` check.
    pub fn create_summary(&self, summary: &TemporalSummary) -> Result<()> {
        if summary.start_id > summary.end_id {
            return Err(StoreError::Invalid(format!(
                "summary range inverted: {} > {}",
                summary.start_id, summary.end_id
            )));
        }
        let conn = self.lock();
        conn.execute(
            "INSERT INTO temporal_summaries
             (id, summary_order, start_id, end_id, narrative, key_observations, tags,
              token_estimate, created_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)",
            params![
                summary.id,
                summary.order as i64,
                summary.start_id,
                summary.end_id,
                summary.narrative,
                serde_json::to_string(&summary.key_observations)?,
                serde_json::to_string(&summary.tags)?,
                summary.token_estimate as i64,
                summary.created_at,
            ],
        )?;
        Ok(())
    }

    /// All summaries, ascending by id.
    pub fn get_summaries(&self) -> Result<Vec<TemporalSummary>> {
        let conn = self.lock();
        let mut stmt = conn.prepare(
            "SELECT id, summary_order, start_id, end_id, narrative, key_observations, tags,
                    token_estimate, created_at
             FROM temporal_summaries ORDER BY id",
        )?;
        let rows = stmt.query_map([], |row| {
            Ok((
                row.get::<_, String>(0)?,
                row.get::<_, i64>(1)?,
                row.get::<_, String>(2)?,
                row.get::<_, String>(3)?,
                row.get::<_, String>(4)?,
                row.get::<_, String>(5)?,
                row.get::<_, String>(6)?,
                row.get::<_, i64>(7)?,
                row.get::<_, String>(8)?,
            ))
        })?;
        let mut summaries = Vec::new();
        for row in rows {
            let (id, order, start_id, end_id, narrative, observations, tags, tokens, created_at) =
                row?;
            summaries.push(TemporalSummary {
                id,
                order: order as u32,
                start_id,
                end_id,
                narrative,
                key_observations: serde_json::from_str(&observations)?,
                tags: serde_json::from_str(&tags)?,
                token_estimate: tokens as usize,
                created_at,
            });
        }
        Ok(summaries)
    }

    /// The tokens that would be sent in the next prompt: messages not covered
    /// by the maximal non-overlapping set of top-level summaries, plus those
    /// summaries themselves.
    pub fn estimate_uncompacted_tokens(&self) -> Result<usize> {
        let messages = self.get_messages()?;
        let summaries = self.get_summaries()?;
        let cover = select_cover(&summaries);

        let summary_tokens: usize = cover.iter().map(|s| s.token_estimate).sum();
        let message_tokens: usize = messages
            .iter()
            .filter(|m| !cover.iter().any(|s| s.start_id <= m.id && m.id <= s.end_id))
            .map(|m| m.token_estimate)
            .sum();

        Ok(summary_tokens + message_tokens)
    }
}

/// Select the maximal set of non-overlapping highest-order summaries.
///
/// A summary is a cover candidate when no other summary of higher order (or
/// equal order with a wider range) subsumes it.  Candidates are then chosen
/// greedily left-to-right, widest range first, skipping overlaps.  Readers
/// treat every message inside a selected range as covered.
pub fn select_cover(summaries: &[TemporalSummary]) -> Vec<&TemporalSummary> {
    let mut candidates: Vec<&TemporalSummary> = summaries
        .iter()
        .filter(|s| {
            !summaries.iter().any(|other| {
                !std::ptr::eq(*s, other)
                    && other.subsumes(s)
                    && (other.order > s.order
                        || (other.order == s.order && !s.subsumes(other)))
            })
        })
        .collect();

    candidates.sort_by(|a, b| {
        a.start_id
            .cmp(&b.start_id)
            .then(b.end_id.cmp(&a.end_id))
            .then(b.order.cmp(&a.order))
    });

    let mut selected: Vec<&TemporalSummary> = Vec::new();
    for candidate in candidates {
        let overlaps = selected
            .iter()
            .any(|s| candidate.start_id <= s.end_id && s.start_id <= candidate.end_id);
        if !overlaps {
            selected.push(candidate);
        }
    }
    selected
}

// ─── Unit tests ──────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{estimate_tokens, IdGenerator, IdPrefix};

    fn msg(id: &str, content: &str) -> TemporalMessage {
        TemporalMessage {
            id: id.into(),
            kind: MessageKind::User,
            content: content.into(),
            token_estimate: estimate_tokens(content),
            created_at: chrono::Utc::now().to_rfc3339(),
        }
    }

    fn summary(id: &str, order: u32, start: &str, end: &str, tokens: usize) -> TemporalSummary {
        TemporalSummary {
            id: id.into(),
            order,
            start_id: start.into(),
            end_id: end.into(),
            narrative: "n".into(),
            key_observations: vec![],
            tags: vec![],
            token_estimate: tokens,
            created_at: chrono::Utc::now().to_rfc3339(),
        }
    }

    #[test]
    fn append_and_read_back_in_order() {
        let storage = Storage::open_in_memory().unwrap();
        let ids = IdGenerator::new();
        for i in 0..5 {
            let id = ids.mint(IdPrefix::Message);
            storage
                .append_message(&msg(&id, &format!("message {i}")))
                .unwrap();
        }
        let messages = storage.get_messages().unwrap();
        assert_eq!(messages.len(), 5);
        let mut sorted = messages.clone();
        sorted.sort_by(|a, b| a.id.cmp(&b.id));
        assert_eq!(
            messages.iter().map(|m| &m.id).collect::<Vec<_>>(),
            sorted.iter().map(|m| &m.id).collect::<Vec<_>>()
        );
    }

    #[test]
    fn duplicate_message_id_is_rejected() {
        let storage = Storage::open_in_memory().unwrap();
        storage.append_message(&msg("message_01A", "x")).unwrap();
        assert!(storage.append_message(&msg("message_01A", "y")).is_err());
    }

    #[test]
    fn inverted_summary_range_is_rejected() {
        let storage = Storage::open_in_memory().unwrap();
        let s = summary("summary_01", 1, "message_09", "message_01", 3);
        assert!(matches!(
            storage.create_summary(&s),
            Err(StoreError::Invalid(_))
        ));
    }

    #[test]
    fn estimate_counts_all_messages_without_summaries() {
        let storage = Storage::open_in_memory().unwrap();
        storage.append_message(&msg("message_01", "aaaaaaaa")).unwrap(); // 2 tokens
        storage.append_message(&msg("message_02", "bbbbbbbb")).unwrap(); // 2 tokens
        assert_eq!(storage.estimate_uncompacted_tokens().unwrap(), 4);
    }

    #[test]
    fn covered_messages_are_replaced_by_summary_tokens() {
        let storage = Storage::open_in_memory().unwrap();
        storage.append_message(&msg("message_01", "aaaaaaaa")).unwrap(); // 2
        storage.append_message(&msg("message_02", "bbbbbbbb")).unwrap(); // 2
        storage.append_message(&msg("message_03", "cccccccc")).unwrap(); // 2
        storage
            .create_summary(&summary("summary_01", 1, "message_01", "message_02", 1))
            .unwrap();
        // summary(1) + uncovered message_03(2)
        assert_eq!(storage.estimate_uncompacted_tokens().unwrap(), 3);
    }

    #[test]
    fn higher_order_summary_wins_the_cover() {
        let s1 = summary("summary_01", 1, "message_01", "message_02", 5);
        let s2 = summary("summary_02", 1, "message_03", "message_04", 5);
        let s3 = summary("summary_03", 2, "message_01", "message_04", 2);
        let all = vec![s1, s2, s3];
        let cover = select_cover(&all);
        assert_eq!(cover.len(), 1);
        assert_eq!(cover[0].id, "summary_03");
    }

    #[test]
    fn disjoint_summaries_are_all_selected() {
        let s1 = summary("summary_01", 1, "message_01", "message_02", 5);
        let s2 = summary("summary_02", 1, "message_03", "message_04", 5);
        let all = vec![s1, s2];
        let cover = select_cover(&all);
        assert_eq!(cover.len(), 2);
    }

    #[test]
    fn overlapping_same_order_summaries_pick_one() {
        let s1 = summary("summary_01", 1, "message_01", "message_03", 5);
        let s2 = summary("summary_02", 1, "message_02", "message_04", 5);
        let all = vec![s1, s2];
        let cover = select_cover(&all);
        assert_eq!(cover.len(), 1, "overlapping covers must not double-count");
    }

    #[test]
    fn estimate_decreases_after_summary_insert() {
        let storage = Storage::open_in_memory().unwrap();
        let ids = IdGenerator::new();
        let mut minted = Vec::new();
        for _ in 0..10 {
            let id = ids.mint(IdPrefix::Message);
            storage
                .append_message(&msg(&id, &"long content here ".repeat(20)))
                .unwrap();
            minted.push(id);
        }
        let before = storage.estimate_uncompacted_tokens().unwrap();
        storage
            .create_summary(&summary(
                &ids.mint(IdPrefix::Summary),
                1,
                &minted[0],
                &minted[8],
                10,
            ))
            .unwrap();
        let after = storage.estimate_uncompacted_tokens().unwrap();
        assert!(after < before, "summary must reduce the estimate ({before} -> {after})");
    }
}
