// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: Apache-2.0
use miriad_store::{select_cover, TemporalMessage, TemporalSummary};

/// Raw messages are clipped to this many characters in the rendered view.
const MESSAGE_CLIP_CHARS: usize = 500;

/// The bounded recent-history view shared by the prompt assembler and the
/// compaction agent.  Building it here once keeps the two consumers from
/// drifting apart.
#[derive(Debug, Clone)]
pub struct TemporalView {
    /// The cover set: non-overlapping highest-order summaries, chronological.
    pub summaries: Vec<TemporalSummary>,
    /// Selected recent messages (not covered by a summary), chronological.
    pub messages: Vec<TemporalMessage>,
    /// Text rendering with compaction-readable ids: `[id:…]` message
    /// prefixes and `[summary from:… to:…]` summary lines.
    pub rendering: String,
    pub token_estimate: usize,
}

/// Build the view: take the cover set, then walk uncovered messages newest
/// first while the accumulated token estimate stays within `temporal_budget`,
/// and reverse back to chronological order.
pub fn build_view(
    messages: &[TemporalMessage],
    summaries: &[TemporalSummary],
    temporal_budget: usize,
) -> TemporalView {
    let cover: Vec<TemporalSummary> = {
        let mut selected: Vec<TemporalSummary> =
            select_cover(summaries).into_iter().cloned().collect();
        selected.sort_by(|a, b| a.start_id.cmp(&b.start_id));
        selected
    };

    let mut selected_messages: Vec<TemporalMessage> = Vec::new();
    let mut budget_used = 0usize;
    for message in messages.iter().rev() {
        let covered = cover
            .iter()
            .any(|s| s.start_id <= message.id && message.id <= s.end_id);
        if covered {
            continue;
        }
        if budget_used + message.token_estimate > temporal_budget {
            break;
        }
        budget_used += message.token_estimate;
        selected_messages.push(message.clone());
    }
    selected_messages.reverse();

    let mut rendering = String::new();
    for summary in &cover {
        rendering.push_str(&format!(
            "[summary from:{} to:{}] {}\n",
            summary.start_id, summary.end_id, summary.narrative
        ));
        for observation in &summary.key_observations {
            rendering.push_str(&format!("  - {observation}\n"));
        }
    }
    for message in &selected_messages {
        rendering.push_str(&format!(
            "[id:{}] {}: {}\n",
            message.id,
            message.kind.as_str(),
            clip(&message.content)
        ));
    }

    let token_estimate =
        budget_used + cover.iter().map(|s| s.token_estimate).sum::<usize>();

    TemporalView {
        summaries: cover,
        messages: selected_messages,
        rendering,
        token_estimate,
    }
}

fn clip(content: &str) -> String {
    if content.chars().count() <= MESSAGE_CLIP_CHARS {
        return content.to_string();
    }
    let mut clipped: String = content.chars().take(MESSAGE_CLIP_CHARS).collect();
    clipped.push('…');
    clipped
}

// ─── Unit tests ──────────────────────────────────────────────────────────────
