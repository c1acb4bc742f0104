// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: MIT
use serde_json::Value;

/// Events emitted by the agent during a single turn.
/// Consumers (NDJSON server, batch runner) subscribe to these to drive their
/// output; every event that carries an `id` is also a temporal row.
#[derive(Debug, Clone)]
pub enum AgentEvent {
    /// A user message entered temporal memory (the turn prompt or an
    /// injected mid-turn message).
    User { id: String, content: String },
    /// The model produced assistant text.
    Assistant { id: String, content: String },
    /// The model requested a tool call.
    ToolCall {
        id: String,
        call_id: String,
        name: String,
        args: Value,
    },
    /// A tool call finished.
    ToolResult {
        id: String,
        call_id: String,
        name: String,
        content: String,
        is_error: bool,
    },
    /// A recoverable error the consumer should surface.
    Error { message: String },
    /// A compaction pass finished and rewrote the history view.
    Consolidation {
        tokens_before: usize,
        tokens_after: usize,
        summaries_created: usize,
    },
    /// The turn finished normally with its final response.
    Done { response: Option<String> },
}
