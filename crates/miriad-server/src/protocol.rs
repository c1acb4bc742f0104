// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: Apache-2.0
use serde::Deserialize;

// ─── Input frames ─────────────────────────────────────────────────────────────

/// One parsed line of standard input.
#[derive(Debug, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum InputFrame {
    User {
        message: IncomingMessage,
        #[serde(default)]
        session_id: Option<String>,
    },
    Control {
        action: ControlAction,
    },
}

#[derive(Debug, Deserialize)]
pub struct IncomingMessage {
    #[allow(dead_code)]
    pub role: String,
    pub content: IncomingContent,
}

/// String content is used verbatim; an array of blocks is flattened by
/// concatenating its text blocks (other block types are ignored).
#[derive(Debug, Deserialize)]
#[serde(untagged)]
pub enum IncomingContent {
    Text(String),
    Blocks(Vec<ContentBlock>),
}

#[derive(Debug, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum ContentBlock {
    Text { text: String },
    #[serde(other)]
    Other,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ControlAction {
    Interrupt,
    Status,
}

impl IncomingMessage {
    /// Flatten the content into the prompt string.
    pub fn flatten(&self) -> String {
        match &self.content {
            IncomingContent::Text(t) => t.clone(),
            IncomingContent::Blocks(blocks) => blocks
                .iter()
                .filter_map(|b| match b {
                    ContentBlock::Text { text } => Some(text.as_str()),
                    ContentBlock::Other => None,
                })
                .collect::<Vec<_>>()
                .join(""),
        }
    }
}

// ─── Output frames ────────────────────────────────────────────────────────────

/// Builders for the NDJSON output frames.  One JSON object per line; the
/// writer task is the only place these get serialized.
pub mod frames {
    use miriad_model::Usage;
    use serde_json::{json, Value};

    pub fn assistant_text(model: &str, text: &str) -> Value {
        json!({
            "type": "assistant",
            "message": {
                "role": "assistant",
                "content": [{ "type": "text", "text": text }],
                "model": model,
            },
        })
    }

    pub fn assistant_tool_use(model: &str, call_id: &str, name: &str, input: &Value) -> Value {
        json!({
            "type": "assistant",
            "message": {
                "role": "assistant",
                "content": [{
                    "type": "tool_use",
                    "id": call_id,
                    "name": name,
                    "input": input,
                }],
                "model": model,
            },
        })
    }

    pub fn tool_result(call_id: &str, content: &str, is_error: bool) -> Value {
        json!({
            "type": "system",
            "subtype": "tool_result",
            "tool_use_id": call_id,
            "content": content,
            "is_error": is_error,
        })
    }

    pub fn queued(position: usize) -> Value {
        json!({ "type": "system", "subtype": "queued", "position": position })
    }

    pub fn injected(message_count: usize, content_length: usize) -> Value {
        json!({
            "type": "system",
            "subtype": "injected",
            "message_count": message_count,
            "content_length": content_length,
        })
    }

    pub fn interrupted() -> Value {
        json!({ "type": "system", "subtype": "interrupted" })
    }

    pub fn status(state: &str, queue_length: usize, session_id: &str) -> Value {
        json!({
            "type": "system",
            "subtype": "status",
            "state": state,
            "queue_length": queue_length,
            "session_id": session_id,
        })
    }

    pub fn error(message: &str) -> Value {
        json!({ "type": "system", "subtype": "error", "message": message })
    }

    pub fn consolidation(
        tokens_before: usize,
        tokens_after: usize,
        summaries_created: usize,
    ) -> Value {
        json!({
            "type": "system",
            "subtype": "consolidation",
            "tokens_before": tokens_before,
            "tokens_after": tokens_after,
            "summaries_created": summaries_created,
        })
    }

    /// The single terminal frame of a turn.
    pub fn result(
        subtype: &str,
        duration_ms: u128,
        num_turns: u32,
        session_id: &str,
        result_text: Option<&str>,
        usage: Usage,
    ) -> Value {
        let mut frame = json!({
            "type": "result",
            "subtype": subtype,
            "duration_ms": duration_ms as u64,
            "is_error": subtype == "error",
            "num_turns": num_turns,
            "session_id": session_id,
            "result": result_text,
        });
        if !usage.is_zero() {
            frame["usage"] = json!({
                "input_tokens": usage.input_tokens,
                "output_tokens": usage.output_tokens,
            });
        }
        frame
    }
}

// ─── Unit tests ──────────────────────────────────────────────────────────────
