// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: MIT
use async_trait::async_trait;
use serde_json::{json, Value};

use crate::Tool;

const READ_LIMIT: usize = 200_000;

/// Read a file as UTF-8 text, optionally a line window.
pub struct ReadFileTool;

#[async_trait]
impl Tool for ReadFileTool {
    fn name(&self) -> &str {
        "read_file"
    }

    fn description(&self) -> &str {
        "Read a text file. Optional `offset` (1-based line) and `limit` select a window."
    }

    fn parameters_schema(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "path": { "type": "string" },
                "offset": { "type": "integer", "minimum": 1 },
                "limit": { "type": "integer", "minimum": 1 }
            },
            "required": ["path"],
            "additionalProperties": false
        })
    }

    async fn execute(&self, args: &Value) -> anyhow::Result<String> {
        let path = args["path"]
            .as_str()
            .ok_or_else(|| anyhow::anyhow!("missing 'path'"))?;
        let bytes = tokio::fs::read(path).await?;
        let text = String::from_utf8_lossy(&bytes);

        let windowed = match (
            args.get("offset").and_then(|v| v.as_u64()),
            args.get("limit").and_then(|v| v.as_u64()),
        ) {
            (None, None) => text.to_string(),
            (offset, limit) => {
                let skip = offset.unwrap_or(1).saturating_sub(1) as usize;
                let take = limit.unwrap_or(u64::MAX) as usize;
                text.lines()
                    .skip(skip)
                    .take(take)
                    .collect::<Vec<_>>()
                    .join("\n")
            }
        };

        if windowed.len() > READ_LIMIT {
            let mut truncated = windowed[..READ_LIMIT].to_string();
            truncated.push_str("\n...[truncated]");
            return Ok(truncated);
        }
        Ok(windowed)
    }
}

// ─── Unit tests ──────────────────────────────────────────────────────────────
