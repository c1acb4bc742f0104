// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: MIT
use async_trait::async_trait;
use serde_json::{json, Value};

use crate::Tool;

/// Replace an exact text fragment in a file.  The fragment must match
/// exactly once; ambiguous or missing matches are errors so the model
/// re-reads instead of corrupting the file.
pub struct EditFileTool;

#[async_trait]
impl Tool for EditFileTool {
    fn name(&self) -> &str {
        "edit_file"
    }

    fn description(&self) -> &str {
        "Replace one exact occurrence of `old_string` with `new_string` in a file."
    }

    fn parameters_schema(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "path": { "type": "string" },
                "old_string": { "type": "string" },
                "new_string": { "type": "string" }
            },
            "required": ["path", "old_string", "new_string"],
            "additionalProperties": false
        })
    }

    async fn execute(&self, args: &Value) -> anyhow::Result<String> {
        let path = args["path"]
            .as_str()
            .ok_or_else(|| anyhow::anyhow!("missing 'path'"))?;
        let old = args["old_string"]
            .as_str()
            .ok_or_else(|| anyhow::anyhow!("missing 'old_string'"))?;
        let new = args["new_string"]
            .as_str()
            .ok_or_else(|| anyhow::anyhow!("missing 'new_string'"))?;

        let text = tokio::fs::read_to_string(path).await?;
        let occurrences = text.matches(old).count();
        match occurrences {
            0 => anyhow::bail!("old_string not found in {path}"),
            1 => {}
            n => anyhow::bail!("old_string matches {n} times in {path}; make it unique"),
        }
        let updated = text.replacen(old, new, 1);
        tokio::fs::write(path, updated).await?;
        Ok(format!("edited {path}"))
    }
}

// ─── Unit tests ──────────────────────────────────────────────────────────────
