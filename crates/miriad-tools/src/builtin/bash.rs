// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: MIT
use async_trait::async_trait;
use serde_json::{json, Value};
use tracing::debug;

use crate::Tool;

const OUTPUT_LIMIT: usize = 100_000;

/// Run a shell command and capture its combined output.
pub struct BashTool {
    pub timeout_secs: u64,
}

impl Default for BashTool {
    fn default() -> Self {
        Self { timeout_secs: 120 }
    }
}

#[async_trait]
impl Tool for BashTool {
    fn name(&self) -> &str {
        "bash"
    }

    fn description(&self) -> &str {
        "Run a shell command and return its stdout and stderr."
    }

    fn parameters_schema(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "command": { "type": "string", "description": "Shell command to execute" }
            },
            "required": ["command"],
            "additionalProperties": false
        })
    }

    async fn execute(&self, args: &Value) -> anyhow::Result<String> {
        let command = args["command"]
            .as_str()
            .ok_or_else(|| anyhow::anyhow!("missing 'command'"))?;
        debug!(command, "bash tool");

        let run = tokio::process::Command::new("sh")
            .arg("-c")
            .arg(command)
            .output();
        let output = if self.timeout_secs > 0 {
            match tokio::time::timeout(std::time::Duration::from_secs(self.timeout_secs), run).await
            {
                Ok(result) => result?,
                Err(_) => anyhow::bail!("command timed out after {}s", self.timeout_secs),
            }
        } else {
            run.await?
        };

        let mut text = String::new();
        text.push_str(&String::from_utf8_lossy(&output.stdout));
        let stderr = String::from_utf8_lossy(&output.stderr);
        if !stderr.is_empty() {
            if !text.is_empty() {
                text.push('\n');
            }
            text.push_str("stderr:\n");
            text.push_str(&stderr);
        }
        if !output.status.success() {
            text.push_str(&format!(
                "\n[exit status: {}]",
                output.status.code().unwrap_or(-1)
            ));
        }
        if text.len() > OUTPUT_LIMIT {
            text.truncate(OUTPUT_LIMIT);
            text.push_str("\n...[truncated]");
        }
        if text.is_empty() {
            text.push_str("(no output)");
        }
        Ok(text)
    }
}

// ─── Unit tests ──────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn captures_stdout() {
        let tool = BashTool::default();
        let out = tool
            .execute(&json!({ "command": "echo hello" }))
            .await
            .unwrap();
        assert!(out.contains("hello"));
    }

    #[tokio::test]
    async fn nonzero_exit_is_reported_in_text() {
        let tool = BashTool::default();
        let out = tool.execute(&json!({ "command": "exit 3" })).await.unwrap();
        assert!(out.contains("[exit status: 3]"));
    }

    #[tokio::test]
    async fn missing_command_is_an_error() {
        let tool = BashTool::default();
        assert!(tool.execute(&json!({})).await.is_err());
    }
}
