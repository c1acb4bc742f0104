// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: MIT
use async_trait::async_trait;
use serde_json::{json, Value};
use walkdir::WalkDir;

use crate::Tool;

const MAX_MATCHES: usize = 200;
const MAX_FILE_BYTES: u64 = 2_000_000;

/// Search file contents under a root directory with a regular expression.
pub struct GrepTool;

#[async_trait]
impl Tool for GrepTool {
    fn name(&self) -> &str {
        "grep"
    }

    fn description(&self) -> &str {
        "Search file contents by regex. Returns `path:line: text` matches, leading matches first."
    }

    fn parameters_schema(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "pattern": { "type": "string", "description": "Regular expression" },
                "root": { "type": "string", "description": "Directory to search (default .)" }
            },
            "required": ["pattern"],
            "additionalProperties": false
        })
    }

    async fn execute(&self, args: &Value) -> anyhow::Result<String> {
        let pattern = args["pattern"]
            .as_str()
            .ok_or_else(|| anyhow::anyhow!("missing 'pattern'"))?;
        let root = args
            .get("root")
            .and_then(|v| v.as_str())
            .unwrap_or(".")
            .to_string();
        let regex = regex::Regex::new(pattern)?;

        let matches = tokio::task::spawn_blocking(move || {
            let mut found = Vec::new();
            'files: for entry in WalkDir::new(&root)
                .follow_links(false)
                .into_iter()
                .filter_map(|e| e.ok())
                .filter(|e| e.file_type().is_file())
            {
                if entry.metadata().map(|m| m.len()).unwrap_or(0) > MAX_FILE_BYTES {
                    continue;
                }
                let Ok(text) = std::fs::read_to_string(entry.path()) else {
                    continue; // binary or unreadable
                };
                let rel = entry
                    .path()
                    .strip_prefix(&root)
                    .unwrap_or(entry.path())
                    .to_string_lossy()
                    .into_owned();
                for (i, line) in text.lines().enumerate() {
                    if regex.is_match(line) {
                        found.push(format!("{rel}:{}: {}", i + 1, line.trim_end()));
                        if found.len() >= MAX_MATCHES {
                            break 'files;
                        }
                    }
                }
            }
            found
        })
        .await?;

        if matches.is_empty() {
            return Ok("(no matches)".into());
        }
        Ok(matches.join("\n"))
    }
}

// ─── Unit tests ──────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn finds_matching_lines_with_location() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("a.txt"), "nothing\nfn main() {}\n").unwrap();
        let tool = GrepTool;
        let out = tool
            .execute(&json!({
                "pattern": r"fn \w+",
                "root": dir.path().to_str().unwrap(),
            }))
            .await
            .unwrap();
        assert!(out.contains("a.txt:2: fn main() {}"));
    }

    #[tokio::test]
    async fn invalid_regex_is_an_error() {
        let tool = GrepTool;
        assert!(tool.execute(&json!({ "pattern": "(" })).await.is_err());
    }

    #[tokio::test]
    async fn no_matches_reports_cleanly() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("a.txt"), "plain").unwrap();
        let tool = GrepTool;
        let out = tool
            .execute(&json!({
                "pattern": "zebra",
                "root": dir.path().to_str().unwrap(),
            }))
            .await
            .unwrap();
        assert_eq!(out, "(no matches)");
    }
}
