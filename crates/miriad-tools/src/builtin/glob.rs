// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: MIT
use async_trait::async_trait;
use serde_json::{json, Value};
use walkdir::WalkDir;

use crate::Tool;

const MAX_RESULTS: usize = 500;

/// Find files whose path matches a glob pattern under a root directory.
pub struct GlobTool;

#[async_trait]
impl Tool for GlobTool {
    fn name(&self) -> &str {
        "glob"
    }

    fn description(&self) -> &str {
        "Find files matching a glob pattern (`*` within a segment, `**` across segments)."
    }

    fn parameters_schema(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "pattern": { "type": "string", "description": "e.g. src/**/*.rs" },
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
        let regex = glob_to_regex(pattern)?;

        // Directory walking is blocking; hand it to the blocking pool.
        let matches = tokio::task::spawn_blocking(move || {
            let mut found = Vec::new();
            for entry in WalkDir::new(&root)
                .follow_links(false)
                .into_iter()
                .filter_map(|e| e.ok())
                .filter(|e| e.file_type().is_file())
            {
                let rel = entry
                    .path()
                    .strip_prefix(&root)
                    .unwrap_or(entry.path())
                    .to_string_lossy()
                    .into_owned();
                if regex.is_match(&rel) {
                    found.push(rel);
                    if found.len() >= MAX_RESULTS {
                        break;
                    }
                }
            }
            found.sort();
            found
        })
        .await?;

        if matches.is_empty() {
            return Ok("(no matches)".into());
        }
        Ok(matches.join("\n"))
    }
}

/// Translate a file glob into an anchored regex.  Here `*` stays within a
/// path segment and `**` crosses segments, unlike the LTM path glob with
/// its documented collapsed baseline.
fn glob_to_regex(pattern: &str) -> anyhow::Result<regex::Regex> {
    let mut out = String::from("^");
    let mut chars = pattern.chars().peekable();
    while let Some(c) = chars.next() {
        match c {
            '*' => {
                if chars.peek() == Some(&'*') {
                    chars.next();
                    // Swallow a following '/' so `**/` also matches zero segments.
                    if chars.peek() == Some(&'/') {
                        chars.next();
                        out.push_str("(?:.*/)?");
                    } else {
                        out.push_str(".*");
                    }
                } else {
                    out.push_str("[^/]*");
                }
            }
            '?' => out.push_str("[^/]"),
            c if "\\.+()[]{}^$|".contains(c) => {
                out.push('\\');
                out.push(c);
            }
            c => out.push(c),
        }
    }
    out.push('$');
    Ok(regex::Regex::new(&out)?)
}

// ─── Unit tests ──────────────────────────────────────────────────────────────
