// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: MIT
use miriad_store::{PresentState, Storage};

use crate::view::build_view;

const DEFAULT_IDENTITY: &str =
    "You are miriad, a long-lived coding agent. You keep working memory in a \
     persistent store and continue tasks across sessions.";

/// Assemble the system prompt from long-term identity/behavior entries, the
/// present state, and the bounded recent-history view.
///
/// The compaction agent reuses this verbatim (plus its task instruction) so
/// the shared prefix stays cacheable on providers that support it.
pub fn assemble_system_prompt(
    storage: &Storage,
    temporal_budget: usize,
) -> miriad_store::Result<String> {
    let identity = storage.ltm_read("identity")?;
    let behavior = storage.ltm_read("behavior")?;
    let present = storage.present()?;
    let messages = storage.get_messages()?;
    let summaries = storage.get_summaries()?;
    let view = build_view(&messages, &summaries, temporal_budget);

    let mut prompt = String::new();
    match identity {
        Some(entry) => prompt.push_str(&entry.body),
        None => prompt.push_str(DEFAULT_IDENTITY),
    }
    prompt.push('\n');

    if let Some(entry) = behavior {
        prompt.push_str("\n## Behavior\n");
        prompt.push_str(&entry.body);
        prompt.push('\n');
    }

    prompt.push('\n');
    prompt.push_str(&render_present(&present));

    prompt.push_str("\n## Recent history\n");
    if view.rendering.is_empty() {
        prompt.push_str("(no prior history)\n");
    } else {
        prompt.push_str(&view.rendering);
    }

    Ok(prompt)
}

/// Serialize the present state as the tagged block the model reads and the
/// present-state tools overwrite.
pub fn render_present(present: &PresentState) -> String {
    let mut block = String::from("<present_state>\n");
    block.push_str(&format!(
        "mission: {}\n",
        present.mission.as_deref().unwrap_or("(none)")
    ));
    block.push_str(&format!(
        "status: {}\n",
        present.status.as_deref().unwrap_or("(none)")
    ));
    if present.tasks.is_empty() {
        block.push_str("tasks: (none)\n");
    } else {
        block.push_str("tasks:\n");
        for task in &present.tasks {
            let status = serde_json::to_value(task.status)
                .ok()
                .and_then(|v| v.as_str().map(String::from))
                .unwrap_or_default();
            match &task.blocked_reason {
                Some(reason) => block.push_str(&format!(
                    "- [{status}] {}: {} (blocked: {reason})\n",
                    task.id, task.content
                )),
                None => {
                    block.push_str(&format!("- [{status}] {}: {}\n", task.id, task.content))
                }
            }
        }
    }
    block.push_str("</present_state>\n");
    block
}

// ─── Unit tests ──────────────────────────────────────────────────────────────
