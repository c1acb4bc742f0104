// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: Apache-2.0
use std::collections::HashSet;

use anyhow::Context;
use tokio::sync::mpsc;
use tracing::{debug, warn};

use miriad_model::{CompletionRequest, Message, ToolSchema};
use miriad_store::{estimate_tokens, IdPrefix, TemporalSummary, WorkerType};

use crate::{
    agent::{emit, AgentContext},
    events::AgentEvent,
    prompts::assemble_system_prompt,
};

const CREATE_SUMMARY: &str = "create_summary";
const FINISH_COMPACTION: &str = "finish_compaction";

const COMPACTION_INSTRUCTION: &str = "\
Your temporal memory has grown past its budget. Compress it by creating \
summaries over ranges of the history shown above.

Use `create_summary` with the `start_id` and `end_id` of a contiguous range \
(ids appear as `[id:…]` prefixes; existing summaries appear as \
`[summary from:… to:…]` lines and their boundary ids are also valid). \
Write an information-dense narrative and list the key observations worth \
keeping verbatim: decisions, file paths, constraints, open problems.

Prefer a few wide summaries over many narrow ones. Summarising a range that \
contains existing summaries rolls them up into a higher-order summary. \
Call `finish_compaction` when the history is compact enough or nothing more \
can usefully be merged.";

/// What a compaction run achieved.
#[derive(Debug, Clone)]
pub struct CompactionOutcome {
    pub tokens_before: usize,
    pub tokens_after: usize,
    pub summaries_created: usize,
    pub outer_turns: u32,
}

/// Run the agentic compaction loop as a tracked worker.
///
/// The compaction agent sees the same system prompt and history view as the
/// main agent plus a task instruction, and exactly two tools.  The outer loop
/// re-reads the view each iteration (new summaries change it) and stops when
/// the uncompacted estimate reaches the target, the turn cap is hit, or the
/// agent declares itself finished.  Failures land on the worker row; callers
/// treat the whole run as best-effort.
pub async fn run_compaction(
    ctx: &AgentContext,
    events: Option<mpsc::Sender<AgentEvent>>,
) -> anyhow::Result<CompactionOutcome> {
    let worker_id = ctx.ids.mint(IdPrefix::Worker);
    ctx.storage
        .worker_create(&worker_id, WorkerType::TemporalCompact)?;

    match compaction_loop(ctx).await {
        Ok(outcome) => {
            ctx.storage.worker_complete(&worker_id)?;
            emit(
                &events,
                AgentEvent::Consolidation {
                    tokens_before: outcome.tokens_before,
                    tokens_after: outcome.tokens_after,
                    summaries_created: outcome.summaries_created,
                },
            )
            .await;
            Ok(outcome)
        }
        Err(e) => {
            warn!(error = %e, "compaction worker failed");
            if let Err(row_err) = ctx.storage.worker_fail(&worker_id, &e.to_string()) {
                warn!(error = %row_err, "failed to record worker failure");
            }
            Err(e)
        }
    }
}

async fn compaction_loop(ctx: &AgentContext) -> anyhow::Result<CompactionOutcome> {
    let tokens_before = ctx.storage.estimate_uncompacted_tokens()?;
    let mut summaries_created = 0usize;
    let mut outer_turns = 0u32;
    let mut finished = false;

    while !finished && outer_turns < ctx.agent.max_compaction_turns {
        let tokens = ctx.storage.estimate_uncompacted_tokens()?;
        if tokens <= ctx.budgets.compaction_target {
            break;
        }
        outer_turns += 1;
        debug!(outer_turns, tokens, "compaction outer turn");

        // Rebuild per outer turn: freshly created summaries change both the
        // rendered view and the valid id set.
        let system = assemble_system_prompt(&ctx.storage, ctx.budgets.temporal)?;
        let mut valid_ids: HashSet<String> = HashSet::new();
        for message in ctx.storage.get_messages()? {
            valid_ids.insert(message.id);
        }
        let mut summaries = ctx.storage.get_summaries()?;
        for summary in &summaries {
            valid_ids.insert(summary.start_id.clone());
            valid_ids.insert(summary.end_id.clone());
        }

        let mut conversation = vec![Message::user(COMPACTION_INSTRUCTION)];

        for _inner in 0..ctx.agent.max_inner_turns {
            let request = CompletionRequest {
                system: Some(system.clone()),
                messages: conversation.clone(),
                tools: compaction_tools(),
                max_tokens: ctx.max_output_tokens,
            };
            let response = ctx
                .compaction_model
                .complete(request)
                .await
                .context("compaction model call failed")?;

            if let Some(text) = &response.text {
                conversation.push(Message::assistant(text));
            }
            if response.tool_calls.is_empty() {
                break;
            }

            for invocation in &response.tool_calls {
                conversation.push(Message::tool_call(
                    &invocation.id,
                    &invocation.name,
                    invocation.arguments.to_string(),
                ));
                let result_text = match invocation.name.as_str() {
                    CREATE_SUMMARY => {
                        match create_summary(
                            ctx,
                            &valid_ids,
                            &mut summaries,
                            &invocation.arguments,
                        ) {
                            Ok(text) => {
                                summaries_created += 1;
                                text
                            }
                            Err(msg) => msg,
                        }
                    }
                    FINISH_COMPACTION => {
                        finished = true;
                        let reason = invocation.arguments["reason"].as_str().unwrap_or("done");
                        format!("compaction finished: {reason}")
                    }
                    other => format!("unknown compaction tool: {other}"),
                };
                conversation.push(Message::tool_result(&invocation.id, &result_text));
            }

            if finished {
                break;
            }
        }
    }

    let tokens_after = ctx.storage.estimate_uncompacted_tokens()?;
    Ok(CompactionOutcome {
        tokens_before,
        tokens_after,
        summaries_created,
        outer_turns,
    })
}

/// Validate and insert one summary.  Returns the tool_result text; an `Err`
/// carries the rejection message, returned as a tool_result too; rejections
/// never abort the run.
fn create_summary(
    ctx: &AgentContext,
    valid_ids: &HashSet<String>,
    summaries: &mut Vec<TemporalSummary>,
    args: &serde_json::Value,
) -> Result<String, String> {
    let start_id = args["start_id"].as_str().unwrap_or_default().to_string();
    let end_id = args["end_id"].as_str().unwrap_or_default().to_string();
    let narrative = args["narrative"].as_str().unwrap_or_default().to_string();
    let key_observations: Vec<String> = args["key_observations"]
        .as_array()
        .map(|items| {
            items
                .iter()
                .filter_map(|v| v.as_str().map(String::from))
                .collect()
        })
        .unwrap_or_default();

    if !valid_ids.contains(&start_id) {
        return Err(format!("invalid id: start_id {start_id:?} is not a known id"));
    }
    if !valid_ids.contains(&end_id) {
        return Err(format!("invalid id: end_id {end_id:?} is not a known id"));
    }
    if start_id > end_id {
        return Err(format!("invalid range: start_id {start_id} > end_id {end_id}"));
    }
    if narrative.is_empty() {
        return Err("narrative must not be empty".into());
    }

    // The new summary sits one order above everything it subsumes.
    let subsumed_max_order = summaries
        .iter()
        .filter(|s| start_id <= s.start_id && s.end_id <= end_id)
        .map(|s| s.order)
        .max()
        .unwrap_or(0);
    let order = subsumed_max_order + 1;

    let token_estimate =
        estimate_tokens(&narrative) + key_observations.iter().map(|o| estimate_tokens(o)).sum::<usize>();
    let summary = TemporalSummary {
        id: ctx.ids.mint(IdPrefix::Summary),
        order,
        start_id: start_id.clone(),
        end_id: end_id.clone(),
        narrative,
        key_observations,
        tags: string_vec(args, "tags"),
        token_estimate,
        created_at: chrono::Utc::now().to_rfc3339(),
    };
    ctx.storage
        .create_summary(&summary)
        .map_err(|e| format!("failed to store summary: {e}"))?;
    let text = format!(
        "created {} (order {order}) covering {start_id}..{end_id}",
        summary.id
    );
    summaries.push(summary);
    Ok(text)
}

fn string_vec(args: &serde_json::Value, key: &str) -> Vec<String> {
    args.get(key)
        .and_then(|v| v.as_array())
        .map(|items| {
            items
                .iter()
                .filter_map(|v| v.as_str().map(String::from))
                .collect()
        })
        .unwrap_or_default()
}

fn compaction_tools() -> Vec<ToolSchema> {
    vec![
        ToolSchema {
            name: CREATE_SUMMARY.into(),
            description: "Insert a summary covering an inclusive id range of temporal memory."
                .into(),
            parameters: serde_json::json!({
                "type": "object",
                "properties": {
                    "start_id": { "type": "string" },
                    "end_id": { "type": "string" },
                    "narrative": { "type": "string" },
                    "key_observations": {
                        "type": "array",
                        "items": { "type": "string" }
                    },
                    "tags": {
                        "type": "array",
                        "items": { "type": "string" }
                    }
                },
                "required": ["start_id", "end_id", "narrative", "key_observations"],
                "additionalProperties": false
            }),
        },
        ToolSchema {
            name: FINISH_COMPACTION.into(),
            description: "Declare this compaction run finished.".into(),
            parameters: serde_json::json!({
                "type": "object",
                "properties": {
                    "reason": { "type": "string" }
                },
                "required": ["reason"],
                "additionalProperties": false
            }),
        },
    ]
}
