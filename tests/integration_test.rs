// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: MIT
/// End-to-end scenarios for the runtime core, driven by mock providers and
/// in-memory SQLite: a full turn, the tool round-trip, mid-turn injection
/// through the scheduler, interrupt, CAS contention, and a compaction run.
use std::sync::Arc;

use async_trait::async_trait;
use serde_json::json;
use tokio::sync::mpsc;

use miriad_config::{AgentConfig, BudgetConfig};
use miriad_core::{run_agent, run_compaction, AgentContext, AgentEvent, BeforeTurnHook};
use miriad_model::{MockProvider, ModelResponse, ScriptedMockProvider, ToolInvocation, Usage};
use miriad_server::{Submission, TurnScheduler};
use miriad_store::{IdGenerator, MessageKind, Storage, StoreError};
use miriad_tools::{Dispatcher, Tool, ToolRegistry};

// ── Helpers ───────────────────────────────────────────────────────────────────

/// A stand-in `read` tool that always returns "ABC".
struct FixedReadTool;

#[async_trait]
impl Tool for FixedReadTool {
    fn name(&self) -> &str {
        "read"
    }
    fn description(&self) -> &str {
        "reads a file"
    }
    fn parameters_schema(&self) -> serde_json::Value {
        json!({
            "type": "object",
            "properties": { "path": { "type": "string" } },
            "required": ["path"],
            "additionalProperties": false
        })
    }
    async fn execute(&self, _args: &serde_json::Value) -> anyhow::Result<String> {
        Ok("ABC".to_string())
    }
}

fn ctx(model: Arc<dyn miriad_model::ModelProvider>, budgets: BudgetConfig) -> AgentContext {
    let mut registry = ToolRegistry::new();
    registry.register(FixedReadTool);
    AgentContext {
        storage: Arc::new(Storage::open_in_memory().unwrap()),
        ids: Arc::new(IdGenerator::new()),
        model,
        compaction_model: Arc::new(ScriptedMockProvider::new(vec![])),
        dispatcher: Arc::new(Dispatcher::new(Arc::new(registry))),
        budgets,
        agent: AgentConfig::default(),
        max_output_tokens: 1024,
    }
}

fn tool_response(id: &str, name: &str, args: serde_json::Value) -> ModelResponse {
    ModelResponse {
        text: None,
        tool_calls: vec![ToolInvocation {
            id: id.into(),
            name: name.into(),
            arguments: args,
        }],
        usage: Usage::default(),
    }
}

fn text_response(text: &str) -> ModelResponse {
    ModelResponse {
        text: Some(text.into()),
        tool_calls: vec![],
        usage: Usage::default(),
    }
}

async fn collect(mut rx: mpsc::Receiver<AgentEvent>) -> Vec<AgentEvent> {
    let mut events = Vec::new();
    while let Some(ev) = rx.recv().await {
        let done = matches!(ev, AgentEvent::Done { .. });
        events.push(ev);
        if done {
            break;
        }
    }
    events
}

// ── Scenario 1: batch hello ───────────────────────────────────────────────────

#[tokio::test]
async fn batch_hello_single_text_turn() {
    let ctx = ctx(Arc::new(MockProvider), BudgetConfig::default());
    let (tx, rx) = mpsc::channel(64);

    let outcome = run_agent(&ctx, "Hello", Some(tx), None, None).await.unwrap();
    let events = collect(rx).await;

    assert_eq!(outcome.num_turns, 0);
    assert!(outcome.response.unwrap().contains("MOCK: Hello"));
    assert!(events.iter().any(|e| matches!(e, AgentEvent::Assistant { .. })));
    assert!(events.iter().any(|e| matches!(e, AgentEvent::Done { .. })));
}

// ── Scenario 2: single tool round-trip ────────────────────────────────────────

#[tokio::test]
async fn tool_round_trip_event_sequence() {
    let model = ScriptedMockProvider::new(vec![
        tool_response("c1", "read", json!({ "path": "/tmp/x" })),
        text_response("the file says ABC"),
    ]);
    let ctx = ctx(Arc::new(model), BudgetConfig::default());
    let (tx, rx) = mpsc::channel(64);

    let outcome = run_agent(&ctx, "read /tmp/x", Some(tx), None, None)
        .await
        .unwrap();
    let events = collect(rx).await;

    assert_eq!(outcome.num_turns, 1);

    // Order: tool_call → tool_result(ABC) → assistant text → done.
    let positions: Vec<usize> = [
        events
            .iter()
            .position(|e| matches!(e, AgentEvent::ToolCall { call_id, .. } if call_id == "c1")),
        events.iter().position(
            |e| matches!(e, AgentEvent::ToolResult { call_id, content, .. } if call_id == "c1" && content == "ABC"),
        ),
        events
            .iter()
            .position(|e| matches!(e, AgentEvent::Assistant { content, .. } if content.contains("ABC"))),
        events.iter().position(|e| matches!(e, AgentEvent::Done { .. })),
    ]
    .into_iter()
    .map(|p| p.expect("event must be present"))
    .collect();
    assert!(positions.windows(2).all(|w| w[0] < w[1]), "events out of order: {positions:?}");
}

// ── Scenario 3: mid-turn injection ────────────────────────────────────────────

#[tokio::test]
async fn queued_message_is_injected_into_running_turn() {
    let model = ScriptedMockProvider::new(vec![
        tool_response("c1", "read", json!({ "path": "/tmp/a" })),
        text_response("done"),
    ]);
    let ctx = ctx(Arc::new(model), BudgetConfig::default());

    let scheduler = Arc::new(TurnScheduler::new());
    let Submission::StartTurn(_cancel) = scheduler.submit("first prompt".into()) else {
        panic!("idle scheduler must start the turn");
    };
    // A second message arrives while the turn "runs": position 1 in queue.
    match scheduler.submit("second message".into()) {
        Submission::Queued { position } => assert_eq!(position, 1),
        _ => panic!("must enqueue while running"),
    }

    let hook: BeforeTurnHook = {
        let scheduler = scheduler.clone();
        Box::new(move || scheduler.drain_for_injection().map(|(joined, _, _)| joined))
    };
    run_agent(&ctx, "first prompt", None, None, Some(hook))
        .await
        .unwrap();

    // The injected content became a temporal user message of this turn.
    let user_rows: Vec<String> = ctx
        .storage
        .get_messages()
        .unwrap()
        .into_iter()
        .filter(|m| m.kind == MessageKind::User)
        .map(|m| m.content)
        .collect();
    assert_eq!(user_rows, vec!["first prompt".to_string(), "second message".to_string()]);

    // Queue fully drained: nothing left for the next turn.
    assert!(scheduler.turn_finished().is_none());
    assert_eq!(scheduler.queue_len(), 0);
}

#[tokio::test]
async fn multiple_queued_messages_drain_as_one_injection() {
    let scheduler = TurnScheduler::new();
    let _turn = scheduler.submit("running".into());
    scheduler.submit("alpha".into());
    scheduler.submit("beta".into());

    let (joined, count, length) = scheduler.drain_for_injection().unwrap();
    assert_eq!(count, 2);
    assert_eq!(joined, "alpha\n\nbeta");
    assert_eq!(length, joined.len());
}

// ── Scenario 4: interrupt ─────────────────────────────────────────────────────

#[tokio::test]
async fn interrupt_cancels_current_turn_only() {
    let ctx = ctx(
        Arc::new(ScriptedMockProvider::always_text("never delivered")),
        BudgetConfig::default(),
    );
    let scheduler = Arc::new(TurnScheduler::new());
    let Submission::StartTurn(cancel) = scheduler.submit("long task".into()) else {
        panic!("must start");
    };

    assert!(scheduler.interrupt());

    let (tx, mut rx) = mpsc::channel(64);
    let outcome = run_agent(&ctx, "long task", Some(tx), Some(cancel), None)
        .await
        .unwrap();
    assert!(outcome.cancelled);

    let mut saw_done = false;
    while let Ok(ev) = rx.try_recv() {
        saw_done |= matches!(ev, AgentEvent::Done { .. });
    }
    assert!(!saw_done, "cancelled turn must not complete");

    // Partial temporal rows stay written.
    assert_eq!(ctx.storage.get_messages().unwrap().len(), 1);

    // The scheduler recovers: the next message starts a fresh turn.
    assert!(scheduler.turn_finished().is_none());
    assert!(matches!(
        scheduler.submit("new task".into()),
        Submission::StartTurn(_)
    ));
}

// ── Scenario 5: CAS conflict ──────────────────────────────────────────────────

#[test]
fn two_writers_one_wins_one_conflicts() {
    let storage = Storage::open_in_memory().unwrap();
    storage
        .ltm_create("X", None, "Entry X", "original", &[], &[], "main")
        .unwrap();

    // Both writers read version 1; the first commit wins.
    let winner = storage.ltm_update("X", "writer one", 1, "main").unwrap();
    assert_eq!(winner.version, 2);

    let loser = storage.ltm_update("X", "writer two", 1, "ltm-consolidate");
    match loser {
        Err(StoreError::Conflict { expected, actual }) => {
            assert_eq!(expected, 1);
            assert_eq!(actual, 2);
        }
        other => panic!("expected Conflict, got {other:?}"),
    }

    // The row still holds the winner's write at version 2.
    let row = storage.ltm_read("X").unwrap().unwrap();
    assert_eq!(row.body, "writer one");
    assert_eq!(row.version, 2);
}

// ── Scenario 6: compaction reduces tokens ─────────────────────────────────────

#[tokio::test]
async fn compaction_brings_estimate_under_target() {
    let base = ctx(Arc::new(MockProvider), BudgetConfig {
        temporal: 50_000,
        compaction_threshold: 300,
        compaction_target: 400,
    });

    // Seed enough temporal history to exceed the threshold.
    let mut ids = Vec::new();
    for i in 0..20 {
        let id = base.ids.mint(miriad_store::IdPrefix::Message);
        base.storage
            .append_message(&miriad_store::TemporalMessage {
                id: id.clone(),
                kind: MessageKind::User,
                content: format!("step {i}: {}", "work happened here ".repeat(10)),
                token_estimate: miriad_store::estimate_tokens(&"work happened here ".repeat(10)),
                created_at: chrono::Utc::now().to_rfc3339(),
            })
            .unwrap();
        ids.push(id);
    }
    let before = base.storage.estimate_uncompacted_tokens().unwrap();
    assert!(before > base.budgets.compaction_threshold);

    let compaction_model = ScriptedMockProvider::new(vec![
        tool_response(
            "cc1",
            "create_summary",
            json!({
                "start_id": ids[0],
                "end_id": ids[18],
                "narrative": "twenty steps of work, condensed",
                "key_observations": ["the work repeated itself"],
            }),
        ),
        tool_response("cc2", "finish_compaction", json!({ "reason": "under target" })),
    ]);
    let base = AgentContext {
        compaction_model: Arc::new(compaction_model),
        ..base
    };

    let outcome = run_compaction(&base, None).await.unwrap();

    assert!(outcome.tokens_after <= before);
    assert!(
        outcome.tokens_after <= base.budgets.compaction_target
            || outcome.outer_turns == base.agent.max_compaction_turns,
        "either the target was reached or the turn cap was hit"
    );

    // Every stored summary respects id validity and the ordering rule.
    let summaries = base.storage.get_summaries().unwrap();
    assert_eq!(summaries.len(), 1);
    let summary = &summaries[0];
    assert!(summary.start_id <= summary.end_id);
    assert_eq!(summary.order, 1);
    assert!(ids.contains(&summary.start_id));
    assert!(ids.contains(&summary.end_id));
}

// ── Identifier monotonicity across services ───────────────────────────────────

#[test]
fn ids_minted_in_program_order_sort_lexicographically() {
    let ids = IdGenerator::new();
    let mut previous = ids.mint(miriad_store::IdPrefix::Message);
    for _ in 0..500 {
        let next = ids.mint(miriad_store::IdPrefix::Message);
        assert!(previous < next, "{previous} must sort before {next}");
        previous = next;
    }
}
