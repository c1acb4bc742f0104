// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: Apache-2.0
use std::sync::{Arc, Mutex};
use std::time::Instant;

use serde_json::Value;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::sync::{mpsc, oneshot};
use tracing::{debug, warn};

use miriad_core::{run_agent, run_compaction, AgentContext, AgentEvent, BeforeTurnHook};
use miriad_store::IdPrefix;

use crate::protocol::{frames, ControlAction, InputFrame};
use crate::scheduler::{SchedulerState, Submission, TurnScheduler};

/// Output format for batch mode.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BatchFormat {
    Text,
    Json,
}

/// Run the NDJSON server: read frames from stdin, schedule turns, write
/// events and results to stdout until stdin closes and the queue drains.
pub async fn run_stdio(ctx: Arc<AgentContext>, model_name: String) -> anyhow::Result<()> {
    let session_id = Arc::new(Mutex::new(resolve_session_id(&ctx)?));
    let scheduler = Arc::new(TurnScheduler::new());

    let (writer_tx, writer_rx) = mpsc::unbounded_channel::<Value>();
    let writer_task = tokio::spawn(write_loop(writer_rx));
    let (done_tx, mut done_rx) = mpsc::channel::<()>(8);

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    let mut eof = false;

    loop {
        tokio::select! {
            line = lines.next_line(), if !eof => {
                match line {
                    Ok(Some(line)) => {
                        if !line.trim().is_empty() {
                            handle_line(
                                &line,
                                &ctx,
                                &scheduler,
                                &writer_tx,
                                &done_tx,
                                &session_id,
                                &model_name,
                            );
                        }
                    }
                    Ok(None) => eof = true,
                    Err(e) => {
                        warn!(error = %e, "stdin read error; treating as EOF");
                        eof = true;
                    }
                }
            }
            turn_done = done_rx.recv() => {
                if turn_done.is_none() {
                    break;
                }
                // Turn boundary: drain the queue one message at a time.
                if let Some((prompt, cancel)) = scheduler.turn_finished() {
                    start_turn(
                        ctx.clone(),
                        scheduler.clone(),
                        writer_tx.clone(),
                        done_tx.clone(),
                        session_id.clone(),
                        model_name.clone(),
                        prompt,
                        cancel,
                    );
                }
            }
        }
        if eof && scheduler.state() == SchedulerState::Idle && scheduler.queue_len() == 0 {
            break;
        }
    }

    // Dropping our sender ends the writer once in-flight tasks (e.g. a
    // background compaction flushing its consolidation frame) finish.
    drop(writer_tx);
    drop(done_tx);
    let _ = writer_task.await;
    Ok(())
}

/// Run a single batch turn (the `-p` CLI mode).  Returns the process exit code.
pub async fn run_batch(
    ctx: Arc<AgentContext>,
    prompt: &str,
    format: BatchFormat,
    model_name: &str,
) -> anyhow::Result<i32> {
    let session_id = resolve_session_id(&ctx)?;
    let started = Instant::now();

    let (writer_tx, writer_rx) = mpsc::unbounded_channel::<Value>();
    let writer_task = tokio::spawn(write_loop(writer_rx));

    let (events, forwarder) = if format == BatchFormat::Json {
        let (ev_tx, ev_rx) = mpsc::channel(64);
        let task = tokio::spawn(forward_events(ev_rx, writer_tx.clone(), model_name.to_string()));
        (Some(ev_tx), Some(task))
    } else {
        (None, None)
    };

    let outcome = run_agent(&ctx, prompt, events, None, None).await;
    // The event sender is gone; drain the forwarder so every event frame
    // precedes the result frame.
    if let Some(task) = forwarder {
        let _ = task.await;
    }

    let code = match &outcome {
        Ok(o) => {
            match format {
                BatchFormat::Text => {
                    if let Some(text) = &o.response {
                        println!("{text}");
                    }
                }
                BatchFormat::Json => {
                    let _ = writer_tx.send(frames::result(
                        "success",
                        started.elapsed().as_millis(),
                        o.num_turns,
                        &session_id,
                        o.response.as_deref(),
                        o.usage,
                    ));
                }
            }
            0
        }
        Err(e) => {
            if format == BatchFormat::Json {
                let _ = writer_tx.send(frames::result(
                    "error",
                    started.elapsed().as_millis(),
                    0,
                    &session_id,
                    None,
                    miriad_model::Usage::default(),
                ));
            }
            eprintln!("error: {e}");
            1
        }
    };

    // Synchronous best-effort compaction so the batch process exits with a
    // compact store.
    maybe_compact_now(&ctx, &writer_tx).await;

    drop(writer_tx);
    let _ = writer_task.await;
    Ok(code)
}

// ─── Internals ────────────────────────────────────────────────────────────────

fn handle_line(
    line: &str,
    ctx: &Arc<AgentContext>,
    scheduler: &Arc<TurnScheduler>,
    writer: &mpsc::UnboundedSender<Value>,
    done_tx: &mpsc::Sender<()>,
    session_id: &Arc<Mutex<String>>,
    model_name: &str,
) {
    let frame: InputFrame = match serde_json::from_str(line) {
        Ok(frame) => frame,
        Err(e) => {
            // Malformed input never kills the server; report and keep reading.
            let _ = writer.send(frames::error(&format!("parse error: {e}")));
            return;
        }
    };

    match frame {
        InputFrame::User {
            message,
            session_id: incoming_session,
        } => {
            if let Some(sid) = incoming_session {
                *lock_unpoisoned(session_id) = sid;
            }
            let prompt = message.flatten();
            match scheduler.submit(prompt.clone()) {
                Submission::StartTurn(cancel) => start_turn(
                    ctx.clone(),
                    scheduler.clone(),
                    writer.clone(),
                    done_tx.clone(),
                    session_id.clone(),
                    model_name.to_string(),
                    prompt,
                    cancel,
                ),
                Submission::Queued { position } => {
                    let _ = writer.send(frames::queued(position));
                }
            }
        }
        InputFrame::Control { action } => match action {
            ControlAction::Interrupt => {
                if scheduler.interrupt() {
                    let _ = writer.send(frames::interrupted());
                } else {
                    let _ = writer.send(frames::error("no turn to interrupt"));
                }
            }
            ControlAction::Status => {
                let _ = writer.send(frames::status(
                    scheduler.state().as_str(),
                    scheduler.queue_len(),
                    &lock_unpoisoned(session_id),
                ));
            }
        },
    }
}

#[allow(clippy::too_many_arguments)]
fn start_turn(
    ctx: Arc<AgentContext>,
    scheduler: Arc<TurnScheduler>,
    writer: mpsc::UnboundedSender<Value>,
    done_tx: mpsc::Sender<()>,
    session_id: Arc<Mutex<String>>,
    model_name: String,
    prompt: String,
    cancel: oneshot::Receiver<()>,
) {
    tokio::spawn(async move {
        let started = Instant::now();
        debug!("turn started");

        let (ev_tx, ev_rx) = mpsc::channel(64);
        let forwarder = tokio::spawn(forward_events(ev_rx, writer.clone(), model_name));

        // The injection hook: at every model-call boundary, atomically drain
        // the queue and feed it into this turn.
        let hook: BeforeTurnHook = {
            let scheduler = scheduler.clone();
            let writer = writer.clone();
            Box::new(move || {
                scheduler
                    .drain_for_injection()
                    .map(|(joined, count, length)| {
                        let _ = writer.send(frames::injected(count, length));
                        joined
                    })
            })
        };

        let outcome = run_agent(&ctx, &prompt, Some(ev_tx), Some(cancel), Some(hook)).await;
        // The event sender was moved into run_agent and is gone now, so the
        // forwarder drains and exits; awaiting it keeps every turn event
        // ahead of the result frame on stdout.
        let _ = forwarder.await;

        let sid = lock_unpoisoned(&session_id).clone();
        let frame = match &outcome {
            Ok(o) if o.cancelled => frames::result(
                "cancelled",
                started.elapsed().as_millis(),
                o.num_turns,
                &sid,
                o.response.as_deref(),
                o.usage,
            ),
            Ok(o) => frames::result(
                "success",
                started.elapsed().as_millis(),
                o.num_turns,
                &sid,
                o.response.as_deref(),
                o.usage,
            ),
            Err(_) => frames::result(
                "error",
                started.elapsed().as_millis(),
                0,
                &sid,
                None,
                miriad_model::Usage::default(),
            ),
        };
        let _ = writer.send(frame);

        // Turn boundary maintenance: compaction is advisory and never blocks
        // the next turn, so it runs on its own task.
        spawn_compaction_if_needed(ctx.clone(), writer.clone());

        let _ = done_tx.send(()).await;
    });
}

async fn forward_events(
    mut events: mpsc::Receiver<AgentEvent>,
    writer: mpsc::UnboundedSender<Value>,
    model_name: String,
) {
    while let Some(event) = events.recv().await {
        let frame = match event {
            AgentEvent::Assistant { content, .. } => {
                Some(frames::assistant_text(&model_name, &content))
            }
            AgentEvent::ToolCall {
                call_id, name, args, ..
            } => Some(frames::assistant_tool_use(&model_name, &call_id, &name, &args)),
            AgentEvent::ToolResult {
                call_id,
                content,
                is_error,
                ..
            } => Some(frames::tool_result(&call_id, &content, is_error)),
            AgentEvent::Error { message } => Some(frames::error(&message)),
            AgentEvent::Consolidation {
                tokens_before,
                tokens_after,
                summaries_created,
            } => Some(frames::consolidation(
                tokens_before,
                tokens_after,
                summaries_created,
            )),
            // User rows and Done are not wire frames: the prompt came from the
            // client and the result frame closes the turn.
            AgentEvent::User { .. } | AgentEvent::Done { .. } => None,
        };
        if let Some(frame) = frame {
            if writer.send(frame).is_err() {
                break;
            }
        }
    }
}

fn spawn_compaction_if_needed(ctx: Arc<AgentContext>, writer: mpsc::UnboundedSender<Value>) {
    tokio::spawn(async move {
        maybe_compact_now(&ctx, &writer).await;
    });
}

async fn maybe_compact_now(ctx: &Arc<AgentContext>, writer: &mpsc::UnboundedSender<Value>) {
    let tokens = match ctx.storage.estimate_uncompacted_tokens() {
        Ok(tokens) => tokens,
        Err(e) => {
            warn!(error = %e, "token estimate failed; skipping compaction check");
            return;
        }
    };
    if tokens <= ctx.budgets.compaction_threshold {
        return;
    }
    debug!(tokens, threshold = ctx.budgets.compaction_threshold, "compaction triggered");
    match run_compaction(ctx, None).await {
        Ok(outcome) => {
            let _ = writer.send(frames::consolidation(
                outcome.tokens_before,
                outcome.tokens_after,
                outcome.summaries_created,
            ));
        }
        // Best-effort: the failure is on the worker row already.
        Err(e) => warn!(error = %e, "compaction run failed"),
    }
}

async fn write_loop(mut frames: mpsc::UnboundedReceiver<Value>) {
    let mut stdout = tokio::io::stdout();
    while let Some(frame) = frames.recv().await {
        let mut line = frame.to_string();
        line.push('\n');
        if stdout.write_all(line.as_bytes()).await.is_err() {
            break;
        }
        let _ = stdout.flush().await;
    }
}

fn resolve_session_id(ctx: &AgentContext) -> anyhow::Result<String> {
    if let Some(existing) = ctx.storage.session_value("session_id")? {
        return Ok(existing);
    }
    let minted = ctx.ids.mint(IdPrefix::Session);
    ctx.storage.set_session_value("session_id", &minted)?;
    Ok(minted)
}

fn lock_unpoisoned<T>(mutex: &Mutex<T>) -> std::sync::MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|p| p.into_inner())
}

// ─── Unit tests ──────────────────────────────────────────────────────────────
