// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: Apache-2.0
use std::sync::Arc;

use anyhow::Context;
use tokio::sync::{mpsc, oneshot};
use tracing::{debug, warn};

use miriad_config::{AgentConfig, BudgetConfig};
use miriad_model::{CompletionRequest, Message, ModelProvider, ToolSchema, Usage};
use miriad_store::{estimate_tokens, IdGenerator, IdPrefix, MessageKind, Storage, TemporalMessage};
use miriad_tools::{Dispatcher, ToolCall};

use crate::{events::AgentEvent, prompts::assemble_system_prompt};

/// Everything a turn needs, passed explicitly; no process-wide registries or
/// cached config.  Tests inject a scripted model and an in-memory store.
pub struct AgentContext {
    pub storage: Arc<Storage>,
    pub ids: Arc<IdGenerator>,
    /// Drives the main agent loop.
    pub model: Arc<dyn ModelProvider>,
    /// Drives the compaction agent; usually a cheaper model.
    pub compaction_model: Arc<dyn ModelProvider>,
    pub dispatcher: Arc<Dispatcher>,
    pub budgets: BudgetConfig,
    pub agent: AgentConfig,
    pub max_output_tokens: u32,
}

/// Pre-model-call hook consulted at every model-call boundary.  A returned
/// string is appended to the working conversation and to temporal memory as
/// a user message.  This is how the scheduler injects queued messages
/// mid-turn.
pub type BeforeTurnHook = Box<dyn FnMut() -> Option<String> + Send>;

/// What one turn produced.
#[derive(Debug, Clone, Default)]
pub struct TurnOutcome {
    pub response: Option<String>,
    pub usage: Usage,
    /// Tool-dispatch rounds within the turn (0 for a pure text reply).
    pub num_turns: u32,
    pub cancelled: bool,
}

/// Execute one full turn: append the prompt to temporal memory, then loop
/// model call → tool dispatch until the model answers without tool calls,
/// `max_turns` is reached, or the turn is cancelled.
///
/// Tool failures never terminate the turn (they come back as error
/// tool_results); model failures do.  On cancellation the loop stops at the
/// next suspension point without emitting `Done`; rows already written stay
/// written.
pub async fn run_agent(
    ctx: &AgentContext,
    prompt: &str,
    events: Option<mpsc::Sender<AgentEvent>>,
    mut cancel: Option<oneshot::Receiver<()>>,
    mut on_before_turn: Option<BeforeTurnHook>,
) -> anyhow::Result<TurnOutcome> {
    let mut outcome = TurnOutcome::default();

    let id = append_temporal(ctx, MessageKind::User, prompt)?;
    emit(
        &events,
        AgentEvent::User {
            id,
            content: prompt.to_string(),
        },
    )
    .await;

    let tools: Vec<ToolSchema> = ctx
        .dispatcher
        .registry()
        .schemas()
        .into_iter()
        .map(|s| ToolSchema {
            name: s.name,
            description: s.description,
            parameters: s.parameters,
        })
        .collect();

    let mut conversation: Vec<Message> = vec![Message::user(prompt)];
    let mut final_response: Option<String> = None;

    for round in 0..ctx.agent.max_turns {
        // Mid-turn injection point: queued messages drain into this turn.
        if let Some(hook) = on_before_turn.as_mut() {
            if let Some(injected) = hook() {
                if !injected.is_empty() {
                    let id = append_temporal(ctx, MessageKind::User, &injected)?;
                    emit(
                        &events,
                        AgentEvent::User {
                            id,
                            content: injected.clone(),
                        },
                    )
                    .await;
                    conversation.push(Message::user(injected));
                }
            }
        }

        let system = assemble_system_prompt(&ctx.storage, ctx.budgets.temporal)?;
        let request = CompletionRequest {
            system: Some(system),
            messages: conversation.clone(),
            tools: tools.clone(),
            max_tokens: ctx.max_output_tokens,
        };

        debug!(round, messages = conversation.len(), "model call");
        let response = match call_with_cancel(&*ctx.model, request, cancel.as_mut()).await {
            Some(Ok(r)) => r,
            Some(Err(e)) => {
                emit(
                    &events,
                    AgentEvent::Error {
                        message: e.to_string(),
                    },
                )
                .await;
                return Err(e).context("model completion failed");
            }
            None => {
                outcome.cancelled = true;
                outcome.response = final_response;
                return Ok(outcome);
            }
        };

        outcome.usage.add(response.usage);

        if let Some(text) = &response.text {
            let id = append_temporal(ctx, MessageKind::Assistant, text)?;
            emit(
                &events,
                AgentEvent::Assistant {
                    id,
                    content: text.clone(),
                },
            )
            .await;
            final_response = Some(text.clone());
        }

        if response.tool_calls.is_empty() {
            break;
        }
        outcome.num_turns += 1;

        // Phase 1: record the assistant's tool-call turn.
        for invocation in &response.tool_calls {
            let args_json = invocation.arguments.to_string();
            let row = serde_json::json!({
                "name": invocation.name,
                "args": invocation.arguments,
            })
            .to_string();
            let id = append_temporal(ctx, MessageKind::ToolCall, &row)?;
            emit(
                &events,
                AgentEvent::ToolCall {
                    id,
                    call_id: invocation.id.clone(),
                    name: invocation.name.clone(),
                    args: invocation.arguments.clone(),
                },
            )
            .await;
            conversation.push(Message::tool_call(
                &invocation.id,
                &invocation.name,
                args_json,
            ));
        }

        // Phase 2: dispatch sequentially in response order.  Sequential
        // dispatch keeps the temporal rows in the order the model issued the
        // calls.
        for invocation in &response.tool_calls {
            let call = ToolCall {
                id: invocation.id.clone(),
                name: invocation.name.clone(),
                args: invocation.arguments.clone(),
            };
            let output = ctx.dispatcher.dispatch(&call).await;
            if output.is_error {
                warn!(tool = %invocation.name, "tool call returned an error result");
            }
            let id = append_temporal(ctx, MessageKind::ToolResult, &output.content)?;
            emit(
                &events,
                AgentEvent::ToolResult {
                    id,
                    call_id: invocation.id.clone(),
                    name: invocation.name.clone(),
                    content: output.content.clone(),
                    is_error: output.is_error,
                },
            )
            .await;
            conversation.push(Message::tool_result(&invocation.id, &output.content));
        }
    }

    emit(
        &events,
        AgentEvent::Done {
            response: final_response.clone(),
        },
    )
    .await;
    outcome.response = final_response;
    Ok(outcome)
}

/// Run the model call, racing it against cancellation when a receiver is
/// present.  `None` means the turn was cancelled; an already-dropped sender
/// counts as cancellation too, so holders must keep the sender alive for the
/// turn's lifetime.
async fn call_with_cancel(
    model: &dyn ModelProvider,
    request: CompletionRequest,
    cancel: Option<&mut oneshot::Receiver<()>>,
) -> Option<anyhow::Result<miriad_model::ModelResponse>> {
    match cancel {
        Some(receiver) => {
            tokio::select! {
                biased;
                _ = receiver => None,
                result = model.complete(request) => Some(result),
            }
        }
        None => Some(model.complete(request).await),
    }
}

/// Mint an id, stamp and append one temporal row, and return its id.
pub(crate) fn append_temporal(
    ctx: &AgentContext,
    kind: MessageKind,
    content: &str,
) -> anyhow::Result<String> {
    let id = ctx.ids.mint(IdPrefix::Message);
    ctx.storage.append_message(&TemporalMessage {
        id: id.clone(),
        kind,
        content: content.to_string(),
        token_estimate: estimate_tokens(content),
        created_at: chrono::Utc::now().to_rfc3339(),
    })?;
    Ok(id)
}

pub(crate) async fn emit(events: &Option<mpsc::Sender<AgentEvent>>, event: AgentEvent) {
    if let Some(tx) = events {
        let _ = tx.send(event).await;
    }
}
