// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: Apache-2.0
use anyhow::{bail, Context};
use async_trait::async_trait;
use serde_json::{json, Value};
use tracing::{debug, warn};

use crate::{
    CompletionRequest, Message, MessageContent, ModelResponse, Role, ToolInvocation, Usage,
};

/// Provider speaking the OpenAI chat-completions wire format.  Covers OpenAI
/// itself plus every compatible endpoint (LiteLLM, llama.cpp, Ollama, …)
/// through the `base_url` override.
pub struct OpenAiCompatProvider {
    model: String,
    api_key: Option<String>,
    base_url: String,
    client: reqwest::Client,
}

impl OpenAiCompatProvider {
    pub fn new(
        model: String,
        api_key: Option<String>,
        base_url: Option<String>,
        request_timeout_secs: u64,
    ) -> Self {
        let mut builder = reqwest::Client::builder();
        if request_timeout_secs > 0 {
            builder = builder.timeout(std::time::Duration::from_secs(request_timeout_secs));
        }
        Self {
            model,
            api_key,
            base_url: base_url.unwrap_or_else(|| "https://api.openai.com/v1".into()),
            client: builder.build().unwrap_or_default(),
        }
    }
}

#[async_trait]
impl crate::ModelProvider for OpenAiCompatProvider {
    fn name(&self) -> &str {
        "openai"
    }
    fn model_name(&self) -> &str {
        &self.model
    }

    async fn complete(&self, req: CompletionRequest) -> anyhow::Result<ModelResponse> {
        let messages = build_openai_messages(req.system.as_deref(), &req.messages);
        let tools: Vec<Value> = req
            .tools
            .iter()
            .map(|t| {
                json!({
                    "type": "function",
                    "function": {
                        "name": t.name,
                        "description": t.description,
                        "parameters": t.parameters,
                    },
                })
            })
            .collect();

        let mut body = json!({
            "model": self.model,
            "messages": messages,
            "max_tokens": req.max_tokens,
        });
        if !tools.is_empty() {
            body["tools"] = json!(tools);
        }

        let url = format!("{}/chat/completions", self.base_url.trim_end_matches('/'));
        debug!(model = %self.model, messages = req.messages.len(), "openai request");
        let mut request = self.client.post(&url).json(&body);
        if let Some(key) = &self.api_key {
            request = request.bearer_auth(key);
        }
        let resp = request.send().await.context("openai request failed")?;

        let status = resp.status();
        let payload: Value = resp.json().await.context("reading openai response")?;
        if !status.is_success() {
            bail!("openai error {status}: {payload}");
        }

        parse_openai_response(&payload)
    }
}

fn build_openai_messages(system: Option<&str>, messages: &[Message]) -> Vec<Value> {
    let mut out: Vec<Value> = Vec::with_capacity(messages.len() + 1);
    if let Some(sys) = system {
        if !sys.is_empty() {
            out.push(json!({ "role": "system", "content": sys }));
        }
    }
    for msg in messages {
        match (&msg.role, &msg.content) {
            (Role::User, MessageContent::Text(t)) => {
                out.push(json!({ "role": "user", "content": t }));
            }
            (Role::Assistant, MessageContent::Text(t)) => {
                out.push(json!({ "role": "assistant", "content": t }));
            }
            (_, MessageContent::ToolCall {
                tool_call_id,
                function,
            }) => {
                out.push(json!({
                    "role": "assistant",
                    "content": Value::Null,
                    "tool_calls": [{
                        "id": tool_call_id,
                        "type": "function",
                        "function": {
                            "name": function.name,
                            "arguments": function.arguments,
                        },
                    }],
                }));
            }
            (_, MessageContent::ToolResult {
                tool_call_id,
                content,
            }) => {
                out.push(json!({
                    "role": "tool",
                    "tool_call_id": tool_call_id,
                    "content": content,
                }));
            }
            (Role::Tool, MessageContent::Text(t)) => {
                out.push(json!({ "role": "user", "content": t }));
            }
        }
    }
    out
}

fn parse_openai_response(payload: &Value) -> anyhow::Result<ModelResponse> {
    let message = &payload["choices"][0]["message"];
    if message.is_null() {
        bail!("openai response missing choices[0].message: {payload}");
    }

    let text = message["content"]
        .as_str()
        .filter(|t| !t.is_empty())
        .map(String::from);

    let mut tool_calls = Vec::new();
    if let Some(calls) = message["tool_calls"].as_array() {
        for call in calls {
            let name = call["function"]["name"].as_str().unwrap_or("").to_string();
            let raw_args = call["function"]["arguments"].as_str().unwrap_or("{}");
            // The wire format carries arguments as a JSON-encoded string;
            // substitute an empty object when the model emits invalid JSON so
            // the dispatcher can report the problem as a validation error.
            let arguments: Value = serde_json::from_str(raw_args).unwrap_or_else(|e| {
                warn!(tool = %name, error = %e, "invalid JSON arguments from model");
                json!({})
            });
            tool_calls.push(ToolInvocation {
                id: call["id"].as_str().unwrap_or("").to_string(),
                name,
                arguments,
            });
        }
    }

    let usage = Usage {
        input_tokens: payload["usage"]["prompt_tokens"].as_u64().unwrap_or(0) as u32,
        output_tokens: payload["usage"]["completion_tokens"].as_u64().unwrap_or(0) as u32,
    };

    Ok(ModelResponse {
        text,
        tool_calls,
        usage,
    })
}

// ─── Unit tests ──────────────────────────────────────────────────────────────
