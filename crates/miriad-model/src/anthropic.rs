// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: Apache-2.0
use anyhow::{bail, Context};
use async_trait::async_trait;
use serde_json::{json, Value};
use tracing::debug;

use crate::{
    CompletionRequest, Message, MessageContent, ModelResponse, Role, ToolInvocation, Usage,
};

pub struct AnthropicProvider {
    model: String,
    api_key: Option<String>,
    base_url: String,
    client: reqwest::Client,
}

impl AnthropicProvider {
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
            base_url: base_url.unwrap_or_else(|| "https://api.anthropic.com".into()),
            client: builder.build().unwrap_or_default(),
        }
    }
}

#[async_trait]
impl crate::ModelProvider for AnthropicProvider {
    fn name(&self) -> &str {
        "anthropic"
    }
    fn model_name(&self) -> &str {
        &self.model
    }

    async fn complete(&self, req: CompletionRequest) -> anyhow::Result<ModelResponse> {
        let key = self
            .api_key
            .as_deref()
            .context("ANTHROPIC_API_KEY not set")?;

        let messages = build_anthropic_messages(&req.messages);
        let tools: Vec<Value> = req
            .tools
            .iter()
            .map(|t| {
                json!({
                    "name": t.name,
                    "description": t.description,
                    "input_schema": t.parameters,
                })
            })
            .collect();

        let mut body = json!({
            "model": self.model,
            "messages": messages,
            "max_tokens": req.max_tokens,
        });
        if let Some(system) = &req.system {
            if !system.is_empty() {
                body["system"] = json!(system);
            }
        }
        if !tools.is_empty() {
            body["tools"] = json!(tools);
        }

        let url = format!("{}/v1/messages", self.base_url);
        debug!(model = %self.model, messages = req.messages.len(), "anthropic request");
        let resp = self
            .client
            .post(&url)
            .header("x-api-key", key)
            .header("anthropic-version", "2023-06-01")
            .json(&body)
            .send()
            .await
            .context("anthropic request failed")?;

        let status = resp.status();
        let payload: Value = resp.json().await.context("reading anthropic response")?;
        if !status.is_success() {
            bail!("anthropic error {status}: {payload}");
        }

        parse_anthropic_response(&payload)
    }
}

/// Map the neutral conversation into Anthropic's content-block format.
///
/// Tool calls become assistant `tool_use` blocks; tool results become user
/// `tool_result` blocks, which is where Anthropic expects them.
fn build_anthropic_messages(messages: &[Message]) -> Vec<Value> {
    let mut out: Vec<Value> = Vec::with_capacity(messages.len());
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
                let input: Value =
                    serde_json::from_str(&function.arguments).unwrap_or_else(|_| json!({}));
                out.push(json!({
                    "role": "assistant",
                    "content": [{
                        "type": "tool_use",
                        "id": tool_call_id,
                        "name": function.name,
                        "input": input,
                    }],
                }));
            }
            (_, MessageContent::ToolResult {
                tool_call_id,
                content,
            }) => {
                out.push(json!({
                    "role": "user",
                    "content": [{
                        "type": "tool_result",
                        "tool_use_id": tool_call_id,
                        "content": content,
                    }],
                }));
            }
            // A tool-role message with text content should not occur; send it
            // as a user message rather than dropping it.
            (Role::Tool, MessageContent::Text(t)) => {
                out.push(json!({ "role": "user", "content": t }));
            }
        }
    }
    out
}

fn parse_anthropic_response(payload: &Value) -> anyhow::Result<ModelResponse> {
    let mut text = String::new();
    let mut tool_calls = Vec::new();

    let blocks = payload["content"]
        .as_array()
        .context("anthropic response missing content array")?;
    for block in blocks {
        match block["type"].as_str().unwrap_or("") {
            "text" => {
                if let Some(t) = block["text"].as_str() {
                    text.push_str(t);
                }
            }
            "tool_use" => {
                tool_calls.push(ToolInvocation {
                    id: block["id"].as_str().unwrap_or("").to_string(),
                    name: block["name"].as_str().unwrap_or("").to_string(),
                    arguments: block["input"].clone(),
                });
            }
            _ => {}
        }
    }

    let usage = Usage {
        input_tokens: payload["usage"]["input_tokens"].as_u64().unwrap_or(0) as u32,
        output_tokens: payload["usage"]["output_tokens"].as_u64().unwrap_or(0) as u32,
    };

    Ok(ModelResponse {
        text: if text.is_empty() { None } else { Some(text) },
        tool_calls,
        usage,
    })
}

// ─── Unit tests ──────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn tool_result_maps_to_user_block() {
        let msgs = vec![Message::tool_result("call_1", "ok")];
        let out = build_anthropic_messages(&msgs);
        assert_eq!(out[0]["role"], "user");
        assert_eq!(out[0]["content"][0]["type"], "tool_result");
        assert_eq!(out[0]["content"][0]["tool_use_id"], "call_1");
    }

    #[test]
    fn tool_call_maps_to_tool_use_block() {
        let msgs = vec![Message::tool_call("c1", "bash", r#"{"command":"ls"}"#.into())];
        let out = build_anthropic_messages(&msgs);
        assert_eq!(out[0]["role"], "assistant");
        assert_eq!(out[0]["content"][0]["type"], "tool_use");
        assert_eq!(out[0]["content"][0]["input"]["command"], "ls");
    }

    #[test]
    fn parse_response_extracts_text_and_tool_use() {
        let payload = serde_json::json!({
            "content": [
                { "type": "text", "text": "thinking done" },
                { "type": "tool_use", "id": "tu_1", "name": "read_file",
                  "input": { "path": "/tmp/x" } },
            ],
            "usage": { "input_tokens": 12, "output_tokens": 7 },
        });
        let resp = parse_anthropic_response(&payload).unwrap();
        assert_eq!(resp.text.as_deref(), Some("thinking done"));
        assert_eq!(resp.tool_calls.len(), 1);
        assert_eq!(resp.tool_calls[0].name, "read_file");
        assert_eq!(resp.usage.input_tokens, 12);
    }

    #[test]
    fn parse_response_without_content_is_error() {
        let payload = serde_json::json!({ "usage": {} });
        assert!(parse_anthropic_response(&payload).is_err());
    }
}
