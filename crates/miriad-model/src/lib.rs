// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: Apache-2.0
mod anthropic;
mod mock;
mod openai_compat;
mod provider;
mod registry;
mod types;

pub use anthropic::AnthropicProvider;
pub use mock::{MockProvider, ScriptedMockProvider};
pub use openai_compat::OpenAiCompatProvider;
pub use provider::ModelProvider;
pub use registry::from_config;
pub use types::{
    CompletionRequest, FunctionCall, Message, MessageContent, ModelResponse, Role,
    ToolInvocation, ToolSchema, Usage,
};
