// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: Apache-2.0
use async_trait::async_trait;

use crate::{CompletionRequest, ModelResponse};

/// A model provider: the opaque `generate(messages, tools)` primitive the
/// runtime is built around.  Responses are complete, never streamed.
#[async_trait]
pub trait ModelProvider: Send + Sync {
    /// Human-readable provider name for status display.
    fn name(&self) -> &str;

    /// Model identifier as reported to users and in NDJSON output.
    fn model_name(&self) -> &str;

    /// Send a completion request and return the full response.
    ///
    /// Timeouts and transport failures surface as errors; the caller maps
    /// them to a turn-level error result.  Cancellation is handled by the
    /// caller dropping this future at a suspension point.
    async fn complete(&self, req: CompletionRequest) -> anyhow::Result<ModelResponse>;
}
