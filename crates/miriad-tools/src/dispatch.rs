// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: Apache-2.0
use std::sync::Arc;

use tracing::debug;

use crate::{ToolCall, ToolOutput, ToolRegistry};

/// Name of the internal tool that invalid calls are redirected to.  It never
/// appears in the schemas sent to the model; its "execution" is the error
/// message handed back as an ordinary tool_result so the model can retry.
pub const INVALID_TOOL_NAME: &str = "__invalid_tool_call__";

/// Validating tool dispatcher.
///
/// Two containment rules, both error-as-value:
/// - An unknown tool name or schema-invalid arguments never reach a tool.
///   The call is redirected to [`INVALID_TOOL_NAME`], whose result describes
///   the attempted call and the validation failure.
/// - A tool execution error is caught and rendered as
///   `Error executing tool "X": <message>`.
///
/// Neither case terminates the turn.
pub struct Dispatcher {
    registry: Arc<ToolRegistry>,
}

impl Dispatcher {
    pub fn new(registry: Arc<ToolRegistry>) -> Self {
        Self { registry }
    }

    pub fn registry(&self) -> &ToolRegistry {
        &self.registry
    }

    pub async fn dispatch(&self, call: &ToolCall) -> ToolOutput {
        let Some(tool) = self.registry.get(&call.name) else {
            return self.redirect_invalid(call, &format!("unknown tool: {}", call.name));
        };

        if let Err(validation_error) = self.registry.validate(&call.name, &call.args) {
            return self.redirect_invalid(call, &validation_error);
        }

        debug!(tool = %call.name, call_id = %call.id, "dispatching tool call");
        match tool.execute(&call.args).await {
            Ok(content) => ToolOutput::ok(&call.id, content),
            Err(e) => ToolOutput::err(
                &call.id,
                format!("Error executing tool \"{}\": {e}", call.name),
            ),
        }
    }

    /// Substitute a synthetic call to the internal invalid-call tool.
    fn redirect_invalid(&self, call: &ToolCall, validation_error: &str) -> ToolOutput {
        let args_json =
            serde_json::to_string(&call.args).unwrap_or_else(|_| "<unserializable>".into());
        debug!(
            tool = %call.name,
            error = %validation_error,
            "redirecting invalid tool call to {INVALID_TOOL_NAME}"
        );
        ToolOutput::err(
            &call.id,
            format!(
                "{INVALID_TOOL_NAME}: attempted tool \"{}\" with arguments {} \
                 failed validation: {}. Correct the call and retry.",
                call.name, args_json, validation_error
            ),
        )
    }
}

// ─── Unit tests ──────────────────────────────────────────────────────────────
