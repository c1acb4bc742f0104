// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: MIT
use std::collections::HashMap;
use std::sync::Arc;

use jsonschema::JSONSchema;
use tracing::warn;

use crate::Tool;

/// A tool schema as handed to the model. Mirrors miriad_model::ToolSchema
/// but keeps the tools crate independent from the model crate.
#[derive(Debug, Clone)]
pub struct ToolSchema {
    pub name: String,
    pub description: String,
    pub parameters: serde_json::Value,
}

struct RegisteredTool {
    tool: Arc<dyn Tool>,
    /// Compiled parameter schema.  `None` when the tool declares a schema
    /// that fails to compile; validation is then skipped for that tool.
    compiled: Option<JSONSchema>,
}

/// Central registry holding all available tools, keyed by name.
/// Parameter schemas are compiled once at registration.
pub struct ToolRegistry {
    tools: HashMap<String, RegisteredTool>,
}

impl ToolRegistry {
    pub fn new() -> Self {
        Self {
            tools: HashMap::new(),
        }
    }

    pub fn register(&mut self, tool: impl Tool + 'static) {
        let schema = tool.parameters_schema();
        let compiled = match JSONSchema::compile(&schema) {
            Ok(c) => Some(c),
            Err(e) => {
                warn!(tool = tool.name(), error = %e, "parameter schema failed to compile");
                None
            }
        };
        self.tools.insert(
            tool.name().to_string(),
            RegisteredTool {
                tool: Arc::new(tool),
                compiled,
            },
        );
    }

    pub fn get(&self, name: &str) -> Option<Arc<dyn Tool>> {
        self.tools.get(name).map(|r| r.tool.clone())
    }

    /// Validate `args` against the tool's compiled schema.
    ///
    /// Returns `Ok(())` for unknown tools too: existence is the
    /// dispatcher's concern, not the validator's.
    pub fn validate(&self, name: &str, args: &serde_json::Value) -> Result<(), String> {
        let Some(registered) = self.tools.get(name) else {
            return Ok(());
        };
        let Some(compiled) = &registered.compiled else {
            return Ok(());
        };
        if let Err(errors) = compiled.validate(args) {
            let rendered: Vec<String> = errors.map(|e| e.to_string()).collect();
            return Err(rendered.join("; "));
        }
        Ok(())
    }

    /// Produce schemas for all registered tools, sorted by name.
    pub fn schemas(&self) -> Vec<ToolSchema> {
        let mut schemas: Vec<ToolSchema> = self
            .tools
            .values()
            .map(|r| ToolSchema {
                name: r.tool.name().to_string(),
                description: r.tool.description().to_string(),
                parameters: r.tool.parameters_schema(),
            })
            .collect();
        schemas.sort_by(|a, b| a.name.cmp(&b.name));
        schemas
    }

    pub fn names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.tools.keys().cloned().collect();
        names.sort();
        names
    }
}

impl Default for ToolRegistry {
    fn default() -> Self {
        Self::new()
    }
}

// ─── Unit tests ──────────────────────────────────────────────────────────────
