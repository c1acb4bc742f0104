// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: Apache-2.0
use serde::{Deserialize, Serialize};

fn default_provider() -> String {
    "anthropic".into()
}
fn default_max_turns() -> u32 {
    50
}
fn default_max_compaction_turns() -> u32 {
    10
}
fn default_max_inner_turns() -> u32 {
    5
}
fn default_temporal_budget() -> usize {
    40_000
}
fn default_compaction_threshold() -> usize {
    60_000
}
fn default_compaction_target() -> usize {
    30_000
}
fn default_max_output_tokens() -> u32 {
    8_192
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub model: ModelConfig,
    #[serde(default)]
    pub agent: AgentConfig,
    #[serde(default)]
    pub budgets: BudgetConfig,
    /// Path to the MCP server configuration file.  Populated from the
    /// `MIRIAD_MCP_CONFIG` environment variable when unset here; consumed by
    /// the MCP client when it registers external tools at startup.
    pub mcp_config: Option<String>,
}

/// Which model serves which part of the runtime.
///
/// The main agent loop runs on `Reasoning`; the compaction agent runs on
/// `Workhorse`; `Fast` is reserved for cheap classification calls.  Unset
/// roles fall back to the previous role so a single `AGENT_MODEL_REASONING`
/// is enough to run everything.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ModelRole {
    Reasoning,
    Workhorse,
    Fast,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ModelConfig {
    /// Provider identifier: "anthropic" | "openai" | "mock".
    /// Overridden by the AGENT_PROVIDER environment variable.
    #[serde(default = "default_provider")]
    pub provider: String,
    /// Model for the main agent loop (AGENT_MODEL_REASONING).
    pub reasoning: Option<String>,
    /// Model for background maintenance such as compaction
    /// (AGENT_MODEL_WORKHORSE).  Falls back to `reasoning`.
    pub workhorse: Option<String>,
    /// Model for cheap classification calls (AGENT_MODEL_FAST).
    /// Falls back to `workhorse`.
    pub fast: Option<String>,
    /// Environment variable that holds the API key (read at runtime).
    pub api_key_env: Option<String>,
    /// Base URL override for OpenAI-compatible endpoints.
    pub base_url: Option<String>,
    /// Maximum tokens to request in a single completion.
    #[serde(default = "default_max_output_tokens")]
    pub max_output_tokens: u32,
    /// Per-request timeout in seconds (0 = no timeout).
    #[serde(default)]
    pub request_timeout_secs: u64,
}

impl Default for ModelConfig {
    fn default() -> Self {
        Self {
            provider: default_provider(),
            reasoning: None,
            workhorse: None,
            fast: None,
            api_key_env: None,
            base_url: None,
            max_output_tokens: default_max_output_tokens(),
            request_timeout_secs: 0,
        }
    }
}

impl ModelConfig {
    /// Resolve the model name for a role, applying the fallback chain
    /// fast → workhorse → reasoning → provider default.
    pub fn model_for(&self, role: ModelRole) -> Option<&str> {
        match role {
            ModelRole::Reasoning => self.reasoning.as_deref(),
            ModelRole::Workhorse => self.workhorse.as_deref().or(self.reasoning.as_deref()),
            ModelRole::Fast => self
                .fast
                .as_deref()
                .or(self.workhorse.as_deref())
                .or(self.reasoning.as_deref()),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AgentConfig {
    /// Maximum model-call iterations in one turn before the loop stops.
    #[serde(default = "default_max_turns")]
    pub max_turns: u32,
    /// Maximum outer iterations of the compaction agent per run.
    #[serde(default = "default_max_compaction_turns")]
    pub max_compaction_turns: u32,
    /// Maximum model calls within one outer compaction iteration.
    #[serde(default = "default_max_inner_turns")]
    pub max_inner_turns: u32,
}

impl Default for AgentConfig {
    fn default() -> Self {
        Self {
            max_turns: default_max_turns(),
            max_compaction_turns: default_max_compaction_turns(),
            max_inner_turns: default_max_inner_turns(),
        }
    }
}

/// Token budgets governing prompt assembly and compaction.
///
/// Each field is overridable through an `AGENT_TOKEN_BUDGET_*` environment
/// variable (see the loader).  All counts use the chars/4 estimator from
/// `miriad-store`, not provider tokenizers.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BudgetConfig {
    /// Token budget for the recent-history view in the system prompt
    /// (AGENT_TOKEN_BUDGET_TEMPORAL).
    #[serde(default = "default_temporal_budget")]
    pub temporal: usize,
    /// Uncompacted-token level that triggers a compaction run
    /// (AGENT_TOKEN_BUDGET_COMPACTION_THRESHOLD).
    #[serde(default = "default_compaction_threshold")]
    pub compaction_threshold: usize,
    /// Uncompacted-token level compaction tries to reach
    /// (AGENT_TOKEN_BUDGET_COMPACTION_TARGET).
    #[serde(default = "default_compaction_target")]
    pub compaction_target: usize,
}

impl Default for BudgetConfig {
    fn default() -> Self {
        Self {
            temporal: default_temporal_budget(),
            compaction_threshold: default_compaction_threshold(),
            compaction_target: default_compaction_target(),
        }
    }
}

// ─── Unit tests ──────────────────────────────────────────────────────────────
