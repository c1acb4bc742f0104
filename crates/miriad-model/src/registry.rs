// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: Apache-2.0
use std::sync::Arc;

use anyhow::bail;

use miriad_config::{ModelConfig, ModelRole};

use crate::{AnthropicProvider, MockProvider, ModelProvider, OpenAiCompatProvider};

/// Canonical API-key environment variable per provider, used when the config
/// does not name one explicitly.
fn default_key_env(provider: &str) -> Option<&'static str> {
    match provider {
        "anthropic" => Some("ANTHROPIC_API_KEY"),
        "openai" => Some("OPENAI_API_KEY"),
        _ => None,
    }
}

/// Default model per provider and role, used when the config names none.
fn default_model(provider: &str, role: ModelRole) -> &'static str {
    match (provider, role) {
        ("anthropic", ModelRole::Reasoning) => "claude-sonnet-4-5",
        ("anthropic", ModelRole::Workhorse) => "claude-sonnet-4-5",
        ("anthropic", ModelRole::Fast) => "claude-haiku-4-5",
        ("openai", ModelRole::Fast) => "gpt-4o-mini",
        ("openai", _) => "gpt-4o",
        _ => "mock-model",
    }
}

/// Construct a provider for the given role from the model configuration.
///
/// The role picks the model name (with the fast → workhorse → reasoning
/// fallback chain); the provider string picks the adapter.
pub fn from_config(config: &ModelConfig, role: ModelRole) -> anyhow::Result<Arc<dyn ModelProvider>> {
    let model = config
        .model_for(role)
        .map(String::from)
        .unwrap_or_else(|| default_model(&config.provider, role).to_string());

    let api_key = config
        .api_key_env
        .as_deref()
        .or_else(|| default_key_env(&config.provider))
        .and_then(|var| std::env::var(var).ok())
        .filter(|k| !k.is_empty());

    match config.provider.as_str() {
        "anthropic" => Ok(Arc::new(AnthropicProvider::new(
            model,
            api_key,
            config.base_url.clone(),
            config.request_timeout_secs,
        ))),
        "openai" => Ok(Arc::new(OpenAiCompatProvider::new(
            model,
            api_key,
            config.base_url.clone(),
            config.request_timeout_secs,
        ))),
        "mock" => Ok(Arc::new(MockProvider)),
        other => bail!("unknown provider: {other}"),
    }
}

// ─── Unit tests ──────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn mock_provider_resolves() {
        let cfg = ModelConfig {
            provider: "mock".into(),
            ..ModelConfig::default()
        };
        let p = from_config(&cfg, ModelRole::Reasoning).unwrap();
        assert_eq!(p.name(), "mock");
    }

    #[test]
    fn unknown_provider_is_rejected() {
        let cfg = ModelConfig {
            provider: "carrier-pigeon".into(),
            ..ModelConfig::default()
        };
        assert!(from_config(&cfg, ModelRole::Reasoning).is_err());
    }

    #[test]
    fn anthropic_uses_configured_model_name() {
        let cfg = ModelConfig {
            provider: "anthropic".into(),
            reasoning: Some("claude-test".into()),
            ..ModelConfig::default()
        };
        let p = from_config(&cfg, ModelRole::Reasoning).unwrap();
        assert_eq!(p.model_name(), "claude-test");
    }

    #[test]
    fn workhorse_falls_back_to_reasoning_model() {
        let cfg = ModelConfig {
            provider: "anthropic".into(),
            reasoning: Some("claude-test".into()),
            ..ModelConfig::default()
        };
        let p = from_config(&cfg, ModelRole::Workhorse).unwrap();
        assert_eq!(p.model_name(), "claude-test");
    }
}
