// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: MIT
use std::path::{Path, PathBuf};

use anyhow::Context;
use tracing::debug;

use crate::{Config, ModelRole};

/// Ordered list of config file locations searched from lowest to highest priority.
/// Later files override earlier ones.
fn config_search_paths() -> Vec<PathBuf> {
    let mut paths = Vec::new();

    // 1. System-wide default
    paths.push(PathBuf::from("/etc/miriad/config.yaml"));
    paths.push(PathBuf::from("/etc/miriad/config.yml"));

    // 2. XDG / home
    if let Some(home) = dirs::home_dir() {
        paths.push(home.join(".config/miriad/config.yaml"));
        paths.push(home.join(".config/miriad/config.yml"));
    }
    if let Some(cfg) = dirs::config_dir() {
        paths.push(cfg.join("miriad/config.yaml"));
        paths.push(cfg.join("miriad/config.yml"));
    }

    // 3. Workspace-local
    paths.push(PathBuf::from(".miriad/config.yaml"));
    paths.push(PathBuf::from(".miriad/config.yml"));
    paths.push(PathBuf::from(".miriad.yaml"));
    paths.push(PathBuf::from(".miriad.yml"));

    paths
}

/// Load configuration by merging all discovered YAML files, then applying
/// environment overrides.  The `extra` argument may provide an explicit path
/// (e.g. a `--config` CLI flag).
pub fn load(extra: Option<&Path>) -> anyhow::Result<Config> {
    let mut merged = serde_yaml::Value::Mapping(serde_yaml::Mapping::new());

    for path in config_search_paths() {
        if path.is_file() {
            debug!(path = %path.display(), "loading config layer");
            let text = std::fs::read_to_string(&path)
                .with_context(|| format!("reading {}", path.display()))?;
            let layer: serde_yaml::Value = serde_yaml::from_str(&text)
                .with_context(|| format!("parsing {}", path.display()))?;
            merge_yaml(&mut merged, layer);
        }
    }

    if let Some(p) = extra {
        debug!(path = %p.display(), "loading explicit config");
        let text =
            std::fs::read_to_string(p).with_context(|| format!("reading {}", p.display()))?;
        let layer: serde_yaml::Value =
            serde_yaml::from_str(&text).with_context(|| format!("parsing {}", p.display()))?;
        merge_yaml(&mut merged, layer);
    }

    let mut config: Config = if matches!(merged, serde_yaml::Value::Mapping(ref m) if m.is_empty())
    {
        Config::default()
    } else {
        serde_yaml::from_value(merged).unwrap_or_default()
    };

    apply_env_overrides(&mut config);
    Ok(config)
}

/// Environment variables take priority over every config file layer.
///
/// `AGENT_PROVIDER`, `AGENT_MODEL_{REASONING,WORKHORSE,FAST}`, the
/// `AGENT_TOKEN_BUDGET_*` family, and `MIRIAD_MCP_CONFIG`.
fn apply_env_overrides(config: &mut Config) {
    if let Ok(provider) = std::env::var("AGENT_PROVIDER") {
        if !provider.is_empty() {
            config.model.provider = provider;
        }
    }
    for (var, role) in [
        ("AGENT_MODEL_REASONING", ModelRole::Reasoning),
        ("AGENT_MODEL_WORKHORSE", ModelRole::Workhorse),
        ("AGENT_MODEL_FAST", ModelRole::Fast),
    ] {
        if let Ok(name) = std::env::var(var) {
            if !name.is_empty() {
                match role {
                    ModelRole::Reasoning => config.model.reasoning = Some(name),
                    ModelRole::Workhorse => config.model.workhorse = Some(name),
                    ModelRole::Fast => config.model.fast = Some(name),
                }
            }
        }
    }

    if let Some(v) = env_usize("AGENT_TOKEN_BUDGET_TEMPORAL") {
        config.budgets.temporal = v;
    }
    if let Some(v) = env_usize("AGENT_TOKEN_BUDGET_COMPACTION_THRESHOLD") {
        config.budgets.compaction_threshold = v;
    }
    if let Some(v) = env_usize("AGENT_TOKEN_BUDGET_COMPACTION_TARGET") {
        config.budgets.compaction_target = v;
    }
    if let Some(v) = env_usize("AGENT_TOKEN_BUDGET_MAX_OUTPUT") {
        config.model.max_output_tokens = v as u32;
    }

    if config.mcp_config.is_none() {
        if let Ok(path) = std::env::var("MIRIAD_MCP_CONFIG") {
            if !path.is_empty() {
                config.mcp_config = Some(path);
            }
        }
    }
}

fn env_usize(var: &str) -> Option<usize> {
    match std::env::var(var) {
        Ok(s) => match s.parse::<usize>() {
            Ok(v) => Some(v),
            Err(_) => {
                debug!(var, value = %s, "ignoring non-numeric token budget override");
                None
            }
        },
        Err(_) => None,
    }
}

/// Deep-merge `src` into `dst`; src wins on scalar conflicts.
fn merge_yaml(dst: &mut serde_yaml::Value, src: serde_yaml::Value) {
    match (dst, src) {
        (serde_yaml::Value::Mapping(d), serde_yaml::Value::Mapping(s)) => {
            for (k, v) in s {
                let entry = d
                    .entry(k)
                    .or_insert(serde_yaml::Value::Mapping(serde_yaml::Mapping::new()));
                merge_yaml(entry, v);
            }
        }
        (dst, src) => *dst = src,
    }
}

// ─── Unit tests ──────────────────────────────────────────────────────────────
