// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: MIT
mod cli;

use std::sync::Arc;

use anyhow::Context;
use clap::Parser;
use tracing_subscriber::{filter::EnvFilter, fmt, prelude::*};

use cli::{Cli, FormatArg};
use miriad_config::ModelRole;
use miriad_core::AgentContext;
use miriad_server::{run_batch, run_stdio, BatchFormat};
use miriad_store::{IdGenerator, Storage};
use miriad_tools::Dispatcher;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    // stdout is the protocol channel in both modes; all diagnostics go to
    // stderr, gated by -v / MIRIAD_LOG.
    init_logging(cli.verbose);

    let config = miriad_config::load(cli.config.as_deref())?;

    let storage = Arc::new(Storage::open(&cli.db).context("opening memory database")?);
    let ids = Arc::new(IdGenerator::new());

    let model = miriad_model::from_config(&config.model, ModelRole::Reasoning)
        .context("constructing model provider")?;
    let compaction_model = miriad_model::from_config(&config.model, ModelRole::Workhorse)
        .context("constructing compaction model provider")?;
    let model_name = model.model_name().to_string();

    let registry = miriad_tools::default_registry(storage.clone());
    let dispatcher = Arc::new(Dispatcher::new(Arc::new(registry)));

    let ctx = Arc::new(AgentContext {
        storage,
        ids,
        model,
        compaction_model,
        dispatcher,
        budgets: config.budgets.clone(),
        agent: config.agent.clone(),
        max_output_tokens: config.model.max_output_tokens,
    });

    if let Some(prompt) = &cli.prompt {
        let format = match cli.format {
            FormatArg::Text => BatchFormat::Text,
            FormatArg::Json => BatchFormat::Json,
        };
        let code = run_batch(ctx, prompt, format, &model_name).await?;
        std::process::exit(code);
    }

    if cli.stdio {
        run_stdio(ctx, model_name).await?;
        return Ok(());
    }

    anyhow::bail!("nothing to do: pass -p <prompt> for batch mode or --stdio for server mode");
}

fn init_logging(verbose: u8) {
    let default_filter = match verbose {
        0 => "warn",
        1 => "info",
        _ => "debug",
    };
    let filter =
        EnvFilter::try_from_env("MIRIAD_LOG").unwrap_or_else(|_| EnvFilter::new(default_filter));
    tracing_subscriber::registry()
        .with(fmt::layer().with_writer(std::io::stderr))
        .with(filter)
        .init();
}
