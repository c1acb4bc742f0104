// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: MIT
use clap::{ArgAction, Parser, ValueEnum};
use std::path::PathBuf;

/// Output format for batch mode.
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum FormatArg {
    /// Print only the final agent response.
    Text,
    /// Emit the same NDJSON event stream as server mode.
    Json,
}

#[derive(Parser, Debug)]
#[command(
    name = "miriad",
    version,
    about = "A long-lived coding agent with tiered persistent memory",
    long_about = "miriad runs one prompt in batch mode (-p) or serves a \
                  line-delimited JSON protocol over stdin/stdout (--stdio). \
                  All memory lives in a single SQLite file (--db)."
)]
pub struct Cli {
    /// Run a single prompt in batch mode and exit.
    #[arg(short = 'p', long = "prompt", conflicts_with = "stdio")]
    pub prompt: Option<String>,

    /// Serve the NDJSON protocol on stdin/stdout.
    #[arg(long)]
    pub stdio: bool,

    /// Path to the SQLite memory database.
    #[arg(long, default_value = "miriad.db")]
    pub db: PathBuf,

    /// Batch-mode output format.
    #[arg(long, value_enum, default_value_t = FormatArg::Text)]
    pub format: FormatArg,

    /// Increase stderr log verbosity (-v, -vv).
    #[arg(short, long, action = ArgAction::Count)]
    pub verbose: u8,

    /// Explicit config file path (merged over the discovered layers).
    #[arg(long)]
    pub config: Option<PathBuf>,
}

// ─── Unit tests ──────────────────────────────────────────────────────────────
