// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: Apache-2.0
mod protocol;
mod scheduler;
mod server;

pub use protocol::{frames, ContentBlock, ControlAction, IncomingContent, IncomingMessage, InputFrame};
pub use scheduler::{SchedulerState, Submission, TurnScheduler};
pub use server::{run_batch, run_stdio, BatchFormat};
