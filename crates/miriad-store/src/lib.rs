// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: Apache-2.0
mod db;
mod error;
mod id;
mod ltm;
mod present;
mod temporal;
mod tokens;
mod workers;

pub use db::Storage;
pub use error::{Result, StoreError};
pub use id::{IdGenerator, IdPrefix};
pub use ltm::{LtmEntry, SearchHit};
pub use present::{PresentState, Task, TaskStatus};
pub use temporal::{select_cover, MessageKind, TemporalMessage, TemporalSummary};
pub use tokens::estimate_tokens;
pub use workers::{WorkerRecord, WorkerStatus, WorkerType};
