// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: MIT
use std::sync::Mutex;

use ulid::Ulid;

/// Type prefix for a minted identifier.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IdPrefix {
    Message,
    Summary,
    Worker,
    Session,
}

impl IdPrefix {
    fn as_str(self) -> &'static str {
        match self {
            IdPrefix::Message => "message",
            IdPrefix::Summary => "summary",
            IdPrefix::Worker => "worker",
            IdPrefix::Session => "session",
        }
    }
}

/// Mints lexicographically sortable identifiers of the form
/// `<prefix>_<ULID>`.
///
/// The underlying ULID generator is monotonic: two ids minted within the
/// same millisecond still sort in mint order, which the temporal log relies
/// on for range queries over string ids.  Randomness in the low bits makes
/// collisions across process restarts astronomically unlikely.
pub struct IdGenerator {
    inner: Mutex<ulid::Generator>,
}

impl IdGenerator {
    pub fn new() -> Self {
        Self {
            inner: Mutex::new(ulid::Generator::new()),
        }
    }

    pub fn mint(&self, prefix: IdPrefix) -> String {
        let ulid = self.next_ulid();
        format!("{}_{}", prefix.as_str(), ulid)
    }

    fn next_ulid(&self) -> Ulid {
        let mut gen = self.inner.lock().unwrap_or_else(|p| p.into_inner());
        loop {
            match gen.generate() {
                Ok(u) => return u,
                // The random component overflowed within this millisecond;
                // wait for the clock to tick and try again.
                Err(_) => std::thread::sleep(std::time::Duration::from_micros(100)),
            }
        }
    }
}

impl Default for IdGenerator {
    fn default() -> Self {
        Self::new()
    }
}

// ─── Unit tests ──────────────────────────────────────────────────────────────
