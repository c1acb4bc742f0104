// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: Apache-2.0
use std::collections::VecDeque;
use std::sync::Mutex;

use tokio::sync::oneshot;
use tracing::debug;

/// Scheduler states.  `Draining` exists only between a turn ending and the
/// queue decision; callers observe it through `state()` during that window.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SchedulerState {
    Idle,
    Running,
    Draining,
}

impl SchedulerState {
    pub fn as_str(self) -> &'static str {
        match self {
            SchedulerState::Idle => "idle",
            SchedulerState::Running => "running",
            SchedulerState::Draining => "draining",
        }
    }
}

/// Outcome of submitting a user message.
pub enum Submission {
    /// No turn was running: the caller must start one now, holding the
    /// cancellation receiver for its lifetime.
    StartTurn(oneshot::Receiver<()>),
    /// A turn is running: the message was enqueued at this 1-based position.
    Queued { position: usize },
}

struct Inner {
    state: SchedulerState,
    queue: VecDeque<String>,
    /// Cancellation handle for the current turn.  Dropping it also cancels,
    /// so it stays here until the turn ends or is interrupted.
    cancel: Option<oneshot::Sender<()>>,
    /// Guard: `turn_finished` must not recurse from inside an event callback.
    processing: bool,
}

/// Single-turn-at-a-time gate with a FIFO out-of-turn queue.
///
/// All methods take `&self` and finish without suspending, so every
/// transition is atomic with respect to the cooperative scheduler: a drain
/// observes either all queued messages or none of them.
pub struct TurnScheduler {
    inner: Mutex<Inner>,
}

impl TurnScheduler {
    pub fn new() -> Self {
        Self {
            inner: Mutex::new(Inner {
                state: SchedulerState::Idle,
                queue: VecDeque::new(),
                cancel: None,
                processing: false,
            }),
        }
    }

    pub fn state(&self) -> SchedulerState {
        self.lock().state
    }

    pub fn queue_len(&self) -> usize {
        self.lock().queue.len()
    }

    /// Route an arriving user message: start a turn when idle, enqueue when
    /// one is already running.
    pub fn submit(&self, prompt: String) -> Submission {
        let mut inner = self.lock();
        match inner.state {
            SchedulerState::Idle => {
                let (tx, rx) = oneshot::channel();
                inner.state = SchedulerState::Running;
                inner.cancel = Some(tx);
                Submission::StartTurn(rx)
            }
            SchedulerState::Running | SchedulerState::Draining => {
                inner.queue.push_back(prompt);
                Submission::Queued {
                    position: inner.queue.len(),
                }
            }
        }
    }

    /// Atomically drain every queued message for mid-turn injection.
    ///
    /// Returns the concatenated prompt (joined with blank lines), the number
    /// of messages drained, and the concatenation's length.  The removal is
    /// one step under the lock, so messages arriving afterwards land in the
    /// next drain or the next turn.
    pub fn drain_for_injection(&self) -> Option<(String, usize, usize)> {
        let mut inner = self.lock();
        if inner.queue.is_empty() {
            return None;
        }
        let drained: Vec<String> = inner.queue.drain(..).collect();
        let count = drained.len();
        let joined = drained.join("\n\n");
        let length = joined.len();
        debug!(count, length, "drained queue for mid-turn injection");
        Some((joined, count, length))
    }

    /// Cancel the current turn only.  Returns false when no turn is running.
    pub fn interrupt(&self) -> bool {
        let mut inner = self.lock();
        match inner.cancel.take() {
            Some(tx) => {
                let _ = tx.send(());
                true
            }
            None => false,
        }
    }

    /// The current turn ended (success, error, or cancelled).  Processes the
    /// queue: either hands back the next prompt to run (with a fresh
    /// cancellation receiver) or settles into idle.
    ///
    /// Guarded against re-entrant invocation from event callbacks: a nested
    /// call observes `processing` and backs off without touching the queue.
    pub fn turn_finished(&self) -> Option<(String, oneshot::Receiver<()>)> {
        let mut inner = self.lock();
        if inner.processing {
            debug!("turn_finished re-entered; ignoring nested call");
            return None;
        }
        inner.processing = true;
        inner.cancel = None;
        inner.state = SchedulerState::Draining;

        let next = match inner.queue.pop_front() {
            Some(prompt) => {
                let (tx, rx) = oneshot::channel();
                inner.state = SchedulerState::Running;
                inner.cancel = Some(tx);
                Some((prompt, rx))
            }
            None => {
                inner.state = SchedulerState::Idle;
                None
            }
        };
        inner.processing = false;
        next
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, Inner> {
        self.inner.lock().unwrap_or_else(|p| p.into_inner())
    }
}

impl Default for TurnScheduler {
    fn default() -> Self {
        Self::new()
    }
}

// ─── Unit tests ──────────────────────────────────────────────────────────────
