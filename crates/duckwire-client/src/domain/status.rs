//! Status tracking: the polling state machine and session connectivity.
//!
//! The device reports its state as a free-form status string (`connected`,
//! `running /payload.ds`, `saving`, `SD_STATUS: writting`, ...).  The
//! client polls `status` at a fixed cadence while anything long-running is
//! in flight, and derives a single "UI should block interactive controls"
//! flag purely from the current string — there is no hidden state behind
//! that decision, it is recomputed on every update.
//!
//! Device-reported status lags the true completion of an operation, so the
//! poller supports a *force counter*: an explicit number of extra polls
//! that keep the loop alive even once conditions look idle.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Mutex;

/// Substrings of the status string that mark a tracked long-running
/// condition: command-in-flight, file save, SD transfer, connecting, or a
/// lost connection.
const TRACKED_CONDITIONS: [&str; 5] =
    ["running", "saving", "SD_STATUS:", "connecting", "disconnected"];

/// Whether interactive controls should be blocked for this status string.
///
/// Derived purely from the string contents; recompute on every update.
pub fn ui_blocked(status: &str) -> bool {
    TRACKED_CONDITIONS.iter().any(|c| status.contains(c))
}

/// Decision returned by [`PollTracker::tick`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PollDecision {
    /// Keep polling at the configured cadence.
    Continue,
    /// No tracked condition holds and the force counter is exhausted.
    Stop,
}

/// The polling state machine.
///
/// Pure bookkeeping — the async loop that actually sends `status` requests
/// lives in the application layer and consults this tracker every tick.
#[derive(Debug, Default)]
pub struct PollTracker {
    current: String,
    force_remaining: u32,
}

impl PollTracker {
    pub fn new() -> Self {
        Self::default()
    }

    /// Records the latest status string.
    pub fn observe(&mut self, status: &str) {
        self.current = status.to_string();
    }

    /// The most recently observed status string.
    pub fn current(&self) -> &str {
        &self.current
    }

    /// Requests `n` additional polls beyond the point where conditions
    /// look idle.  Replaces (does not add to) any outstanding force count.
    pub fn force(&mut self, n: u32) {
        self.force_remaining = n;
    }

    /// Consumes one poll tick and decides whether to continue.
    ///
    /// A forced poll is consumed before the condition check, so the force
    /// counter always buys exactly `n` extra ticks.
    pub fn tick(&mut self) -> PollDecision {
        if self.force_remaining > 0 {
            self.force_remaining -= 1;
            return PollDecision::Continue;
        }
        if ui_blocked(&self.current) {
            PollDecision::Continue
        } else {
            PollDecision::Stop
        }
    }
}

/// Process-wide connectivity snapshot.
///
/// Updated by the transport's open/close events; read by the status poller
/// and the notification collaborator.  All mutation happens on the link's
/// event timeline, so relaxed atomics plus a mutex-guarded string suffice.
#[derive(Debug, Default)]
pub struct SessionConnectivity {
    connected: AtomicBool,
    last_status: Mutex<String>,
}

impl SessionConnectivity {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_connected(&self) -> bool {
        self.connected.load(Ordering::Relaxed)
    }

    /// Flips the connected flag.  Returns true if the value changed, so
    /// callers can fire change-only notifications.
    pub fn set_connected(&self, connected: bool) -> bool {
        self.connected.swap(connected, Ordering::Relaxed) != connected
    }

    pub fn record_status(&self, status: &str) {
        let mut guard = self
            .last_status
            .lock()
            .expect("connectivity lock poisoned");
        *guard = status.to_string();
    }

    pub fn last_status(&self) -> String {
        self.last_status
            .lock()
            .expect("connectivity lock poisoned")
            .clone()
    }
}
