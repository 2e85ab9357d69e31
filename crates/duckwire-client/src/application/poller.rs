//! StatusPoller: the async loop that keeps device status fresh while
//! anything long-running is in flight.
//!
//! The loop sends a `status` request each interval, records the reply, and
//! consults the [`PollTracker`] state machine for the continue/stop
//! decision.  Device-reported status lags true completion, so callers that
//! just kicked off an operation use [`PollerHandle::force`] to buy extra
//! polls past the first idle-looking reply.

use std::sync::{Arc, Mutex};
use std::time::Duration;

use duckwire_core::protocol::command::Command;
use tracing::{debug, info};

use crate::domain::status::{ui_blocked, PollDecision, PollTracker, SessionConnectivity};
use crate::infrastructure::link::DeviceLink;

use super::notify::ChangeTracker;

/// Remote control for a running poll loop.
#[derive(Clone)]
pub struct PollerHandle {
    tracker: Arc<Mutex<PollTracker>>,
}

impl PollerHandle {
    /// Requests `n` additional polls beyond the point where status looks
    /// idle.
    pub fn force(&self, n: u32) {
        self.lock().force(n);
    }

    /// The most recently observed status string.
    pub fn current(&self) -> String {
        self.lock().current().to_string()
    }

    /// Whether the latest status marks a long-running condition.
    pub fn busy(&self) -> bool {
        ui_blocked(self.lock().current())
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, PollTracker> {
        self.tracker.lock().expect("poll tracker lock poisoned")
    }
}

/// Fixed-cadence status poll loop over a device link.
pub struct StatusPoller {
    link: Arc<dyn DeviceLink>,
    connectivity: Arc<SessionConnectivity>,
    notifier: Arc<ChangeTracker>,
    tracker: Arc<Mutex<PollTracker>>,
    interval: Duration,
}

impl StatusPoller {
    pub fn new(
        link: Arc<dyn DeviceLink>,
        connectivity: Arc<SessionConnectivity>,
        notifier: Arc<ChangeTracker>,
        interval: Duration,
    ) -> Self {
        Self {
            link,
            connectivity,
            notifier,
            tracker: Arc::new(Mutex::new(PollTracker::new())),
            interval,
        }
    }

    pub fn handle(&self) -> PollerHandle {
        PollerHandle {
            tracker: Arc::clone(&self.tracker),
        }
    }

    /// Polls until no tracked condition holds and the force counter is
    /// spent, or the link drops.
    pub async fn run(&self) {
        info!("status poll loop started");
        loop {
            let status = match self.link.request(Command::Status).await {
                Ok(status) => status,
                Err(error) => {
                    debug!(%error, "status poll ended: link gone");
                    self.notifier.connection(false);
                    break;
                }
            };

            self.connectivity.record_status(&status);
            self.notifier.connection(self.link.is_connected());

            let decision = {
                let mut tracker = self.tracker.lock().expect("poll tracker lock poisoned");
                tracker.observe(&status);
                tracker.tick()
            };
            if decision == PollDecision::Stop {
                debug!(status, "status poll loop done");
                break;
            }

            tokio::time::sleep(self.interval).await;
        }
    }
}

// ───────────────────────────── Tests ─────────────────────────────
