//! AckCoordinator: FIFO pairing of senders with out-of-band acks.
//!
//! Ack-gated commands (`key_ack <op>` and SD write-stream chunks) are
//! confirmed by out-of-band events (`KEY_ACK:` / `SD_ACK:`) that arrive
//! outside the request/reply queue.  Ack events carry no id, so pairing is
//! strictly FIFO per stream: the oldest registered waiter gets the next
//! ack.  One coordinator instance exists per ack stream.
//!
//! Registration happens *before* the command is enqueued, so an ack that
//! races the enqueue still finds its waiter.  A waiter that times out
//! removes itself from the registry; if the ack arrived in the same
//! instant, the late result is delivered instead of the timeout.

use std::collections::VecDeque;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use duckwire_core::protocol::event::AckStatus;
use duckwire_core::protocol::sequence::SequenceCounter;
use thiserror::Error;
use tokio::sync::oneshot;
use tracing::{debug, trace, warn};

/// Why an acknowledgement wait did not succeed.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum AckError {
    /// No ack arrived within the deadline.
    #[error("no acknowledgement within {timeout:?}")]
    Timeout { timeout: Duration },

    /// The device acknowledged with a failure status.
    #[error("device reported failure: {0}")]
    Device(String),

    /// The wait was cancelled (disconnect or explicit stop).
    #[error("acknowledgement wait cancelled")]
    Cancelled,
}

struct Waiter {
    seq: u64,
    tx: oneshot::Sender<Result<(), AckError>>,
}

struct Registry {
    waiters: VecDeque<Waiter>,
    seq: SequenceCounter,
}

/// FIFO registry of pending acknowledgement waits for one ack stream.
///
/// Cheap to clone; clones share the registry.
#[derive(Clone)]
pub struct AckCoordinator {
    registry: Arc<Mutex<Registry>>,
}

impl Default for AckCoordinator {
    fn default() -> Self {
        Self::new()
    }
}

impl AckCoordinator {
    pub fn new() -> Self {
        Self {
            registry: Arc::new(Mutex::new(Registry {
                waiters: VecDeque::new(),
                seq: SequenceCounter::new(),
            })),
        }
    }

    /// Registers a waiter for the next unclaimed ack.  Call this before
    /// enqueueing the command it gates, then await the ticket.
    pub fn register(&self) -> AckTicket {
        let (tx, rx) = oneshot::channel();
        let seq = {
            let mut reg = self.lock();
            let seq = reg.seq.next();
            reg.waiters.push_back(Waiter { seq, tx });
            seq
        };
        trace!(seq, "ack waiter registered");
        AckTicket {
            seq,
            rx,
            coordinator: self.clone(),
        }
    }

    /// Convenience: register and wait in one call.
    pub async fn wait(&self, timeout: Duration) -> Result<(), AckError> {
        self.register().wait(timeout).await
    }

    /// Delivers one inbound ack to the oldest waiter.
    ///
    /// An ack with no waiter is logged and dropped; it cannot be paired
    /// with anything and must not poison a later wait.
    pub fn on_ack(&self, status: AckStatus) {
        let waiter = self.lock().waiters.pop_front();
        match waiter {
            Some(waiter) => {
                trace!(seq = waiter.seq, "ack delivered");
                let result = match status {
                    AckStatus::Ok => Ok(()),
                    AckStatus::Error(token) => Err(AckError::Device(token)),
                };
                // The waiter may already have timed out and dropped its rx.
                let _ = waiter.tx.send(result);
            }
            None => warn!(?status, "ack with no registered waiter"),
        }
    }

    /// Fails every pending wait with [`AckError::Cancelled`].  Used on
    /// disconnect and on explicit stop.
    pub fn cancel_all(&self) {
        let drained: Vec<Waiter> = self.lock().waiters.drain(..).collect();
        if !drained.is_empty() {
            debug!(count = drained.len(), "cancelling pending ack waits");
        }
        for waiter in drained {
            let _ = waiter.tx.send(Err(AckError::Cancelled));
        }
    }

    /// Number of waits currently registered.
    pub fn pending(&self) -> usize {
        self.lock().waiters.len()
    }

    fn remove(&self, seq: u64) -> bool {
        let mut reg = self.lock();
        let before = reg.waiters.len();
        reg.waiters.retain(|w| w.seq != seq);
        reg.waiters.len() != before
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, Registry> {
        self.registry.lock().expect("ack registry lock poisoned")
    }
}

/// A registered wait for one acknowledgement.
pub struct AckTicket {
    seq: u64,
    rx: oneshot::Receiver<Result<(), AckError>>,
    coordinator: AckCoordinator,
}

impl AckTicket {
    /// Waits for the paired ack, up to `timeout`.
    ///
    /// On timeout the waiter removes itself from the registry so the next
    /// inbound ack pairs with the next waiter, not a dead one.  If the ack
    /// landed concurrently with the deadline the late result wins.
    pub async fn wait(mut self, timeout: Duration) -> Result<(), AckError> {
        match tokio::time::timeout(timeout, &mut self.rx).await {
            Ok(Ok(result)) => result,
            Ok(Err(_)) => Err(AckError::Cancelled),
            Err(_) => {
                if self.coordinator.remove(self.seq) {
                    warn!(seq = self.seq, ?timeout, "ack wait timed out");
                    Err(AckError::Timeout { timeout })
                } else {
                    // Already unregistered: the ack (or a cancellation)
                    // landed in the same instant as the deadline.
                    match self.rx.try_recv() {
                        Ok(result) => result,
                        Err(_) => Err(AckError::Cancelled),
                    }
                }
            }
        }
    }
}

// ───────────────────────────── Tests ─────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_ack_resolves_registered_wait() {
        let acks = AckCoordinator::new();
        let ticket = acks.register();
        acks.on_ack(AckStatus::Ok);
        assert_eq!(ticket.wait(Duration::from_secs(1)).await, Ok(()));
    }

    #[tokio::test]
    async fn test_register_and_wait_in_one_call() {
        let acks = AckCoordinator::new();
        let waiter = tokio::spawn({
            let acks = acks.clone();
            async move { acks.wait(Duration::from_secs(1)).await }
        });
        tokio::task::yield_now().await;
        assert_eq!(acks.pending(), 1);

        acks.on_ack(AckStatus::Ok);
        assert_eq!(waiter.await.unwrap(), Ok(()));
        assert_eq!(acks.pending(), 0);
    }

    #[tokio::test]
    async fn test_error_status_becomes_device_error() {
        let acks = AckCoordinator::new();
        let ticket = acks.register();
        acks.on_ack(AckStatus::Error("BUSY".into()));
        assert_eq!(
            ticket.wait(Duration::from_secs(1)).await,
            Err(AckError::Device("BUSY".into()))
        );
    }

    #[tokio::test]
    async fn test_acks_pair_in_fifo_order() {
        let acks = AckCoordinator::new();
        let first = acks.register();
        let second = acks.register();

        acks.on_ack(AckStatus::Error("FAIL".into()));
        acks.on_ack(AckStatus::Ok);

        assert_eq!(
            first.wait(Duration::from_secs(1)).await,
            Err(AckError::Device("FAIL".into()))
        );
        assert_eq!(second.wait(Duration::from_secs(1)).await, Ok(()));
    }

    #[tokio::test(start_paused = true)]
    async fn test_timeout_unregisters_only_the_expired_wait() {
        let acks = AckCoordinator::new();
        let stale = acks.register();
        let live = acks.register();

        let result = stale.wait(Duration::from_secs(10)).await;
        assert_eq!(
            result,
            Err(AckError::Timeout {
                timeout: Duration::from_secs(10)
            })
        );
        assert_eq!(acks.pending(), 1);

        // The next ack pairs with the surviving waiter.
        acks.on_ack(AckStatus::Ok);
        assert_eq!(live.wait(Duration::from_secs(1)).await, Ok(()));
    }

    #[tokio::test]
    async fn test_cancel_all_fails_every_pending_wait() {
        let acks = AckCoordinator::new();
        let a = acks.register();
        let b = acks.register();

        acks.cancel_all();
        assert_eq!(acks.pending(), 0);
        assert_eq!(
            a.wait(Duration::from_secs(1)).await,
            Err(AckError::Cancelled)
        );
        assert_eq!(
            b.wait(Duration::from_secs(1)).await,
            Err(AckError::Cancelled)
        );
    }

    #[tokio::test]
    async fn test_unclaimed_ack_is_dropped() {
        let acks = AckCoordinator::new();
        // No waiter registered: must not panic or queue anything.
        acks.on_ack(AckStatus::Ok);

        // A later wait is not satisfied by the stale ack.
        let ticket = acks.register();
        acks.on_ack(AckStatus::Error("LATE".into()));
        assert_eq!(
            ticket.wait(Duration::from_secs(1)).await,
            Err(AckError::Device("LATE".into()))
        );
    }

    #[tokio::test]
    async fn test_ack_before_wait_is_not_lost() {
        // Registration happens before enqueue, so an ack can land before
        // the caller starts awaiting.
        let acks = AckCoordinator::new();
        let ticket = acks.register();
        acks.on_ack(AckStatus::Ok);
        tokio::task::yield_now().await;
        assert_eq!(ticket.wait(Duration::from_millis(1)).await, Ok(()));
    }
}
