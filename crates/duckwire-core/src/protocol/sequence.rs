//! Local sequence numbering for pending requests and ack waiters.
//!
//! The device protocol itself carries no request ids — reply and ack
//! correlation is strictly positional (FIFO).  That on-wire behavior must
//! not change, because the device firmware depends on it.  Internally,
//! though, the client tags every pending request and every ack waiter with
//! a monotonically increasing id so that:
//!
//! - a timed-out waiter can be removed from the FIFO list without touching
//!   its neighbours, and
//! - log lines about dispatch, reply, and ack can be correlated.

use std::sync::atomic::{AtomicU64, Ordering};

/// A thread-safe, monotonically increasing counter.
///
/// Starts at 0, increments by 1 per [`next`](SequenceCounter::next) call,
/// and wraps at `u64::MAX` without panicking.
#[derive(Debug, Default)]
pub struct SequenceCounter {
    inner: AtomicU64,
}

impl SequenceCounter {
    pub fn new() -> Self {
        Self {
            inner: AtomicU64::new(0),
        }
    }

    /// Returns the next id.
    ///
    /// `Relaxed` ordering suffices: the ids only need to be unique and
    /// increasing, they are never used for cross-thread synchronisation.
    pub fn next(&self) -> u64 {
        self.inner.fetch_add(1, Ordering::Relaxed)
    }

    /// Current value without incrementing, for diagnostics.
    pub fn current(&self) -> u64 {
        self.inner.load(Ordering::Relaxed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::thread;

    #[test]
    fn test_starts_at_zero_and_increments() {
        let counter = SequenceCounter::new();
        assert_eq!(counter.next(), 0);
        assert_eq!(counter.next(), 1);
        assert_eq!(counter.current(), 2);
    }

    #[test]
    fn test_wraps_at_u64_max() {
        let counter = SequenceCounter {
            inner: AtomicU64::new(u64::MAX),
        };
        assert_eq!(counter.next(), u64::MAX);
        assert_eq!(counter.next(), 0);
    }

    #[test]
    fn test_ids_are_unique_across_threads() {
        let counter = Arc::new(SequenceCounter::new());
        let handles: Vec<_> = (0..8)
            .map(|_| {
                let c = Arc::clone(&counter);
                thread::spawn(move || (0..1000).map(|_| c.next()).collect::<Vec<_>>())
            })
            .collect();

        let mut ids: Vec<u64> = handles
            .into_iter()
            .flat_map(|h| h.join().expect("thread panicked"))
            .collect();
        ids.sort_unstable();
        ids.dedup();
        assert_eq!(ids.len(), 8 * 1000, "no two callers may share an id");
    }
}
