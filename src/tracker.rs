//! # Concurrency Tracker
//!
//! Lock-free bookkeeping of how many calls are in flight right now and the
//! highest number ever observed during a run.
//!
//! Both counters are plain atomics. They are touched twice per call (once on
//! entry, once on exit), so they are kept outside the aggregate's mutex.
//! Raising the peak uses a compare-and-swap retry loop: a load followed by a
//! store would let two racing callers both "win" and leave a stale peak
//! behind.

use std::sync::atomic::{AtomicUsize, Ordering};

/// Tracks current and peak in-flight calls.
#[derive(Debug, Default)]
pub struct ConcurrencyTracker {
    current: AtomicUsize,
    peak: AtomicUsize,
}

impl ConcurrencyTracker {
    /// Create a tracker with both counters at zero.
    pub fn new() -> Self {
        Self::default()
    }

    /// Mark one call as in flight and return the new current depth.
    pub fn enter(&self) -> usize {
        let now = self.current.fetch_add(1, Ordering::AcqRel) + 1;
        raise_peak(&self.peak, now);
        now
    }

    /// Mark one call as finished.
    ///
    /// Calling `exit` without a matching `enter` is a caller bug; the counter
    /// saturates at zero instead of wrapping.
    pub fn exit(&self) {
        let _ = self
            .current
            .fetch_update(Ordering::AcqRel, Ordering::Acquire, |v| v.checked_sub(1));
    }

    /// Enter and return a guard that exits when dropped.
    pub fn track(&self) -> InFlight<'_> {
        self.enter();
        InFlight { tracker: self }
    }

    /// Number of calls in flight right now.
    ///
    /// ## Returns
    ///
    /// Zero once every worker has joined, unless a guard was leaked.
    pub fn current(&self) -> usize {
        self.current.load(Ordering::Acquire)
    }

    /// Highest in-flight depth observed since the tracker was created.
    ///
    /// Never decreases and never exceeds the number of workers.
    pub fn peak(&self) -> usize {
        self.peak.load(Ordering::Acquire)
    }
}

/// RAII guard for one in-flight call.
#[must_use = "dropping the guard immediately ends the tracked call"]
pub struct InFlight<'a> {
    tracker: &'a ConcurrencyTracker,
}

impl Drop for InFlight<'_> {
    fn drop(&mut self) {
        self.tracker.exit();
    }
}

fn raise_peak(peak: &AtomicUsize, candidate: usize) {
    let mut seen = peak.load(Ordering::Acquire);
    while candidate > seen {
        match peak.compare_exchange_weak(seen, candidate, Ordering::AcqRel, Ordering::Acquire) {
            Ok(_) => return,
            Err(actual) => seen = actual,
        }
    }
}
