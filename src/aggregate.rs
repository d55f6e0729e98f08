//! # Result Aggregator
//!
//! The single piece of shared mutable state during a run.
//!
//! Every worker calls [`ResultAggregator::record`] once per completed call.
//! One `parking_lot::Mutex` guards the whole [`RunAggregate`], so the
//! composite counters can never be observed half-updated. The concurrency
//! counters are deliberately not in here; they live in
//! [`ConcurrencyTracker`](crate::tracker::ConcurrencyTracker) as atomics and
//! are copied in once, after the join barrier, by [`ResultAggregator::finish`].

use crate::invoker::{CallOutcome, ErrorKind, StatusClass};
use crate::tracker::ConcurrencyTracker;
use parking_lot::Mutex;
use serde::Serialize;
use std::collections::BTreeMap;
use std::time::Duration;

/// Everything recorded about a run.
///
/// Invariants once a run has finished:
/// - `failures + successes() == total_calls()`
/// - `peak_concurrency >= current_concurrency`
/// - status counts sum to `successes()`, error counts sum to `failures`
#[derive(Debug, Clone, Default, Serialize)]
pub struct RunAggregate {
    /// Latencies of successful calls, in completion order.
    #[serde(skip)]
    pub latencies: Vec<Duration>,
    pub failures: u64,
    pub slow_calls: u64,
    pub peak_concurrency: usize,
    pub current_concurrency: usize,
    pub bytes_transferred: u64,
    pub status_counts: BTreeMap<u16, u64>,
    pub error_counts: BTreeMap<ErrorKind, u64>,
}

impl RunAggregate {
    /// Number of successful calls, equal to the number of recorded latencies.
    pub fn successes(&self) -> u64 {
        self.latencies.len() as u64
    }

    /// Every completed call, successful or not.
    pub fn total_calls(&self) -> u64 {
        self.successes() + self.failures
    }

    /// Fraction of calls that succeeded, as a percentage. Zero for an empty run.
    pub fn success_rate(&self) -> f64 {
        let total = self.total_calls();
        if total == 0 {
            return 0.0;
        }
        self.successes() as f64 / total as f64 * 100.0
    }

    /// Slow calls as a percentage of successful calls.
    pub fn slow_call_rate(&self) -> f64 {
        let successes = self.successes();
        if successes == 0 {
            return 0.0;
        }
        self.slow_calls as f64 / successes as f64 * 100.0
    }

    /// Successful calls grouped by the class of their status code.
    ///
    /// Classes with no calls are omitted.
    pub fn status_class_counts(&self) -> BTreeMap<StatusClass, u64> {
        let mut classes = BTreeMap::new();
        for (&code, &count) in &self.status_counts {
            *classes.entry(StatusClass::from_code(code)).or_insert(0) += count;
        }
        classes
    }

    fn apply(&mut self, outcome: CallOutcome, slow_threshold: Duration) {
        if outcome.is_success() {
            if outcome.latency > slow_threshold {
                self.slow_calls += 1;
            }
            self.latencies.push(outcome.latency);
            self.bytes_transferred += outcome.bytes;
            *self.status_counts.entry(outcome.status).or_insert(0) += 1;
        } else {
            self.failures += 1;
            let kind = outcome.error.unwrap_or(ErrorKind::Unknown);
            *self.error_counts.entry(kind).or_insert(0) += 1;
        }
    }
}

/// Thread-safe accumulator shared by all workers.
#[derive(Debug)]
pub struct ResultAggregator {
    slow_threshold: Duration,
    inner: Mutex<RunAggregate>,
}

impl ResultAggregator {
    /// Create an empty aggregator.
    ///
    /// ## Parameters
    ///
    /// - `slow_threshold`: successful calls strictly slower than this are
    ///   counted in `slow_calls`
    pub fn new(slow_threshold: Duration) -> Self {
        Self::with_capacity(slow_threshold, 0)
    }

    /// Pre-size the latency buffer for the expected number of calls.
    pub fn with_capacity(slow_threshold: Duration, expected_calls: usize) -> Self {
        Self {
            slow_threshold,
            inner: Mutex::new(RunAggregate {
                latencies: Vec::with_capacity(expected_calls),
                ..RunAggregate::default()
            }),
        }
    }

    /// Record one completed call.
    pub fn record(&self, outcome: CallOutcome) {
        self.inner.lock().apply(outcome, self.slow_threshold);
    }

    /// Consume the aggregator once every writer has gone away.
    ///
    /// Must only be called after the join barrier; the tracker's counters are
    /// copied in at this point.
    pub fn finish(self, tracker: &ConcurrencyTracker) -> RunAggregate {
        with_concurrency(self.inner.into_inner(), tracker)
    }

    /// Copy of the aggregate so far, for when the aggregator cannot be consumed.
    pub fn snapshot(&self, tracker: &ConcurrencyTracker) -> RunAggregate {
        with_concurrency(self.inner.lock().clone(), tracker)
    }
}

fn with_concurrency(mut aggregate: RunAggregate, tracker: &ConcurrencyTracker) -> RunAggregate {
    aggregate.current_concurrency = tracker.current();
    aggregate.peak_concurrency = tracker.peak().max(aggregate.current_concurrency);
    aggregate
}
