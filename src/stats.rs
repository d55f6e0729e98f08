//! # Statistics Engine
//!
//! Pure functions over a finished latency collection. Nothing here touches
//! shared state; the driver hands over the latencies after the join barrier.
//!
//! ## Estimators
//!
//! - **mean / min / max**: `Duration::ZERO` for an empty collection
//! - **percentile**: linear interpolation between adjacent sorted values at
//!   fractional rank `k = (n - 1) * p`
//! - **histogram**: fixed ascending thresholds, last bucket open-ended
//!
//! ## Ordering Side Effect
//!
//! [`percentile`] sorts its input in place. Callers that care about
//! completion order must pass a copy. [`LatencyStats::compute`] sorts once
//! and reuses the sorted slice for every requested percentile.

use serde::{Deserialize, Serialize};
use std::time::Duration;
use thiserror::Error;

/// Arithmetic mean, or zero for an empty collection.
pub fn mean(latencies: &[Duration]) -> Duration {
    if latencies.is_empty() {
        return Duration::ZERO;
    }
    let total: u128 = latencies.iter().map(Duration::as_nanos).sum();
    nanos_to_duration(total / latencies.len() as u128)
}

pub fn min(latencies: &[Duration]) -> Duration {
    latencies.iter().copied().min().unwrap_or_default()
}

pub fn max(latencies: &[Duration]) -> Duration {
    latencies.iter().copied().max().unwrap_or_default()
}

/// Interpolated percentile for `p` in `[0, 1]`.
///
/// Sorts `latencies` ascending as a side effect. Out-of-range `p` is clamped.
///
/// ```rust
/// # use pressure_bench::stats::percentile;
/// # use std::time::Duration;
/// let mut v: Vec<Duration> = [10, 20, 30, 40].map(Duration::from_millis).to_vec();
/// assert_eq!(percentile(&mut v, 0.5), Duration::from_millis(25));
/// ```
pub fn percentile(latencies: &mut [Duration], p: f64) -> Duration {
    latencies.sort_unstable();
    percentile_sorted(latencies, p)
}

/// Same as [`percentile`] for an already sorted slice.
pub fn percentile_sorted(sorted: &[Duration], p: f64) -> Duration {
    if sorted.is_empty() {
        return Duration::ZERO;
    }
    let p = if p.is_nan() { 0.0 } else { p.clamp(0.0, 1.0) };

    let rank = (sorted.len() - 1) as f64 * p;
    let lower = rank.floor() as usize;
    let upper = lower + 1;
    if upper >= sorted.len() {
        return sorted[lower];
    }

    let weight = rank - lower as f64;
    let low = sorted[lower].as_nanos() as f64;
    let high = sorted[upper].as_nanos() as f64;
    let value = low * (1.0 - weight) + high * weight;
    // Truncated toward zero; float error can still land a nanosecond outside
    // the neighbours.
    nanos_to_duration(value as u128).clamp(sorted[lower], sorted[upper])
}

fn nanos_to_duration(nanos: u128) -> Duration {
    Duration::from_nanos(u64::try_from(nanos).unwrap_or(u64::MAX))
}

/// Rejected histogram configuration.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum BucketError {
    #[error("histogram needs at least one bucket threshold")]
    Empty,
    #[error("histogram thresholds must be strictly ascending (problem at index {0})")]
    NotAscending(usize),
}

/// Validated, strictly ascending bucket thresholds.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HistogramBuckets {
    thresholds: Vec<Duration>,
}

impl HistogramBuckets {
    pub fn new(thresholds: Vec<Duration>) -> Result<Self, BucketError> {
        if thresholds.is_empty() {
            return Err(BucketError::Empty);
        }
        if let Some(i) = thresholds.windows(2).position(|w| w[0] >= w[1]) {
            return Err(BucketError::NotAscending(i + 1));
        }
        Ok(Self { thresholds })
    }

    pub fn thresholds(&self) -> &[Duration] {
        &self.thresholds
    }

    pub fn len(&self) -> usize {
        self.thresholds.len()
    }

    pub fn is_empty(&self) -> bool {
        self.thresholds.is_empty()
    }
}

impl Default for HistogramBuckets {
    /// 0, 10ms, 50ms, 100ms, 200ms, 500ms, 1s, 2s, 5s
    fn default() -> Self {
        Self {
            thresholds: crate::defaults::HISTOGRAM_THRESHOLDS_MS
                .iter()
                .map(|&ms| Duration::from_millis(ms))
                .collect(),
        }
    }
}

/// One histogram bucket covering `[lower, upper)`; `upper` is `None` for the
/// last, open-ended bucket.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HistogramBucket {
    pub lower: Duration,
    pub upper: Option<Duration>,
    pub count: u64,
}

/// Count latencies per bucket.
///
/// Each latency lands in the highest bucket whose threshold is at or below
/// it. Latencies below the first threshold are counted in the first bucket,
/// so the counts always sum to `latencies.len()`.
pub fn histogram(latencies: &[Duration], buckets: &HistogramBuckets) -> Vec<HistogramBucket> {
    let thresholds = buckets.thresholds();
    let mut counts = vec![0u64; thresholds.len()];

    for latency in latencies {
        let index = thresholds
            .iter()
            .rposition(|threshold| threshold <= latency)
            .unwrap_or(0);
        counts[index] += 1;
    }

    thresholds
        .iter()
        .enumerate()
        .map(|(i, &lower)| HistogramBucket {
            lower,
            upper: thresholds.get(i + 1).copied(),
            count: counts[i],
        })
        .collect()
}

/// A requested percentile and its value.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PercentileValue {
    /// In `[0, 1]`.
    pub percentile: f64,
    pub value: Duration,
}

/// Everything the report needs about the latency distribution.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LatencyStats {
    pub samples: usize,
    pub mean: Duration,
    pub min: Duration,
    pub max: Duration,
    pub percentiles: Vec<PercentileValue>,
    pub histogram: Vec<HistogramBucket>,
}

impl LatencyStats {
    /// Reduce a latency set. Sorts `latencies` in place.
    pub fn compute(
        latencies: &mut [Duration],
        percentiles: &[f64],
        buckets: &HistogramBuckets,
    ) -> Self {
        latencies.sort_unstable();
        let sorted: &[Duration] = latencies;

        Self {
            samples: sorted.len(),
            mean: mean(sorted),
            min: sorted.first().copied().unwrap_or_default(),
            max: sorted.last().copied().unwrap_or_default(),
            percentiles: percentiles
                .iter()
                .map(|&p| PercentileValue {
                    percentile: p,
                    value: percentile_sorted(sorted, p),
                })
                .collect(),
            histogram: histogram(sorted, buckets),
        }
    }

    /// Look up a computed percentile by its rank.
    pub fn percentile(&self, p: f64) -> Option<Duration> {
        self.percentiles
            .iter()
            .find(|v| (v.percentile - p).abs() < 1e-9)
            .map(|v| v.value)
    }
}
