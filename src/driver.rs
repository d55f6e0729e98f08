//! # Load Driver
//!
//! Owns the worker pool and the run lifecycle.
//!
//! ## Run Lifecycle
//!
//! 1. **Validation**: zero workers or zero calls is rejected before anything
//!    is spawned
//! 2. **Warmup**: optional unrecorded calls, issued sequentially
//! 3. **Opening snapshot**: resource probe reading
//! 4. **Measurement**: `concurrency` tokio tasks, each running
//!    `total_calls / concurrency` calls back to back
//! 5. **Join barrier**: every worker is awaited before the aggregate is read
//! 6. **Closing snapshot and reduction**: resource delta and latency stats
//!
//! ## Shared State
//!
//! Workers share exactly two things: the [`ResultAggregator`] (one mutex for
//! the whole composite) and the [`ConcurrencyTracker`] (two independent
//! atomics, hit twice per call). The join barrier is the only ordering
//! between those writers and the single reader that follows.
//!
//! ## Call Budget
//!
//! Calls are split by integer division. When `total_calls` is not a multiple
//! of `concurrency` the remainder is not issued: 100 calls over 7 workers
//! records 98 outcomes.

use crate::aggregate::{ResultAggregator, RunAggregate};
use crate::cli::Args;
use crate::invoker::CallInvoker;
use crate::resources::{self, ProcessProbe, ResourceDelta, ResourceProbe};
use crate::stats::{BucketError, HistogramBuckets, LatencyStats};
use crate::tracker::ConcurrencyTracker;
use serde::Serialize;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};
use thiserror::Error;
use tokio::task::JoinSet;
use tracing::{debug, info, warn};

/// Precondition violations caught before a run starts.
#[derive(Debug, Error, PartialEq)]
pub enum ConfigError {
    #[error("concurrency must be greater than zero")]
    ZeroConcurrency,
    #[error("total calls must be greater than zero")]
    ZeroCalls,
    #[error("percentile {0} is outside [0, 1]")]
    PercentileOutOfRange(f64),
    #[error(transparent)]
    Buckets(#[from] BucketError),
}

/// Parameters of one load run.
#[derive(Debug, Clone, Serialize)]
pub struct LoadConfig {
    /// Number of workers.
    pub concurrency: usize,
    /// Call budget shared by all workers.
    pub total_calls: usize,
    /// Nominal per-call deadline handed to the invoker.
    pub call_timeout: Duration,
    /// Successful calls slower than this are counted as slow.
    pub slow_threshold: Duration,
    /// Allowed task-count growth before a leak is flagged.
    pub leak_tolerance: usize,
    /// Unrecorded calls issued before measurement.
    pub warmup_calls: usize,
    /// Percentiles to report, each in `[0, 1]`.
    pub percentiles: Vec<f64>,
    #[serde(skip)]
    pub buckets: HistogramBuckets,
}

impl Default for LoadConfig {
    fn default() -> Self {
        use crate::defaults;
        Self {
            concurrency: defaults::CONCURRENCY,
            total_calls: defaults::TOTAL_CALLS,
            call_timeout: defaults::CALL_TIMEOUT,
            slow_threshold: defaults::SLOW_THRESHOLD,
            leak_tolerance: defaults::LEAK_TOLERANCE,
            warmup_calls: 0,
            percentiles: defaults::PERCENTILES.to_vec(),
            buckets: HistogramBuckets::default(),
        }
    }
}

impl LoadConfig {
    /// Build a configuration from parsed command-line arguments.
    ///
    /// Percentiles on the command line are given in percent (`99` for P99).
    pub fn from_args(args: &Args) -> Result<Self, ConfigError> {
        let config = Self {
            concurrency: args.concurrency,
            total_calls: args.total_calls,
            call_timeout: args.timeout,
            slow_threshold: args.slow_threshold,
            leak_tolerance: args.leak_tolerance,
            warmup_calls: args.warmup_calls,
            percentiles: args.percentiles.iter().map(|p| p / 100.0).collect(),
            buckets: HistogramBuckets::new(
                args.histogram_ms
                    .iter()
                    .map(|&ms| Duration::from_millis(ms))
                    .collect(),
            )?,
        };
        config.validate()?;
        Ok(config)
    }

    /// Check the preconditions of a run.
    ///
    /// ## Returns
    ///
    /// The first violation found: zero workers, zero calls, or a percentile
    /// outside `[0, 1]` (NaN included).
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.concurrency == 0 {
            return Err(ConfigError::ZeroConcurrency);
        }
        if self.total_calls == 0 {
            return Err(ConfigError::ZeroCalls);
        }
        if let Some(&p) = self
            .percentiles
            .iter()
            .find(|p| !(0.0..=1.0).contains(*p))
        {
            return Err(ConfigError::PercentileOutOfRange(p));
        }
        Ok(())
    }

    /// Calls each worker issues: `total_calls / concurrency`, rounded down.
    ///
    /// Only meaningful on a validated configuration; `concurrency` must be
    /// non-zero.
    pub fn calls_per_worker(&self) -> usize {
        self.total_calls / self.concurrency
    }

    /// Calls actually issued after truncation.
    pub fn effective_calls(&self) -> usize {
        self.calls_per_worker() * self.concurrency
    }
}

/// Everything a finished run produced. Read-only input for reporting.
#[derive(Debug, Clone, Serialize)]
pub struct RunReport {
    pub invoker: &'static str,
    pub config: LoadConfig,
    pub duration: Duration,
    pub aggregate: RunAggregate,
    pub latency: LatencyStats,
    pub resources: ResourceDelta,
}

impl RunReport {
    /// Completed calls per second of wall time.
    pub fn calls_per_second(&self) -> f64 {
        per_second(self.aggregate.total_calls() as f64, self.duration)
    }

    /// Bytes per second of wall time.
    pub fn bytes_per_second(&self) -> f64 {
        per_second(self.aggregate.bytes_transferred as f64, self.duration)
    }
}

fn per_second(amount: f64, duration: Duration) -> f64 {
    let secs = duration.as_secs_f64();
    if secs > 0.0 {
        amount / secs
    } else {
        0.0
    }
}

/// Drives a fixed pool of workers against one invoker.
pub struct LoadDriver {
    config: LoadConfig,
    invoker: Arc<dyn CallInvoker>,
    probe: Arc<dyn ResourceProbe>,
    live_workers: Arc<AtomicUsize>,
    parallelism: usize,
}

impl LoadDriver {
    /// Create a driver measuring the current process.
    ///
    /// Fails fast on an invalid configuration.
    pub fn new(config: LoadConfig, invoker: Arc<dyn CallInvoker>) -> Result<Self, ConfigError> {
        config.validate()?;
        let live_workers = Arc::new(AtomicUsize::new(0));
        let probe = Arc::new(ProcessProbe::new(Arc::clone(&live_workers)));
        Ok(Self {
            config,
            invoker,
            probe,
            live_workers,
            parallelism: num_cpus::get(),
        })
    }

    /// Replace the resource probe.
    pub fn with_probe(mut self, probe: Arc<dyn ResourceProbe>) -> Self {
        self.probe = probe;
        self
    }

    /// Override the CPU count used to normalize CPU usage.
    pub fn with_parallelism(mut self, parallelism: usize) -> Self {
        self.parallelism = parallelism.max(1);
        self
    }

    /// The validated configuration this driver runs with.
    pub fn config(&self) -> &LoadConfig {
        &self.config
    }

    /// Number of workers currently running.
    pub fn live_workers(&self) -> usize {
        self.live_workers.load(Ordering::Acquire)
    }

    /// Execute the run.
    ///
    /// Individual call failures and panicking workers are recorded or logged;
    /// they never abort the run.
    pub async fn run(&self) -> RunReport {
        let config = &self.config;
        let calls_per_worker = config.calls_per_worker();
        let dropped = config.total_calls - config.effective_calls();
        if dropped > 0 {
            warn!(
                "{} calls do not divide evenly over {} workers; {} calls will not be issued",
                config.total_calls, config.concurrency, dropped
            );
        }

        if config.warmup_calls > 0 {
            info!("Running warmup with {} calls", config.warmup_calls);
            for _ in 0..config.warmup_calls {
                self.invoker.invoke(config.call_timeout).await;
            }
        }

        let opening = resources::snapshot(self.probe.as_ref());
        let tracker = Arc::new(ConcurrencyTracker::new());
        let aggregator = Arc::new(ResultAggregator::with_capacity(
            config.slow_threshold,
            config.effective_calls(),
        ));

        info!(
            "Starting {} workers x {} calls against '{}'",
            config.concurrency,
            calls_per_worker,
            self.invoker.name()
        );

        let started = Instant::now();
        let mut workers = JoinSet::new();
        for worker_id in 0..config.concurrency {
            let worker = Worker {
                id: worker_id,
                calls: calls_per_worker,
                deadline: config.call_timeout,
                invoker: Arc::clone(&self.invoker),
                tracker: Arc::clone(&tracker),
                aggregator: Arc::clone(&aggregator),
                live: LiveWorker::enter(&self.live_workers),
            };
            workers.spawn(worker.run());
        }

        while let Some(joined) = workers.join_next().await {
            if let Err(e) = joined {
                warn!("Worker terminated abnormally: {}", e);
            }
        }
        let duration = started.elapsed();

        // A joined task can still be counted alive until the runtime has
        // finished releasing it; one yield lets that settle.
        tokio::task::yield_now().await;
        let closing = resources::snapshot(self.probe.as_ref());
        let resources =
            ResourceDelta::between(&opening, &closing, self.parallelism, config.leak_tolerance);

        // Every worker has joined, so this should be the last owner.
        let mut aggregate = match Arc::try_unwrap(aggregator) {
            Ok(aggregator) => aggregator.finish(&tracker),
            Err(shared) => {
                warn!("Aggregator still shared after join; copying its contents");
                shared.snapshot(&tracker)
            }
        };

        let mut latencies = std::mem::take(&mut aggregate.latencies);
        let latency = LatencyStats::compute(&mut latencies, &config.percentiles, &config.buckets);
        aggregate.latencies = latencies;

        info!(
            "Run finished in {:?}: {} calls, {} failures, peak concurrency {}",
            duration,
            aggregate.total_calls(),
            aggregate.failures,
            aggregate.peak_concurrency
        );
        if resources.leak_detected {
            warn!(
                "Task count grew from {} to {} (tolerance {})",
                resources.start_tasks, resources.end_tasks, resources.leak_tolerance
            );
        }

        RunReport {
            invoker: self.invoker.name(),
            config: config.clone(),
            duration,
            aggregate,
            latency,
            resources,
        }
    }
}

struct Worker {
    id: usize,
    calls: usize,
    deadline: Duration,
    invoker: Arc<dyn CallInvoker>,
    tracker: Arc<ConcurrencyTracker>,
    aggregator: Arc<ResultAggregator>,
    live: LiveWorker,
}

impl Worker {
    async fn run(self) {
        debug!("Worker {} starting {} calls", self.id, self.calls);
        for _ in 0..self.calls {
            let outcome = {
                let _in_flight = self.tracker.track();
                self.invoker.invoke(self.deadline).await
            };
            self.aggregator.record(outcome);
        }
        debug!("Worker {} done", self.id);
        drop(self.live);
    }
}

/// Keeps the driver's live-worker count in step with spawned workers, even
/// when a worker panics.
struct LiveWorker(Arc<AtomicUsize>);

impl LiveWorker {
    fn enter(counter: &Arc<AtomicUsize>) -> Self {
        counter.fetch_add(1, Ordering::AcqRel);
        Self(Arc::clone(counter))
    }
}

impl Drop for LiveWorker {
    fn drop(&mut self) {
        self.0.fetch_sub(1, Ordering::AcqRel);
    }
}
