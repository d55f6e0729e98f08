//! # Pressure Bench Library
//!
//! A concurrent synthetic-load generator with an online latency and resource
//! analytics engine. A fixed pool of workers issues a call budget against one
//! operation while the library tracks every outcome, the live concurrency
//! depth and process resource use, then reduces it all into percentile and
//! histogram statistics.
//!
//! ## Architecture Overview
//!
//! - `invoker`: the operation under load (`CallInvoker`) and a simulated one
//! - `tracker`: lock-free in-flight and peak concurrency counters
//! - `aggregate`: the mutex-guarded per-run result accumulator
//! - `driver`: worker pool, call budget and run lifecycle
//! - `resources`: start/end process snapshots, CPU usage and leak signal
//! - `stats`: mean, min, max, interpolated percentiles, fixed-bucket histogram
//! - `report`: human-readable (English/Chinese) and JSON output
//! - `cli`, `logging`, `utils`: command line, log formatting, display helpers
//!
//! ## Usage Example
//!
//! ```rust,no_run
//! use pressure_bench::{LoadConfig, LoadDriver, SimulatedInvoker};
//! use std::sync::Arc;
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let config = LoadConfig {
//!         concurrency: 50,
//!         total_calls: 1000,
//!         ..LoadConfig::default()
//!     };
//!     let driver = LoadDriver::new(config, Arc::new(SimulatedInvoker::default()))?;
//!     let report = driver.run().await;
//!
//!     println!("P99 latency: {:?}", report.latency.percentile(0.99));
//!     Ok(())
//! }
//! ```

/// Accumulation of per-call outcomes shared by all workers
pub mod aggregate;

/// Command-line interface and argument parsing
pub mod cli;

/// Worker pool and run orchestration
///
/// Validates the configuration, spawns the workers, waits on the join
/// barrier and assembles the final `RunReport`.
pub mod driver;

/// The operation being measured
pub mod invoker;

/// Log subscriber setup and console formatting
pub mod logging;

/// Human-readable and JSON rendering of a finished run
pub mod report;

/// Process resource snapshots and the derived CPU usage and leak signal
pub mod resources;

/// Latency reduction: mean, min, max, percentiles, histogram
pub mod stats;

/// In-flight and peak concurrency bookkeeping
pub mod tracker;

pub mod utils;

pub use aggregate::{ResultAggregator, RunAggregate};
pub use driver::{ConfigError, LoadConfig, LoadDriver, RunReport};
pub use invoker::{CallInvoker, CallOutcome, ErrorKind, SimulatedInvoker, StatusClass};
pub use resources::{ProcessProbe, ResourceDelta, ResourceProbe, ResourceSnapshot};
pub use stats::{HistogramBucket, HistogramBuckets, LatencyStats};
pub use tracker::ConcurrencyTracker;

/// The current version of the crate, recorded in JSON output.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Default configuration values
pub mod defaults {
    use std::time::Duration;

    /// Default number of concurrent workers
    pub const CONCURRENCY: usize = 100;

    /// Default call budget for a run
    pub const TOTAL_CALLS: usize = 10_000;

    /// Default nominal per-call deadline
    ///
    /// The simulated timeout sleeps 100ms past this value.
    pub const CALL_TIMEOUT: Duration = Duration::from_millis(1500);

    /// Successful calls slower than this count as slow
    pub const SLOW_THRESHOLD: Duration = Duration::from_millis(500);

    /// Task-count growth tolerated before a leak is flagged
    pub const LEAK_TOLERANCE: usize = 5;

    /// Failure probability of the simulated invoker
    pub const ERROR_RATE: f64 = 0.1;

    /// Percentiles reported by default, as fractions
    pub const PERCENTILES: [f64; 3] = [0.5, 0.9, 0.99];

    /// Histogram bucket thresholds in milliseconds
    pub const HISTOGRAM_THRESHOLDS_MS: [u64; 9] = [0, 10, 50, 100, 200, 500, 1000, 2000, 5000];
}
