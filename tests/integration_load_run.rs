use anyhow::Result;
use async_trait::async_trait;
use pressure_bench::{
    CallInvoker, CallOutcome, ConfigError, ErrorKind, LoadConfig, LoadDriver, ResourceProbe,
};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

/// Succeeds immediately after yielding once so workers interleave.
struct Yielding;

#[async_trait]
impl CallInvoker for Yielding {
    async fn invoke(&self, _deadline: Duration) -> CallOutcome {
        tokio::task::yield_now().await;
        CallOutcome::success(Duration::ZERO, 200, 16)
    }

    fn name(&self) -> &'static str {
        "yielding"
    }
}

/// Fails every third call with a connection error.
#[derive(Default)]
struct Flaky {
    calls: AtomicUsize,
}

#[async_trait]
impl CallInvoker for Flaky {
    async fn invoke(&self, _deadline: Duration) -> CallOutcome {
        let n = self.calls.fetch_add(1, Ordering::Relaxed);
        if n % 3 == 0 {
            CallOutcome::failure(Duration::from_millis(1), 502, ErrorKind::Connection)
        } else {
            CallOutcome::success(Duration::from_millis(2), 200, 1)
        }
    }

    fn name(&self) -> &'static str {
        "flaky"
    }
}

/// Reports a small task count on the first reading and a large one after.
#[derive(Default)]
struct GrowingTasks {
    readings: AtomicUsize,
}

impl ResourceProbe for GrowingTasks {
    fn task_count(&self) -> usize {
        if self.readings.fetch_add(1, Ordering::Relaxed) == 0 {
            2
        } else {
            20
        }
    }

    fn cpu_time(&self) -> Duration {
        Duration::ZERO
    }

    fn gc_cycles(&self) -> u64 {
        0
    }
}

fn config(concurrency: usize, total_calls: usize) -> LoadConfig {
    LoadConfig {
        concurrency,
        total_calls,
        ..LoadConfig::default()
    }
}

/// Ten workers sharing a thousand calls complete all of them without
/// exceeding the pool size.
#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn full_budget_is_issued_and_bounded_by_pool() -> Result<()> {
    let driver = LoadDriver::new(config(10, 1000), Arc::new(Yielding))?;
    let report = driver.run().await;

    assert_eq!(report.aggregate.total_calls(), 1000);
    assert_eq!(report.aggregate.failures, 0);
    assert_eq!(report.latency.samples, 1000);
    assert!(report.aggregate.peak_concurrency >= 1);
    assert!(report.aggregate.peak_concurrency <= 10);
    assert_eq!(report.aggregate.current_concurrency, 0);
    assert_eq!(report.aggregate.bytes_transferred, 16_000);
    assert_eq!(report.invoker, "yielding");
    assert_eq!(driver.live_workers(), 0);
    Ok(())
}

/// A budget that does not divide evenly loses its remainder.
#[tokio::test]
async fn uneven_budget_drops_remainder() -> Result<()> {
    let driver = LoadDriver::new(config(7, 100), Arc::new(Yielding))?;
    let report = driver.run().await;

    assert_eq!(report.aggregate.total_calls(), 98);
    assert_eq!(report.config.effective_calls(), 98);
    Ok(())
}

/// Failed calls are counted and classified but never enter the latency set.
#[tokio::test]
async fn failures_are_counted_not_measured() -> Result<()> {
    let driver = LoadDriver::new(config(3, 300), Arc::new(Flaky::default()))?;
    let report = driver.run().await;

    let agg = &report.aggregate;
    assert_eq!(agg.total_calls(), 300);
    assert_eq!(agg.failures, 100);
    assert_eq!(agg.error_counts.get(&ErrorKind::Connection), Some(&100));
    assert_eq!(agg.status_counts.get(&200), Some(&200));
    assert_eq!(report.latency.samples, 200);
    assert_eq!(report.latency.max, Duration::from_millis(2));
    Ok(())
}

/// Task growth beyond the tolerance is flagged.
#[tokio::test]
async fn task_growth_is_reported_as_leak() -> Result<()> {
    let driver = LoadDriver::new(config(2, 10), Arc::new(Yielding))?
        .with_probe(Arc::new(GrowingTasks::default()))
        .with_parallelism(4);
    assert_eq!(driver.config().effective_calls(), 10);
    let report = driver.run().await;

    assert_eq!(report.resources.start_tasks, 2);
    assert_eq!(report.resources.end_tasks, 20);
    assert_eq!(report.resources.task_drift, 18);
    assert!(report.resources.leak_detected);
    assert_eq!(report.resources.cpu_usage_percent, 0.0);
    Ok(())
}

/// Growth within the tolerance is not a leak.
#[tokio::test]
async fn task_growth_within_tolerance_is_healthy() -> Result<()> {
    let mut cfg = config(2, 10);
    cfg.leak_tolerance = 18;
    let driver =
        LoadDriver::new(cfg, Arc::new(Yielding))?.with_probe(Arc::new(GrowingTasks::default()));
    let report = driver.run().await;

    assert!(!report.resources.leak_detected);
    Ok(())
}

/// Finished workers are no longer counted by the closing snapshot of the
/// process probe, so a clean run never reports a leak.
#[tokio::test(flavor = "multi_thread", worker_threads = 8)]
async fn clean_runs_do_not_report_leaks() -> Result<()> {
    for _ in 0..20 {
        let driver = LoadDriver::new(config(100, 1000), Arc::new(Yielding))?;
        let report = driver.run().await;

        assert!(!report.resources.leak_detected);
        assert!(report.resources.task_drift <= report.resources.leak_tolerance as i64);
    }
    Ok(())
}

#[test]
fn invalid_configurations_are_rejected_up_front() {
    let zero_workers = LoadDriver::new(config(0, 10), Arc::new(Yielding));
    assert_eq!(zero_workers.err(), Some(ConfigError::ZeroConcurrency));

    let zero_calls = LoadDriver::new(config(4, 0), Arc::new(Yielding));
    assert_eq!(zero_calls.err(), Some(ConfigError::ZeroCalls));
}
