//! # Resource Snapshotter
//!
//! Captures process-level resource readings at the start and end of a run
//! and derives CPU usage and a task-leak signal from the pair.
//!
//! ## Probing Policy
//!
//! All readings are best-effort. A probe that cannot read CPU time reports
//! zero, which makes CPU usage come out as 0% instead of failing the run.
//!
//! ## Task Counting
//!
//! [`ProcessProbe`] reports the number of alive tasks on the current tokio
//! runtime. When no runtime is reachable it falls back to a counter of live
//! workers maintained by the driver itself.
//!
//! ## Garbage Collection
//!
//! A Rust process has no garbage collector, so [`ProcessProbe`] always
//! reports zero GC cycles. The field is kept so that probes wrapping a
//! managed runtime can fill it in.

use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};
use sysinfo::{Pid, ProcessRefreshKind, ProcessesToUpdate, RefreshKind, System};
use tracing::debug;

/// Source of process resource readings.
pub trait ResourceProbe: Send + Sync {
    /// Number of live concurrent tasks.
    fn task_count(&self) -> usize;

    /// Cumulative CPU time consumed by the process. Zero when unavailable.
    fn cpu_time(&self) -> Duration;

    /// Cumulative garbage-collection cycles.
    fn gc_cycles(&self) -> u64;

    /// Resident memory of the process in bytes, if known.
    fn resident_bytes(&self) -> Option<u64> {
        None
    }
}

/// Point-in-time reading of the process.
#[derive(Debug, Clone, Copy)]
pub struct ResourceSnapshot {
    pub task_count: usize,
    pub gc_cycles: u64,
    pub taken_at: Instant,
    pub cpu_time: Duration,
    pub resident_bytes: Option<u64>,
}

/// Take a snapshot through `probe`.
pub fn snapshot(probe: &dyn ResourceProbe) -> ResourceSnapshot {
    ResourceSnapshot {
        task_count: probe.task_count(),
        gc_cycles: probe.gc_cycles(),
        taken_at: Instant::now(),
        cpu_time: probe.cpu_time(),
        resident_bytes: probe.resident_bytes(),
    }
}

/// What changed between two snapshots.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ResourceDelta {
    pub wall_time: Duration,
    pub cpu_time: Duration,
    /// Share of the machine's CPU capacity used, in `[0, 100]`.
    pub cpu_usage_percent: f64,
    pub gc_cycles: u64,
    pub start_tasks: usize,
    pub end_tasks: usize,
    pub task_drift: i64,
    pub leak_tolerance: usize,
    pub leak_detected: bool,
    pub resident_bytes: Option<u64>,
}

impl ResourceDelta {
    /// Combine two snapshots.
    ///
    /// - CPU usage is `(Δcpu / Δwall) * 100 / parallelism`, clamped to
    ///   `[0, 100]`; zero wall time or zero parallelism yields 0%.
    /// - A leak is flagged when the end task count exceeds the start count by
    ///   more than `leak_tolerance`.
    pub fn between(
        start: &ResourceSnapshot,
        end: &ResourceSnapshot,
        parallelism: usize,
        leak_tolerance: usize,
    ) -> Self {
        let wall_time = end.taken_at.saturating_duration_since(start.taken_at);
        let cpu_time = end.cpu_time.saturating_sub(start.cpu_time);
        let cpu_usage_percent = cpu_usage(cpu_time, wall_time, parallelism);

        let task_drift = end.task_count as i64 - start.task_count as i64;

        Self {
            wall_time,
            cpu_time,
            cpu_usage_percent,
            gc_cycles: end.gc_cycles.saturating_sub(start.gc_cycles),
            start_tasks: start.task_count,
            end_tasks: end.task_count,
            task_drift,
            leak_tolerance,
            leak_detected: task_drift > leak_tolerance as i64,
            resident_bytes: end.resident_bytes,
        }
    }
}

fn cpu_usage(cpu_time: Duration, wall_time: Duration, parallelism: usize) -> f64 {
    let wall = wall_time.as_secs_f64();
    if wall <= 0.0 || parallelism == 0 {
        return 0.0;
    }
    let usage = cpu_time.as_secs_f64() / wall * 100.0 / parallelism as f64;
    usage.clamp(0.0, 100.0)
}

/// Probe for the current process.
pub struct ProcessProbe {
    live_workers: Arc<AtomicUsize>,
    pid: Option<Pid>,
    system: Mutex<System>,
}

impl ProcessProbe {
    /// `live_workers` is consulted only when no tokio runtime is reachable.
    pub fn new(live_workers: Arc<AtomicUsize>) -> Self {
        let pid = sysinfo::get_current_pid()
            .map_err(|e| debug!("Cannot resolve current pid: {}", e))
            .ok();
        let refresh = RefreshKind::nothing().with_processes(ProcessRefreshKind::everything());

        Self {
            live_workers,
            pid,
            system: Mutex::new(System::new_with_specifics(refresh)),
        }
    }
}

impl ResourceProbe for ProcessProbe {
    fn task_count(&self) -> usize {
        match tokio::runtime::Handle::try_current() {
            Ok(handle) => handle.metrics().num_alive_tasks(),
            Err(_) => self.live_workers.load(Ordering::Acquire),
        }
    }

    fn cpu_time(&self) -> Duration {
        process_cpu_time().unwrap_or_else(|| {
            debug!("Process CPU time unavailable, reporting zero");
            Duration::ZERO
        })
    }

    fn gc_cycles(&self) -> u64 {
        0
    }

    fn resident_bytes(&self) -> Option<u64> {
        let pid = self.pid?;
        let mut system = self.system.lock();
        system.refresh_processes_specifics(
            ProcessesToUpdate::Some(&[pid]),
            true,
            ProcessRefreshKind::everything(),
        );
        system.process(pid).map(|process| process.memory())
    }
}

#[cfg(any(
    target_os = "linux",
    target_os = "android",
    target_os = "macos",
    target_os = "ios",
    target_os = "freebsd"
))]
fn process_cpu_time() -> Option<Duration> {
    use nix::time::{clock_gettime, ClockId};

    match clock_gettime(ClockId::CLOCK_PROCESS_CPUTIME_ID) {
        Ok(ts) => Some(Duration::new(ts.tv_sec() as u64, ts.tv_nsec() as u32)),
        Err(e) => {
            debug!("clock_gettime(CLOCK_PROCESS_CPUTIME_ID) failed: {}", e);
            None
        }
    }
}

#[cfg(not(any(
    target_os = "linux",
    target_os = "android",
    target_os = "macos",
    target_os = "ios",
    target_os = "freebsd"
)))]
fn process_cpu_time() -> Option<Duration> {
    None
}

#[cfg(test)]
mod tests {
    use super::*;

    fn snap(tasks: usize, gc: u64, cpu: Duration, at: Instant) -> ResourceSnapshot {
        ResourceSnapshot {
            task_count: tasks,
            gc_cycles: gc,
            taken_at: at,
            cpu_time: cpu,
            resident_bytes: None,
        }
    }

    #[test]
    fn test_leak_flag_false_when_tasks_unchanged() {
        let t0 = Instant::now();
        let start = snap(12, 0, Duration::ZERO, t0);
        let end = snap(12, 0, Duration::ZERO, t0 + Duration::from_secs(1));

        let delta = ResourceDelta::between(&start, &end, 4, 5);
        assert_eq!(delta.task_drift, 0);
        assert!(!delta.leak_detected);
    }

    #[test]
    fn test_leak_flag_respects_tolerance() {
        let t0 = Instant::now();
        let t1 = t0 + Duration::from_secs(1);
        let start = snap(10, 0, Duration::ZERO, t0);

        let at_tolerance = ResourceDelta::between(&start, &snap(15, 0, Duration::ZERO, t1), 1, 5);
        assert_eq!(at_tolerance.task_drift, 5);
        assert!(!at_tolerance.leak_detected);

        let beyond = ResourceDelta::between(&start, &snap(16, 0, Duration::ZERO, t1), 1, 5);
        assert!(beyond.leak_detected);

        let shrunk = ResourceDelta::between(&start, &snap(2, 0, Duration::ZERO, t1), 1, 5);
        assert_eq!(shrunk.task_drift, -8);
        assert!(!shrunk.leak_detected);
    }

    #[test]
    fn test_cpu_usage_normalized_by_parallelism() {
        let t0 = Instant::now();
        let start = snap(0, 0, Duration::from_secs(1), t0);
        let end = snap(0, 0, Duration::from_secs(3), t0 + Duration::from_secs(2));

        // 2s of CPU over 2s of wall on 4 cores is a quarter of the machine.
        let delta = ResourceDelta::between(&start, &end, 4, 5);
        assert!((delta.cpu_usage_percent - 25.0).abs() < 1e-9);
        assert_eq!(delta.cpu_time, Duration::from_secs(2));
        assert_eq!(delta.wall_time, Duration::from_secs(2));
    }

    #[test]
    fn test_cpu_usage_clamped_and_degenerate_inputs() {
        let t0 = Instant::now();
        let start = snap(0, 0, Duration::ZERO, t0);

        let saturated = snap(0, 0, Duration::from_secs(100), t0 + Duration::from_secs(1));
        assert_eq!(ResourceDelta::between(&start, &saturated, 2, 5).cpu_usage_percent, 100.0);

        let same_instant = snap(0, 0, Duration::from_secs(1), t0);
        assert_eq!(ResourceDelta::between(&start, &same_instant, 2, 5).cpu_usage_percent, 0.0);

        // A probe that failed at the end reports zero; usage degrades to 0%.
        let failed_probe = snap(0, 0, Duration::ZERO, t0 + Duration::from_secs(1));
        let begun = snap(0, 0, Duration::from_secs(5), t0);
        assert_eq!(ResourceDelta::between(&begun, &failed_probe, 2, 5).cpu_usage_percent, 0.0);
    }

    #[test]
    fn test_gc_cycles_delta() {
        let t0 = Instant::now();
        let delta = ResourceDelta::between(
            &snap(0, 3, Duration::ZERO, t0),
            &snap(0, 10, Duration::ZERO, t0),
            1,
            5,
        );
        assert_eq!(delta.gc_cycles, 7);
    }

    #[test]
    fn test_process_probe_without_runtime_uses_worker_counter() {
        let live = Arc::new(AtomicUsize::new(3));
        let probe = ProcessProbe::new(Arc::clone(&live));
        assert_eq!(probe.task_count(), 3);
        live.store(0, Ordering::Release);
        assert_eq!(probe.task_count(), 0);
        assert_eq!(probe.gc_cycles(), 0);
    }

    #[test]
    fn test_process_probe_cpu_time_is_monotonic() {
        let probe = ProcessProbe::new(Arc::new(AtomicUsize::new(0)));
        let first = probe.cpu_time();
        let mut x = 0u64;
        for i in 0..1_000_000u64 {
            x = x.wrapping_add(i * i);
        }
        std::hint::black_box(x);
        assert!(probe.cpu_time() >= first);
    }
}
