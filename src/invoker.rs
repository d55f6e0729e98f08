//! # Call Invoker
//!
//! The operation under load. The driver is generic over what a "call" is:
//! anything implementing [`CallInvoker`] can be measured, whether it performs
//! real I/O or only sleeps.
//!
//! ## Contract
//!
//! - `invoke` is called concurrently from every worker through a shared
//!   `Arc<dyn CallInvoker>`, so implementations must not hold per-call state
//!   behind `&self` without their own synchronization.
//! - The deadline is advisory. An implementation may overrun it (the
//!   simulated timeout deliberately does); the driver never preempts a call.
//! - Every invocation produces exactly one [`CallOutcome`]. Failures are
//!   reported through `CallOutcome::error`, never as a Rust error.

use async_trait::async_trait;
use rand::Rng;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::time::{Duration, Instant};

/// Closed classification of call failures.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    Timeout,
    Connection,
    Unavailable,
    Unknown,
}

impl ErrorKind {
    /// Classify a free-form error message.
    ///
    /// Matching is case-insensitive and checks the most specific cause first.
    pub fn classify(message: &str) -> Self {
        let message = message.to_ascii_lowercase();
        if message.contains("timeout") || message.contains("timed out") {
            ErrorKind::Timeout
        } else if message.contains("connection refused") {
            ErrorKind::Connection
        } else if message.contains("unavailable") {
            ErrorKind::Unavailable
        } else {
            ErrorKind::Unknown
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            ErrorKind::Timeout => "timeout",
            ErrorKind::Connection => "connection_error",
            ErrorKind::Unavailable => "service_unavailable",
            ErrorKind::Unknown => "unknown_error",
        }
    }
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Coarse class of a status code.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StatusClass {
    Success,
    ClientError,
    ServerError,
    Other,
}

impl StatusClass {
    /// Classify by hundreds: 2xx, 4xx, 5xx, anything else.
    pub fn from_code(code: u16) -> Self {
        match code {
            200..=299 => StatusClass::Success,
            400..=499 => StatusClass::ClientError,
            500..=599 => StatusClass::ServerError,
            _ => StatusClass::Other,
        }
    }
}

/// Result of a single call. Immutable once produced.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CallOutcome {
    pub latency: Duration,
    pub status: u16,
    pub error: Option<ErrorKind>,
    /// Only meaningful when `error` is `None`.
    pub bytes: u64,
}

impl CallOutcome {
    pub fn success(latency: Duration, status: u16, bytes: u64) -> Self {
        Self {
            latency,
            status,
            error: None,
            bytes,
        }
    }

    pub fn failure(latency: Duration, status: u16, error: ErrorKind) -> Self {
        Self {
            latency,
            status,
            error: Some(error),
            bytes: 0,
        }
    }

    /// A call succeeded when it carries no error, whatever its status.
    pub fn is_success(&self) -> bool {
        self.error.is_none()
    }
}

/// The operation being measured.
#[async_trait]
pub trait CallInvoker: Send + Sync {
    /// Perform one call with the given nominal deadline.
    async fn invoke(&self, deadline: Duration) -> CallOutcome;

    /// Short name used in logs and reports.
    fn name(&self) -> &'static str;
}

/// Synthetic call with a latency and failure mix resembling a flaky HTTP API.
///
/// Successful calls take a base delay in `[30ms, 100ms)` plus an extra delay
/// in `[0ms, 600ms)`. With probability `error_rate` the call fails instead,
/// picking one of three failure modes with equal probability:
///
/// | Mode | Status | Behaviour |
/// |---|---|---|
/// | timeout | 500 | sleeps `deadline + 100ms` |
/// | connection refused | 502 | returns immediately |
/// | service unavailable | 503 | returns immediately |
///
/// `time_scale` multiplies every delay, so `0.01` turns a several-minute run
/// into a few seconds while keeping the latency shape.
#[derive(Debug, Clone)]
pub struct SimulatedInvoker {
    error_rate: f64,
    time_scale: f64,
}

impl SimulatedInvoker {
    pub fn new(error_rate: f64) -> Self {
        let error_rate = if error_rate.is_nan() {
            0.0
        } else {
            error_rate.clamp(0.0, 1.0)
        };
        Self {
            error_rate,
            time_scale: 1.0,
        }
    }

    pub fn with_time_scale(mut self, time_scale: f64) -> Self {
        self.time_scale = time_scale.max(0.0);
        self
    }

    fn scaled(&self, delay: Duration) -> Duration {
        delay.mul_f64(self.time_scale)
    }
}

impl Default for SimulatedInvoker {
    fn default() -> Self {
        Self::new(crate::defaults::ERROR_RATE)
    }
}

/// What the simulation decided before any sleeping happens.
enum Plan {
    Succeed { delay: Duration, bytes: u64 },
    TimeOut,
    Refuse,
    Unavailable,
}

impl SimulatedInvoker {
    // `ThreadRng` is not `Send`, so the draw must finish before the first await.
    fn plan(&self) -> Plan {
        let mut rng = rand::thread_rng();
        if rng.gen_bool(self.error_rate) {
            return match rng.gen_range(0..3) {
                0 => Plan::TimeOut,
                1 => Plan::Refuse,
                _ => Plan::Unavailable,
            };
        }
        let base = Duration::from_millis(rng.gen_range(30..100));
        let extra = Duration::from_secs_f64(rng.gen::<f64>() * 0.6);
        Plan::Succeed {
            delay: base + extra,
            bytes: rng.gen_range(0..1024),
        }
    }
}

#[async_trait]
impl CallInvoker for SimulatedInvoker {
    async fn invoke(&self, deadline: Duration) -> CallOutcome {
        let started = Instant::now();
        match self.plan() {
            Plan::Succeed { delay, bytes } => {
                tokio::time::sleep(self.scaled(delay)).await;
                CallOutcome::success(started.elapsed(), 200, bytes)
            }
            Plan::TimeOut => {
                tokio::time::sleep(self.scaled(deadline + Duration::from_millis(100))).await;
                CallOutcome::failure(started.elapsed(), 500, ErrorKind::classify("timeout"))
            }
            Plan::Refuse => CallOutcome::failure(
                started.elapsed(),
                502,
                ErrorKind::classify("connection refused"),
            ),
            Plan::Unavailable => CallOutcome::failure(
                started.elapsed(),
                503,
                ErrorKind::classify("service unavailable"),
            ),
        }
    }

    fn name(&self) -> &'static str {
        "simulated"
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_classify_error_messages() {
        assert_eq!(ErrorKind::classify("timeout at 12:00:01.000"), ErrorKind::Timeout);
        assert_eq!(ErrorKind::classify("operation timed out"), ErrorKind::Timeout);
        assert_eq!(ErrorKind::classify("Connection refused"), ErrorKind::Connection);
        assert_eq!(ErrorKind::classify("service unavailable"), ErrorKind::Unavailable);
        assert_eq!(ErrorKind::classify("broken pipe"), ErrorKind::Unknown);
    }

    #[test]
    fn test_status_class() {
        assert_eq!(StatusClass::from_code(200), StatusClass::Success);
        assert_eq!(StatusClass::from_code(404), StatusClass::ClientError);
        assert_eq!(StatusClass::from_code(503), StatusClass::ServerError);
        assert_eq!(StatusClass::from_code(101), StatusClass::Other);
    }

    #[test]
    fn test_failure_outcome_carries_no_bytes() {
        let outcome = CallOutcome::failure(Duration::from_millis(5), 502, ErrorKind::Connection);
        assert!(!outcome.is_success());
        assert_eq!(outcome.bytes, 0);
        assert_eq!(StatusClass::from_code(outcome.status), StatusClass::ServerError);
    }

    #[tokio::test]
    async fn test_simulated_invoker_always_succeeds_without_errors() {
        let invoker = SimulatedInvoker::new(0.0).with_time_scale(0.0);
        for _ in 0..50 {
            let outcome = invoker.invoke(Duration::from_millis(10)).await;
            assert!(outcome.is_success());
            assert_eq!(outcome.status, 200);
            assert!(outcome.bytes < 1024);
        }
    }

    #[tokio::test]
    async fn test_simulated_invoker_always_fails_at_full_error_rate() {
        let invoker = SimulatedInvoker::new(1.0).with_time_scale(0.0);
        for _ in 0..50 {
            let outcome = invoker.invoke(Duration::from_millis(10)).await;
            assert!(!outcome.is_success());
            assert!(matches!(outcome.status, 500 | 502 | 503));
        }
    }

    #[test]
    fn test_error_rate_is_clamped() {
        let invoker = SimulatedInvoker::new(7.0);
        assert_eq!(invoker.error_rate, 1.0);
        let invoker = SimulatedInvoker::new(-1.0);
        assert_eq!(invoker.error_rate, 0.0);
    }
}
