use crate::defaults;
use crate::report::Language;
use clap::Parser;
use std::path::PathBuf;
use std::time::Duration;

/// Pressure Bench - drive a fixed pool of workers against an operation and
/// report latency, failure and resource statistics
#[derive(Parser, Debug, Clone)]
#[clap(version, about, long_about = None)]
pub struct Args {
    /// Number of concurrent workers
    #[clap(short = 'c', long, default_value_t = defaults::CONCURRENCY, help_heading = "Core Options")]
    pub concurrency: usize,

    /// Total number of calls, split evenly across workers (remainder is dropped)
    #[clap(short = 'n', long, default_value_t = defaults::TOTAL_CALLS, help_heading = "Core Options")]
    pub total_calls: usize,

    /// Nominal per-call deadline (e.g. "1500ms", "2s")
    #[clap(long, value_parser = parse_duration, default_value = "1500ms", help_heading = "Core Options")]
    pub timeout: Duration,

    /// Successful calls slower than this are counted as slow
    #[clap(long, value_parser = parse_duration, default_value = "500ms", help_heading = "Core Options")]
    pub slow_threshold: Duration,

    /// Unrecorded calls issued before measurement starts
    #[clap(short = 'w', long, default_value_t = 0, help_heading = "Core Options")]
    pub warmup_calls: usize,

    /// Percentiles to report, in percent
    #[clap(long, num_args = 1.., default_values_t = vec![50.0, 90.0, 99.0], help_heading = "Analysis")]
    pub percentiles: Vec<f64>,

    /// Histogram bucket thresholds in milliseconds, ascending
    #[clap(long, num_args = 1.., default_values_t = defaults::HISTOGRAM_THRESHOLDS_MS.to_vec(), help_heading = "Analysis")]
    pub histogram_ms: Vec<u64>,

    /// Task-count growth tolerated before a leak is reported
    #[clap(long, default_value_t = defaults::LEAK_TOLERANCE, help_heading = "Analysis")]
    pub leak_tolerance: usize,

    /// Failure probability of the simulated call, between 0 and 1
    #[clap(long, default_value_t = defaults::ERROR_RATE, help_heading = "Simulation")]
    pub error_rate: f64,

    /// Multiplier applied to every simulated delay (0.01 runs 100x faster)
    #[clap(long, default_value_t = 1.0, help_heading = "Simulation")]
    pub time_scale: f64,

    /// Report language
    #[clap(short = 'l', long, value_enum, default_value_t = Language::English, help_heading = "Output")]
    pub language: Language,

    /// Write the full report as JSON to this file
    #[clap(short = 'o', long, help_heading = "Output")]
    pub output_file: Option<PathBuf>,

    /// Also write logs to this file
    #[clap(long, help_heading = "Output")]
    pub log_file: Option<PathBuf>,

    /// Increase log verbosity (-v debug, -vv trace)
    #[clap(short = 'v', long, action = clap::ArgAction::Count, help_heading = "Output")]
    pub verbose: u8,

    /// Only print warnings and the final report
    #[clap(short = 'q', long, default_value_t = false, help_heading = "Output")]
    pub quiet: bool,
}

impl Default for Args {
    /// Mirrors the command-line defaults, for constructing `Args` in code.
    fn default() -> Self {
        Self {
            concurrency: defaults::CONCURRENCY,
            total_calls: defaults::TOTAL_CALLS,
            timeout: defaults::CALL_TIMEOUT,
            slow_threshold: defaults::SLOW_THRESHOLD,
            warmup_calls: 0,
            percentiles: defaults::PERCENTILES.iter().map(|p| p * 100.0).collect(),
            histogram_ms: defaults::HISTOGRAM_THRESHOLDS_MS.to_vec(),
            leak_tolerance: defaults::LEAK_TOLERANCE,
            error_rate: defaults::ERROR_RATE,
            time_scale: 1.0,
            language: Language::English,
            output_file: None,
            log_file: None,
            verbose: 0,
            quiet: false,
        }
    }
}

/// Parse duration from string (e.g., "500ms", "2s", "1m")
fn parse_duration(s: &str) -> Result<Duration, String> {
    let s = s.trim();

    if s.is_empty() {
        return Err("Duration cannot be empty".to_string());
    }

    let (num_str, unit) = if let Some(stripped) = s.strip_suffix("ms") {
        (stripped, "ms")
    } else if let Some(stripped) = s.strip_suffix('s') {
        (stripped, "s")
    } else if let Some(stripped) = s.strip_suffix('m') {
        (stripped, "m")
    } else {
        (s, "ms") // Bare numbers are milliseconds
    };

    let num: f64 = num_str
        .trim()
        .parse()
        .map_err(|_| format!("Invalid number in duration: {}", num_str))?;
    if !num.is_finite() || num < 0.0 {
        return Err(format!("Duration must be a non-negative number: {}", s));
    }

    let duration = match unit {
        "ms" => Duration::from_secs_f64(num / 1000.0),
        "s" => Duration::from_secs_f64(num),
        "m" => Duration::from_secs_f64(num * 60.0),
        _ => return Err(format!("Invalid duration unit: {}", unit)),
    };

    Ok(duration)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_duration() {
        assert_eq!(parse_duration("1500ms").unwrap(), Duration::from_millis(1500));
        assert_eq!(parse_duration("2s").unwrap(), Duration::from_secs(2));
        assert_eq!(parse_duration("0.5s").unwrap(), Duration::from_millis(500));
        assert_eq!(parse_duration("1m").unwrap(), Duration::from_secs(60));
        assert_eq!(parse_duration("250").unwrap(), Duration::from_millis(250));

        assert!(parse_duration("").is_err());
        assert!(parse_duration("fast").is_err());
        assert!(parse_duration("-5s").is_err());
    }

    #[test]
    fn test_cli_defaults_match_library_defaults() {
        let args = Args::parse_from(["pressure-bench"]);
        let default = Args::default();

        assert_eq!(args.concurrency, default.concurrency);
        assert_eq!(args.total_calls, default.total_calls);
        assert_eq!(args.timeout, default.timeout);
        assert_eq!(args.slow_threshold, default.slow_threshold);
        assert_eq!(args.percentiles, default.percentiles);
        assert_eq!(args.histogram_ms, default.histogram_ms);
        assert_eq!(args.language, Language::English);
    }

    #[test]
    fn test_cli_overrides() {
        let args = Args::parse_from([
            "pressure-bench",
            "-c",
            "7",
            "-n",
            "100",
            "--timeout",
            "2s",
            "--percentiles",
            "50",
            "99.9",
            "-l",
            "chinese",
            "-vv",
        ]);

        assert_eq!(args.concurrency, 7);
        assert_eq!(args.total_calls, 100);
        assert_eq!(args.timeout, Duration::from_secs(2));
        assert_eq!(args.percentiles, vec![50.0, 99.9]);
        assert_eq!(args.language, Language::Chinese);
        assert_eq!(args.verbose, 2);
    }
}
