//! # Display Helpers
//!
//! Formatters used by the report renderer. None of them feed back into the
//! statistics; they only turn numbers into text.

use std::time::Duration;

/// Sub-minute units, largest first, with their size in nanoseconds.
const SCALED_UNITS: [(u128, &str); 3] = [(1_000_000_000, "s"), (1_000_000, "ms"), (1_000, "μs")];

/// Format a run duration for the report.
///
/// Below one minute the largest unit that keeps the value at or above one is
/// used, with two decimals. From one minute up the value is split into whole
/// hours, minutes and seconds.
///
/// ```rust
/// # use pressure_bench::utils::format_duration;
/// # use std::time::Duration;
/// assert_eq!(format_duration(Duration::from_nanos(750)), "750ns");
/// assert_eq!(format_duration(Duration::from_micros(2500)), "2.50ms");
/// assert_eq!(format_duration(Duration::from_secs(90)), "1m 30s");
/// ```
pub fn format_duration(duration: Duration) -> String {
    let secs = duration.as_secs();
    if secs >= 60 {
        let (hours, minutes, seconds) = (secs / 3600, secs / 60 % 60, secs % 60);
        return if hours > 0 {
            format!("{hours}h {minutes}m {seconds}s")
        } else {
            format!("{minutes}m {seconds}s")
        };
    }

    let nanos = duration.as_nanos();
    SCALED_UNITS
        .iter()
        .find(|(scale, _)| nanos >= *scale)
        .map(|(scale, unit)| format!("{:.2}{}", nanos as f64 / *scale as f64, unit))
        .unwrap_or_else(|| format!("{nanos}ns"))
}

/// Format a duration as fractional milliseconds ("12.34ms").
pub fn format_millis(duration: Duration) -> String {
    format!("{:.2}ms", duration.as_secs_f64() * 1000.0)
}

/// Format a byte count with binary (1024-based) units.
pub fn format_bytes(bytes: u64) -> String {
    format_bytes_f64(bytes as f64)
}

pub fn format_bytes_f64(bytes: f64) -> String {
    const UNITS: [&str; 5] = ["B", "KB", "MB", "GB", "TB"];

    if bytes < 1024.0 {
        return format!("{:.0} B", bytes);
    }
    let mut value = bytes;
    let mut unit = 0;
    while value >= 1024.0 && unit < UNITS.len() - 1 {
        value /= 1024.0;
        unit += 1;
    }
    format!("{:.2} {}", value, UNITS[unit])
}

/// Format a transfer rate ("1.50 MB/s").
pub fn format_rate(bytes_per_second: f64) -> String {
    format!("{}/s", format_bytes_f64(bytes_per_second))
}

/// Format a call rate with two decimals.
pub fn format_qps(calls_per_second: f64) -> String {
    format!("{:.2}", calls_per_second)
}

/// A bar of `width` cells filled in proportion to `percentage` (0-100).
pub fn histogram_bar(percentage: f64, width: usize) -> String {
    let filled = ((percentage.clamp(0.0, 100.0) / 100.0) * width as f64).round() as usize;
    format!("{}{}", "█".repeat(filled), " ".repeat(width - filled.min(width)))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_format_duration() {
        assert_eq!(format_duration(Duration::from_nanos(500)), "500ns");
        assert_eq!(format_duration(Duration::from_nanos(1500)), "1.50μs");
        assert_eq!(format_duration(Duration::from_micros(1500)), "1.50ms");
        assert_eq!(format_duration(Duration::from_millis(1500)), "1.50s");
        assert_eq!(format_duration(Duration::from_secs(3725)), "1h 2m 5s");
        assert_eq!(format_duration(Duration::from_millis(59_999)), "60.00s");
        assert_eq!(format_duration(Duration::from_secs(60)), "1m 0s");
    }

    #[test]
    fn test_format_millis() {
        assert_eq!(format_millis(Duration::from_micros(12_500)), "12.50ms");
        assert_eq!(format_millis(Duration::ZERO), "0.00ms");
    }

    #[test]
    fn test_format_bytes() {
        assert_eq!(format_bytes(500), "500 B");
        assert_eq!(format_bytes(1536), "1.50 KB");
        assert_eq!(format_bytes(1572864), "1.50 MB");
        assert_eq!(format_bytes(1610612736), "1.50 GB");
    }

    #[test]
    fn test_format_rate() {
        assert_eq!(format_rate(1024.0), "1.00 KB/s");
        assert_eq!(format_rate(1048576.0), "1.00 MB/s");
    }

    #[test]
    fn test_histogram_bar() {
        assert_eq!(histogram_bar(0.0, 4), "    ");
        assert_eq!(histogram_bar(50.0, 4), "██  ");
        assert_eq!(histogram_bar(100.0, 4), "████");
        assert_eq!(histogram_bar(250.0, 4), "████");
    }
}
