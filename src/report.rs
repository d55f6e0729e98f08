//! # Report Rendering
//!
//! Turns a finished [`RunReport`] into text for people and JSON for tools.
//! Every number printed here was already computed by the driver and the
//! statistics engine; rendering only formats and localizes.

use crate::driver::RunReport;
use crate::invoker::{ErrorKind, StatusClass};
use crate::utils::{
    format_bytes, format_duration, format_millis, format_qps, format_rate, histogram_bar,
};
use anyhow::{Context, Result};
use clap::ValueEnum;
use serde::{Deserialize, Serialize};
use std::fmt::Write as _;
use std::path::Path;
use tracing::info;

/// Report language.
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum, Serialize, Deserialize)]
pub enum Language {
    English,
    Chinese,
}

/// Every piece of fixed text in the report.
#[derive(Debug, Clone, Copy)]
enum Label {
    Title,
    Basics,
    Concurrency,
    TotalCalls,
    Failed,
    SuccessRate,
    Duration,
    Qps,
    Throughput,
    SlowCalls,
    PeakConcurrency,
    Latency,
    Mean,
    Max,
    Min,
    Distribution,
    NoLatencyData,
    System,
    TotalData,
    StatusCodes,
    StatusClasses,
    OtherStatus,
    GcCycles,
    CpuUsage,
    Tasks,
    Initial,
    Healthy,
    LeakDetected,
    Memory,
    Unknown,
    Errors,
    Occurrences,
}

impl Language {
    fn label(self, label: Label) -> &'static str {
        match self {
            Language::English => match label {
                Label::Title => "Pressure Test Report",
                Label::Basics => "Basics",
                Label::Concurrency => "Concurrency",
                Label::TotalCalls => "Total Calls",
                Label::Failed => "failed",
                Label::SuccessRate => "Success Rate",
                Label::Duration => "Duration",
                Label::Qps => "QPS",
                Label::Throughput => "Throughput",
                Label::SlowCalls => "Slow Calls",
                Label::PeakConcurrency => "Peak Concurrency",
                Label::Latency => "Latency",
                Label::Mean => "Mean",
                Label::Max => "Max",
                Label::Min => "Min",
                Label::Distribution => "Latency Distribution",
                Label::NoLatencyData => "no latency data",
                Label::System => "System",
                Label::TotalData => "Total Data",
                Label::StatusCodes => "Status Codes",
                Label::StatusClasses => "Status Classes",
                Label::OtherStatus => "other",
                Label::GcCycles => "GC Cycles",
                Label::CpuUsage => "CPU Usage",
                Label::Tasks => "Tasks",
                Label::Initial => "initial",
                Label::Healthy => "OK",
                Label::LeakDetected => "LEAK DETECTED",
                Label::Memory => "Resident Memory",
                Label::Unknown => "unknown",
                Label::Errors => "Error Summary",
                Label::Occurrences => "occurrences",
            },
            Language::Chinese => match label {
                Label::Title => "并发测试报告",
                Label::Basics => "基础指标",
                Label::Concurrency => "并发数",
                Label::TotalCalls => "总请求量",
                Label::Failed => "失败",
                Label::SuccessRate => "成功率",
                Label::Duration => "测试时长",
                Label::Qps => "QPS",
                Label::Throughput => "吞吐量",
                Label::SlowCalls => "慢请求",
                Label::PeakConcurrency => "峰值并发",
                Label::Latency => "延迟统计",
                Label::Mean => "平均",
                Label::Max => "最大",
                Label::Min => "最小",
                Label::Distribution => "延迟分布",
                Label::NoLatencyData => "无延迟数据",
                Label::System => "系统指标",
                Label::TotalData => "总数据量",
                Label::StatusCodes => "状态码分布",
                Label::StatusClasses => "状态码类别",
                Label::OtherStatus => "其他",
                Label::GcCycles => "GC次数",
                Label::CpuUsage => "CPU使用率",
                Label::Tasks => "任务数",
                Label::Initial => "初始",
                Label::Healthy => "正常",
                Label::LeakDetected => "检测到泄漏",
                Label::Memory => "常驻内存",
                Label::Unknown => "未知",
                Label::Errors => "错误摘要",
                Label::Occurrences => "次",
            },
        }
    }
}

const RULE: &str = "--------------------------------";
const BAR_WIDTH: usize = 40;

/// Render the human-readable report.
pub fn render_text(report: &RunReport, language: Language) -> String {
    let l = |label| language.label(label);
    let agg = &report.aggregate;
    let lat = &report.latency;
    let res = &report.resources;

    // Writing to a String cannot fail.
    let mut out = String::new();
    let _ = writeln!(out, "{}", l(Label::Title));
    let _ = writeln!(out, "================================");
    let _ = writeln!(out, "{}", l(Label::Basics));
    let _ = writeln!(out, "{RULE}");
    let _ = writeln!(out, "{}: {}", l(Label::Concurrency), report.config.concurrency);
    let _ = writeln!(
        out,
        "{}: {} ({}: {})",
        l(Label::TotalCalls),
        agg.total_calls(),
        l(Label::Failed),
        agg.failures
    );
    let _ = writeln!(out, "{}: {:.2}%", l(Label::SuccessRate), agg.success_rate());
    let _ = writeln!(out, "{}: {}", l(Label::Duration), format_duration(report.duration));
    let _ = writeln!(out, "{}: {}", l(Label::Qps), format_qps(report.calls_per_second()));
    let _ = writeln!(out, "{}: {}", l(Label::Throughput), format_rate(report.bytes_per_second()));
    let _ = writeln!(
        out,
        "{} (>{}): {} ({:.1}%)",
        l(Label::SlowCalls),
        format_millis(report.config.slow_threshold),
        agg.slow_calls,
        agg.slow_call_rate()
    );
    let _ = writeln!(out, "{}: {}", l(Label::PeakConcurrency), agg.peak_concurrency);

    let _ = writeln!(out);
    let _ = writeln!(out, "{}", l(Label::Latency));
    let _ = writeln!(out, "{RULE}");
    let _ = writeln!(out, "{}: {}", l(Label::Mean), format_millis(lat.mean));
    for p in &lat.percentiles {
        let _ = writeln!(out, "P{}: {}", percent_label(p.percentile), format_millis(p.value));
    }
    let _ = writeln!(out, "{}: {}", l(Label::Max), format_millis(lat.max));
    let _ = writeln!(out, "{}: {}", l(Label::Min), format_millis(lat.min));

    let _ = writeln!(out);
    let _ = writeln!(out, "{}", l(Label::Distribution));
    let _ = writeln!(out, "{RULE}");
    if lat.samples == 0 {
        let _ = writeln!(out, "{}", l(Label::NoLatencyData));
    } else {
        for bucket in &lat.histogram {
            let share = bucket.count as f64 / lat.samples as f64 * 100.0;
            let range = match bucket.upper {
                Some(upper) => format!("{}-{}", format_millis(bucket.lower), format_millis(upper)),
                None => format!("{}+", format_millis(bucket.lower)),
            };
            let _ = writeln!(
                out,
                "{:>19} | {} {:5.1}%",
                range,
                histogram_bar(share, BAR_WIDTH),
                share
            );
        }
    }

    let _ = writeln!(out);
    let _ = writeln!(out, "{}", l(Label::System));
    let _ = writeln!(out, "{RULE}");
    let _ = writeln!(out, "{}: {}", l(Label::TotalData), format_bytes(agg.bytes_transferred));
    let status = agg
        .status_counts
        .iter()
        .map(|(code, count)| format!("{code}: {count}"))
        .collect::<Vec<_>>()
        .join(", ");
    let _ = writeln!(out, "{}: {}", l(Label::StatusCodes), status);
    let classes = agg
        .status_class_counts()
        .iter()
        .map(|(class, count)| {
            let name = match class {
                StatusClass::Success => "2xx",
                StatusClass::ClientError => "4xx",
                StatusClass::ServerError => "5xx",
                StatusClass::Other => l(Label::OtherStatus),
            };
            format!("{name}: {count}")
        })
        .collect::<Vec<_>>()
        .join(", ");
    let _ = writeln!(out, "{}: {}", l(Label::StatusClasses), classes);
    let _ = writeln!(out, "{}: {}", l(Label::GcCycles), res.gc_cycles);
    let _ = writeln!(out, "{}: {:.4}%", l(Label::CpuUsage), res.cpu_usage_percent);
    let leak = if res.leak_detected {
        l(Label::LeakDetected)
    } else {
        l(Label::Healthy)
    };
    let _ = writeln!(
        out,
        "{}: {} ({}: {}) {}",
        l(Label::Tasks),
        res.end_tasks,
        l(Label::Initial),
        res.start_tasks,
        leak
    );
    let memory = res
        .resident_bytes
        .map(format_bytes)
        .unwrap_or_else(|| l(Label::Unknown).to_string());
    let _ = writeln!(out, "{}: {}", l(Label::Memory), memory);

    if !agg.error_counts.is_empty() {
        let _ = writeln!(out);
        let _ = writeln!(out, "{}", l(Label::Errors));
        let _ = writeln!(out, "{RULE}");
        for (kind, count) in &agg.error_counts {
            let _ = writeln!(out, "  - {} ({} {})", kind, count, l(Label::Occurrences));
        }
    }

    out
}

/// "50", "99", "99.9" for fractions 0.5, 0.99, 0.999.
fn percent_label(fraction: f64) -> String {
    let percent = fraction * 100.0;
    let rounded = (percent * 1000.0).round() / 1000.0;
    if rounded.fract() == 0.0 {
        format!("{}", rounded as u64)
    } else {
        format!("{}", rounded)
    }
}

/// Metadata recorded next to a run in JSON output.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReportMetadata {
    pub version: String,
    pub run_id: String,
    pub timestamp: chrono::DateTime<chrono::Utc>,
    pub system_info: SystemInfo,
}

/// Host description for reproducibility.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SystemInfo {
    pub os: String,
    pub architecture: String,
    pub cpu_cores: usize,
}

impl Default for SystemInfo {
    fn default() -> Self {
        Self {
            os: std::env::consts::OS.to_string(),
            architecture: std::env::consts::ARCH.to_string(),
            cpu_cores: num_cpus::get(),
        }
    }
}

/// Derived figures included in JSON so consumers need not recompute them.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReportSummary {
    pub total_calls: u64,
    pub successes: u64,
    pub failures: u64,
    pub success_rate_percent: f64,
    pub calls_per_second: f64,
    pub bytes_per_second: f64,
    pub mean_latency_ms: f64,
    pub min_latency_ms: f64,
    pub max_latency_ms: f64,
    pub status_classes: Vec<(StatusClass, u64)>,
    pub error_counts: Vec<(ErrorKind, u64)>,
}

/// Top-level JSON document.
#[derive(Debug, Serialize)]
pub struct ReportDocument<'a> {
    pub metadata: ReportMetadata,
    pub summary: ReportSummary,
    pub run: &'a RunReport,
}

impl<'a> ReportDocument<'a> {
    pub fn new(run: &'a RunReport) -> Self {
        let agg = &run.aggregate;
        Self {
            metadata: ReportMetadata {
                version: crate::VERSION.to_string(),
                run_id: uuid::Uuid::new_v4().to_string(),
                timestamp: chrono::Utc::now(),
                system_info: SystemInfo::default(),
            },
            summary: ReportSummary {
                total_calls: agg.total_calls(),
                successes: agg.successes(),
                failures: agg.failures,
                success_rate_percent: agg.success_rate(),
                calls_per_second: run.calls_per_second(),
                bytes_per_second: run.bytes_per_second(),
                mean_latency_ms: run.latency.mean.as_secs_f64() * 1000.0,
                min_latency_ms: run.latency.min.as_secs_f64() * 1000.0,
                max_latency_ms: run.latency.max.as_secs_f64() * 1000.0,
                status_classes: agg.status_class_counts().into_iter().collect(),
                error_counts: agg.error_counts.iter().map(|(k, v)| (*k, *v)).collect(),
            },
            run,
        }
    }
}

/// Serialize the run as pretty JSON.
pub fn to_json(report: &RunReport) -> Result<String> {
    serde_json::to_string_pretty(&ReportDocument::new(report)).context("Failed to serialize report")
}

/// Write the JSON report to `path`.
pub fn write_json(report: &RunReport, path: &Path) -> Result<()> {
    let json = to_json(report)?;
    std::fs::write(path, json)
        .with_context(|| format!("Failed to write report to {}", path.display()))?;
    info!("Report written to: {:?}", path);
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_percent_label() {
        assert_eq!(percent_label(0.5), "50");
        assert_eq!(percent_label(0.99), "99");
        assert_eq!(percent_label(0.999), "99.9");
    }

    #[test]
    fn test_labels_exist_in_both_languages() {
        for language in [Language::English, Language::Chinese] {
            assert!(!language.label(Label::Title).is_empty());
            assert!(!language.label(Label::Occurrences).is_empty());
        }
        assert_ne!(
            Language::English.label(Label::Title),
            Language::Chinese.label(Label::Title)
        );
    }

    #[test]
    fn test_system_info_default() {
        let info = SystemInfo::default();
        assert!(!info.os.is_empty());
        assert!(!info.architecture.is_empty());
        assert!(info.cpu_cores > 0);
    }
}
