//! Report Building
//!
//! Collects per-host estimates into one report and renders it as aligned
//! text or JSON. Undefined statistics stay visible: `NaN` in text, `null` in
//! JSON.

use crate::sampler::{Estimate, EstimateDetail, Recommendation};
use chrono::{DateTime, Utc};
use rodbench_stats::{LinearFit, display_stat};
use serde::Serialize;
use std::fmt::Write as _;

/// Run-level metadata
#[derive(Debug, Clone, Serialize)]
pub struct ReportMeta {
    /// rodbench version
    pub version: String,
    /// UTC time the report was built
    pub timestamp: DateTime<Utc>,
    /// Strategy used for every estimate
    pub strategy: String,
    /// Overhead target fraction
    pub target: f64,
    /// Host handles in connection order
    pub hosts: Vec<String>,
    /// Operating system of the orchestrator
    pub os: String,
    /// CPU architecture of the orchestrator
    pub arch: String,
}

/// Outcome counts
#[derive(Debug, Clone, Default, Serialize)]
pub struct ReportSummary {
    /// Estimates in the report
    pub total: usize,
    /// With a recommended count
    pub reliable: usize,
    /// Sampled, but without a usable count
    pub unreliable: usize,
    /// Benchmark failed on that host
    pub failed: usize,
    /// Wall time of the sampling phase
    pub duration_ms: f64,
}

/// Complete report
#[derive(Debug, Clone, Serialize)]
pub struct Report {
    /// Run-level metadata
    pub meta: ReportMeta,
    /// Estimates in benchmark-then-host order
    pub results: Vec<Estimate>,
    /// Outcome counts
    pub summary: ReportSummary,
}

/// Build a report from estimates in benchmark-then-host order
pub fn build_report(
    results: Vec<Estimate>,
    hosts: &[String],
    strategy: &str,
    target: f64,
    duration_ms: f64,
) -> Report {
    let mut summary = ReportSummary {
        total: results.len(),
        duration_ms,
        ..ReportSummary::default()
    };
    for estimate in &results {
        if estimate.is_failed() {
            summary.failed += 1;
        } else if estimate.recommendation.is_reliable() {
            summary.reliable += 1;
        } else {
            summary.unreliable += 1;
        }
    }

    Report {
        meta: ReportMeta {
            version: env!("CARGO_PKG_VERSION").to_string(),
            timestamp: Utc::now(),
            strategy: strategy.to_string(),
            target,
            hosts: hosts.to_vec(),
            os: std::env::consts::OS.to_string(),
            arch: std::env::consts::ARCH.to_string(),
        },
        results,
        summary,
    }
}

/// Human-readable duration for nanosecond values
pub fn format_duration(ns: f64) -> String {
    if !ns.is_finite() {
        return display_stat(ns, 0);
    }
    let abs = ns.abs();
    if abs < 1_000.0 {
        format!("{:.3} ns", ns)
    } else if abs < 1_000_000.0 {
        format!("{:.3} us", ns / 1_000.0)
    } else if abs < 1_000_000_000.0 {
        format!("{:.3} ms", ns / 1_000_000.0)
    } else {
        format!("{:.3} s", ns / 1_000_000_000.0)
    }
}

fn format_fit(label: &str, fit: &Option<LinearFit>) -> String {
    match fit {
        Some(fit) => format!(
            "{}: slope {} ± {}  intercept {} ± {}  R² {}",
            label,
            display_stat(fit.slope, 4),
            display_stat(fit.slope_std_err, 4),
            display_stat(fit.intercept, 3),
            display_stat(fit.intercept_std_err, 3),
            display_stat(fit.r_squared, 6),
        ),
        None => format!("{}: undefined (no spread in iteration counts)", label),
    }
}

fn push_estimate(output: &mut String, estimate: &Estimate, show_trials: bool) {
    let _ = writeln!(output, "  host {}", estimate.host);

    if let Some(failure) = &estimate.failure {
        let _ = writeln!(
            output,
            "    --- FAIL: {}: {} ({} failed runs)",
            estimate.benchmark, failure, estimate.failed_runs
        );
        return;
    }

    if show_trials {
        for t in &estimate.trials {
            let _ = writeln!(
                output,
                "    trial {:>4}  n={:<12} mean {:>14}  skew {:>9}  kurtosis {:>9}",
                t.trial,
                t.iterations,
                display_stat(t.mean, 3),
                display_stat(t.skew, 4),
                display_stat(t.kurtosis, 4),
            );
        }
    }

    match &estimate.detail {
        Some(EstimateDetail::Regression {
            calibrated_iterations,
            fit,
            total_fit,
            moments,
        }) => {
            let _ = writeln!(
                output,
                "    N0 {}  ns/op mean {}  stddev {}  skew {}  kurtosis {}",
                calibrated_iterations,
                display_stat(moments.mean, 3),
                display_stat(moments.variance.sqrt(), 3),
                display_stat(moments.skew, 4),
                display_stat(moments.kurtosis, 4),
            );
            let _ = writeln!(output, "    {}", format_fit("ns/op ~ n", fit));
            let _ = writeln!(output, "    {}", format_fit("total ~ n", total_fit));
        }
        Some(EstimateDetail::TwoPoint {
            probe,
            single,
            probed,
        }) => {
            let _ = writeln!(
                output,
                "    t(1) mean {}  t({}) mean {}",
                format_duration(single.mean),
                probe,
                format_duration(probed.mean),
            );
        }
        None => {}
    }

    let _ = writeln!(
        output,
        "    per-op {}  overhead {}",
        format_duration(estimate.per_op_ns),
        format_duration(estimate.overhead_ns),
    );
    match &estimate.recommendation {
        Recommendation::Reliable {
            iterations,
            duration_ns,
        } => {
            let _ = writeln!(
                output,
                "    recommended N {} ({})",
                iterations,
                format_duration(*duration_ns)
            );
        }
        Recommendation::Unreliable { reason } => {
            let _ = writeln!(output, "    recommended N unreliable: {}", reason);
        }
    }
    if estimate.failed_runs > 0 {
        let _ = writeln!(output, "    {} failed runs discarded", estimate.failed_runs);
    }
}

/// Format a report for terminal display
pub fn format_human_output(report: &Report, show_trials: bool) -> String {
    let mut output = String::new();

    output.push('\n');
    let _ = writeln!(
        output,
        "rodbench Results ({}, overhead target {:.2}%)",
        report.meta.strategy,
        report.meta.target * 100.0
    );
    output.push_str(&"=".repeat(60));
    output.push_str("\n\n");

    let mut current: Option<&str> = None;
    for estimate in &report.results {
        if current != Some(estimate.benchmark.as_str()) {
            if current.is_some() {
                output.push('\n');
            }
            let _ = writeln!(output, "{}", estimate.benchmark);
            current = Some(estimate.benchmark.as_str());
        }
        push_estimate(&mut output, estimate, show_trials);
    }

    output.push('\n');
    output.push_str(&"-".repeat(60));
    output.push('\n');
    let s = &report.summary;
    let _ = writeln!(
        output,
        "{} estimates: {} reliable, {} unreliable, {} failed ({:.0} ms)",
        s.total, s.reliable, s.unreliable, s.failed, s.duration_ms
    );
    for estimate in report.results.iter().filter(|e| e.is_failed()) {
        let _ = writeln!(
            output,
            "--- FAIL: {} on {}",
            estimate.benchmark, estimate.host
        );
    }
    output
}

/// Format a report as pretty-printed JSON
pub fn format_json_output(report: &Report) -> serde_json::Result<String> {
    serde_json::to_string_pretty(report)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sampler::{TrialSnapshot, recommend};
    use rodbench_stats::MomentAccumulator;

    fn two_point(host: &str) -> Estimate {
        let mut single = MomentAccumulator::new();
        let mut probed = MomentAccumulator::new();
        single.update(110.0);
        probed.update(120.0);
        Estimate {
            benchmark: "BenchmarkEncode".to_string(),
            host: host.to_string(),
            strategy: "two-point".to_string(),
            per_op_ns: 10.0,
            overhead_ns: 100.0,
            recommendation: recommend(100.0, 10.0, 0.01),
            detail: Some(EstimateDetail::TwoPoint {
                probe: 2,
                single: single.snapshot(),
                probed: probed.snapshot(),
            }),
            trials: vec![TrialSnapshot {
                trial: 1,
                iterations: 1,
                mean: 110.0,
                skew: f64::NAN,
                kurtosis: f64::NAN,
            }],
            failed_runs: 0,
            failure: None,
        }
    }

    fn report() -> Report {
        let results = vec![
            two_point("./a"),
            two_point("./b"),
            Estimate::failed("BenchmarkPanic", "./a", "two-point", "boom", 3),
        ];
        build_report(
            results,
            &["./a".to_string(), "./b".to_string()],
            "two-point",
            0.01,
            12.0,
        )
    }

    #[test]
    fn test_summary_counts() {
        let report = report();
        assert_eq!(report.summary.total, 3);
        assert_eq!(report.summary.reliable, 2);
        assert_eq!(report.summary.unreliable, 0);
        assert_eq!(report.summary.failed, 1);
    }

    #[test]
    fn test_human_output() {
        let output = format_human_output(&report(), true);
        assert!(output.contains("BenchmarkEncode\n  host ./a\n"));
        assert!(output.contains("recommended N 1000 (10.000 us)"));
        assert!(output.contains("skew       NaN"));
        assert!(output.contains("--- FAIL: BenchmarkPanic: boom (3 failed runs)"));
        assert!(output.contains("--- FAIL: BenchmarkPanic on ./a"));
        assert_eq!(output.matches("BenchmarkEncode\n").count(), 1);

        let quiet = format_human_output(&report(), false);
        assert!(!quiet.contains("trial    1"));
    }

    #[test]
    fn test_json_output_keeps_nan_visible() {
        let json = format_json_output(&report()).unwrap();
        let value: serde_json::Value = serde_json::from_str(&json).unwrap();
        assert_eq!(value["summary"]["failed"], 1);
        assert_eq!(value["results"][0]["recommendation"]["status"], "reliable");
        assert_eq!(value["results"][0]["recommendation"]["iterations"], 1000);
        assert_eq!(value["results"][0]["detail"]["kind"], "two_point");
        assert!(value["results"][0]["trials"][0]["skew"].is_null());
        assert!(value["results"][2]["per_op_ns"].is_null());
        assert_eq!(value["meta"]["hosts"][1], "./b");
    }

    #[test]
    fn test_format_duration() {
        assert_eq!(format_duration(812.0), "812.000 ns");
        assert_eq!(format_duration(10_000.0), "10.000 us");
        assert_eq!(format_duration(2_500_000.0), "2.500 ms");
        assert_eq!(format_duration(3e9), "3.000 s");
        assert_eq!(format_duration(f64::NAN), "NaN");
    }
}
