// Report assembly: recommendation rules, report construction, JSON output, summary text

use crate::error::ReportError;
use crate::models::{CpuAnalysis, Indicator, ProcessReading, Report};
use std::collections::BTreeSet;
use std::fmt::Write as _;
use std::io::Write as _;
use std::path::{Path, PathBuf};

pub const RECOMMEND_ROLLBACK: &str =
    "High CPU usage detected - consider extension version rollback";
pub const RECOMMEND_DISK: &str = "High disk I/O detected - investigate extension file activity";
pub const RECOMMEND_NETWORK: &str =
    "High network activity detected - investigate extension data transmission";
pub const RECOMMEND_CLEANUP: &str =
    "Multiple target processes detected - consider process cleanup";

/// Processes shown in the summary.
const SUMMARY_TOP_N: usize = 3;

#[derive(Debug, Clone, Copy)]
pub struct ReportAssembler {
    /// More readings than this triggers the cleanup recommendation.
    cleanup_threshold: usize,
}

impl Default for ReportAssembler {
    fn default() -> Self {
        Self::new(5)
    }
}

impl ReportAssembler {
    pub fn new(cleanup_threshold: usize) -> Self {
        Self { cleanup_threshold }
    }

    /// Pure function of already-collected data, in fixed rule order.
    pub fn recommendations(
        &self,
        cpu: &CpuAnalysis,
        processes: &[ProcessReading],
        indicators: &BTreeSet<Indicator>,
    ) -> Vec<String> {
        let mut out = Vec::new();
        if cpu.high_usage_detected {
            out.push(RECOMMEND_ROLLBACK.to_string());
        }
        if indicators.contains(&Indicator::HighDiskIo) {
            out.push(RECOMMEND_DISK.to_string());
        }
        if indicators.contains(&Indicator::HighNetworkIo) {
            out.push(RECOMMEND_NETWORK.to_string());
        }
        if processes.len() > self.cleanup_threshold {
            out.push(RECOMMEND_CLEANUP.to_string());
        }
        out
    }

    pub fn assemble(
        &self,
        timestamp: String,
        cpu_analysis: &CpuAnalysis,
        processes: &[ProcessReading],
        indicators: &BTreeSet<Indicator>,
        extensions: &[PathBuf],
    ) -> Report {
        Report {
            timestamp,
            recommendations: self.recommendations(cpu_analysis, processes, indicators),
            cpu_analysis: cpu_analysis.clone(),
            processes: processes.to_vec(),
            indicators: indicators.clone(),
            extensions: extensions
                .iter()
                .map(|p| p.to_string_lossy().into_owned())
                .collect(),
        }
    }

    /// `assemble` stamped with the current local time (RFC 3339).
    pub fn assemble_now(
        &self,
        cpu_analysis: &CpuAnalysis,
        processes: &[ProcessReading],
        indicators: &BTreeSet<Indicator>,
        extensions: &[PathBuf],
    ) -> Report {
        self.assemble(
            chrono::Local::now().to_rfc3339(),
            cpu_analysis,
            processes,
            indicators,
            extensions,
        )
    }
}

/// Writes `<dir>/<prefix>_<unix_seconds>.json` and returns its path.
pub fn write_report(report: &Report, dir: &Path, prefix: &str) -> Result<PathBuf, ReportError> {
    let json = serde_json::to_string_pretty(report)?;
    let path = dir.join(format!("{}_{}.json", prefix, chrono::Utc::now().timestamp()));
    std::fs::create_dir_all(dir)
        .and_then(|_| std::fs::write(&path, json))
        .map_err(|source| ReportError::Write {
            path: path.clone(),
            source,
        })?;
    Ok(path)
}

/// Prints the summary to `out`, then writes the report file. The summary is
/// shown even when the write fails.
pub fn publish_report(
    report: &Report,
    dir: &Path,
    prefix: &str,
    out: &mut dyn std::io::Write,
) -> Result<PathBuf, ReportError> {
    let _ = writeln!(out, "{}", render_summary(report));
    let path = write_report(report, dir, prefix)?;
    let _ = writeln!(out, "Report: {}", path.display());
    Ok(path)
}

pub fn render_summary(report: &Report) -> String {
    let mut s = String::new();
    let _ = writeln!(s, "DETECTION SUMMARY");
    let _ = writeln!(s, "CPU peak: {:.1}%", report.cpu_analysis.peak_cpu);
    let _ = writeln!(s, "CPU average: {:.1}%", report.cpu_analysis.average_cpu);
    let _ = writeln!(s, "Target processes: {}", report.processes.len());
    let _ = writeln!(s, "Indicators: {}", report.indicators.len());
    let _ = writeln!(s, "Recommendations: {}", report.recommendations.len());

    let top = report.top_processes(SUMMARY_TOP_N);
    if !top.is_empty() {
        let _ = writeln!(s, "\nTOP PROCESSES:");
        for p in top {
            let _ = writeln!(
                s,
                "  {} (pid {}): {:.1}% CPU, {:.1}MB",
                p.name, p.pid, p.cpu_percent, p.memory_mb
            );
        }
    }

    if report.is_healthy() {
        let _ = writeln!(s, "\nSystem appears healthy - no immediate actions needed");
    } else {
        let _ = writeln!(s, "\nRECOMMENDATIONS:");
        for r in &report.recommendations {
            let _ = writeln!(s, "  - {}", r);
        }
    }
    s
}
