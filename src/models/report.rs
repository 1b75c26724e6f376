// Process readings, CPU analysis and the terminal report

use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;

/// Anomaly tag attached to a report when a byte-counter group exceeds its threshold.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Indicator {
    HighDiskIo,
    HighNetworkIo,
}

impl Indicator {
    pub fn as_str(self) -> &'static str {
        match self {
            Indicator::HighDiskIo => "high_disk_io",
            Indicator::HighNetworkIo => "high_network_io",
        }
    }
}

impl std::fmt::Display for Indicator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One correlator reading. Not tracked across passes.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProcessReading {
    pub pid: u32,
    pub name: String,
    pub cpu_percent: f64,
    pub memory_mb: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CpuAnalysis {
    /// One global CPU percentage per second, in capture order.
    pub readings: Vec<f64>,
    pub average_cpu: f64,
    pub peak_cpu: f64,
    pub high_usage_detected: bool,
}

impl CpuAnalysis {
    /// Aggregate a reading series. An empty series (interrupted before the first
    /// sample) yields zeros and no detection.
    pub fn from_readings(readings: Vec<f64>, cpu_threshold: f64) -> Self {
        if readings.is_empty() {
            return Self {
                readings,
                average_cpu: 0.0,
                peak_cpu: 0.0,
                high_usage_detected: false,
            };
        }
        let average_cpu = readings.iter().sum::<f64>() / readings.len() as f64;
        let peak_cpu = readings.iter().copied().fold(f64::MIN, f64::max);
        Self {
            high_usage_detected: peak_cpu > cpu_threshold,
            readings,
            average_cpu,
            peak_cpu,
        }
    }
}

/// Result of one detection run. Written out once, never mutated.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Report {
    pub timestamp: String,
    pub cpu_analysis: CpuAnalysis,
    pub processes: Vec<ProcessReading>,
    pub indicators: BTreeSet<Indicator>,
    pub extensions: Vec<String>,
    pub recommendations: Vec<String>,
}

impl Report {
    pub fn is_healthy(&self) -> bool {
        self.recommendations.is_empty()
    }

    /// Up to `n` readings ordered by CPU, highest first. Leaves `processes` untouched.
    pub fn top_processes(&self, n: usize) -> Vec<&ProcessReading> {
        let mut sorted: Vec<&ProcessReading> = self.processes.iter().collect();
        sorted.sort_by(|a, b| b.cpu_percent.total_cmp(&a.cpu_percent));
        sorted.truncate(n);
        sorted
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn analysis_peak_is_max_reading() {
        let a = CpuAnalysis::from_readings(vec![70.0, 80.0, 90.0, 85.0, 75.0], 80.0);
        assert_eq!(a.peak_cpu, 90.0);
        assert_eq!(a.average_cpu, 80.0);
        assert!(a.high_usage_detected);
    }

    #[test]
    fn analysis_peak_equal_to_threshold_is_not_high() {
        let a = CpuAnalysis::from_readings(vec![10.0, 80.0], 80.0);
        assert!(!a.high_usage_detected);
    }

    #[test]
    fn analysis_of_empty_series_is_zeroed() {
        let a = CpuAnalysis::from_readings(vec![], 80.0);
        assert_eq!(a.peak_cpu, 0.0);
        assert_eq!(a.average_cpu, 0.0);
        assert!(!a.high_usage_detected);
    }

    #[test]
    fn indicators_serialize_snake_case() {
        let json = serde_json::to_string(&Indicator::HighNetworkIo).unwrap();
        assert_eq!(json, "\"high_network_io\"");
    }
}
