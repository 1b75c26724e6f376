// Threshold policy for one run

use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Limits applied during one run. Built once from config + CLI flags, never mutated.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ThresholdConfig {
    /// Global CPU percent.
    pub cpu_threshold: f64,
    /// MB/s over the disk window (read + write).
    pub disk_threshold: f64,
    /// MB/s over the network window (sent + received).
    pub network_threshold: f64,
    pub monitoring_duration: Duration,
}

impl Default for ThresholdConfig {
    fn default() -> Self {
        Self {
            cpu_threshold: 80.0,
            disk_threshold: 50.0,
            network_threshold: 10.0,
            monitoring_duration: Duration::from_secs(30),
        }
    }
}
