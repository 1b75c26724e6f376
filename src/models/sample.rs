// Point-in-time samples and before/after delta windows

use crate::error::SampleError;
use serde::{Deserialize, Serialize};
use tokio::time::{Duration, Instant};

pub const BYTES_PER_MB: f64 = 1024.0 * 1024.0;

/// Unit carried by every metric, so percentages and byte counters never mix.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Unit {
    Percent,
    Bytes,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Metric {
    CpuPercent,
    DiskReadBytes,
    DiskWriteBytes,
    NetSentBytes,
    NetRecvBytes,
}

impl Metric {
    pub fn unit(self) -> Unit {
        match self {
            Metric::CpuPercent => Unit::Percent,
            _ => Unit::Bytes,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Metric::CpuPercent => "cpu_percent",
            Metric::DiskReadBytes => "disk_read_bytes",
            Metric::DiskWriteBytes => "disk_write_bytes",
            Metric::NetSentBytes => "net_sent_bytes",
            Metric::NetRecvBytes => "net_recv_bytes",
        }
    }
}

impl std::fmt::Display for Metric {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Byte counters sampled together over one window.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CounterGroup {
    Disk,
    Network,
}

impl CounterGroup {
    pub fn metrics(self) -> [Metric; 2] {
        match self {
            CounterGroup::Disk => [Metric::DiskReadBytes, Metric::DiskWriteBytes],
            CounterGroup::Network => [Metric::NetSentBytes, Metric::NetRecvBytes],
        }
    }
}

/// One immutable reading of a metric.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Sample {
    metric: Metric,
    value: f64,
    captured_at: Instant,
}

impl Sample {
    /// Reading captured now.
    pub fn new(metric: Metric, value: f64) -> Self {
        Self::at(metric, value, Instant::now())
    }

    pub fn at(metric: Metric, value: f64, captured_at: Instant) -> Self {
        Self {
            metric,
            value,
            captured_at,
        }
    }

    pub fn metric(&self) -> Metric {
        self.metric
    }

    pub fn unit(&self) -> Unit {
        self.metric.unit()
    }

    pub fn value(&self) -> f64 {
        self.value
    }

    pub fn captured_at(&self) -> Instant {
        self.captured_at
    }
}

/// Two samples of the same byte counter taken `interval` apart.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct DeltaWindow {
    start: Sample,
    end: Sample,
    interval: Duration,
}

impl DeltaWindow {
    pub fn new(start: Sample, end: Sample, interval: Duration) -> Result<Self, SampleError> {
        if start.metric != end.metric {
            return Err(SampleError::MetricMismatch {
                start: start.metric,
                end: end.metric,
            });
        }
        if start.unit() != Unit::Bytes {
            return Err(SampleError::NotACounter(start.metric));
        }
        if end.captured_at <= start.captured_at {
            return Err(SampleError::NonIncreasingTimestamps(start.metric));
        }
        if interval.is_zero() {
            return Err(SampleError::ZeroInterval(start.metric));
        }
        Ok(Self {
            start,
            end,
            interval,
        })
    }

    pub fn metric(&self) -> Metric {
        self.start.metric
    }

    pub fn start(&self) -> &Sample {
        &self.start
    }

    pub fn end(&self) -> &Sample {
        &self.end
    }

    pub fn interval(&self) -> Duration {
        self.interval
    }

    /// Counter delta in bytes; a counter that went backwards yields zero.
    pub fn delta_bytes(&self) -> f64 {
        (self.end.value - self.start.value).max(0.0)
    }

    /// Rate in MB per second.
    pub fn rate(&self) -> f64 {
        self.delta_bytes() / self.interval.as_secs_f64() / BYTES_PER_MB
    }
}
