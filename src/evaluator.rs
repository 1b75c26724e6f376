// Threshold policy: strict greater-than on MB/s rates and CPU percent

use crate::models::{CounterGroup, DeltaWindow, Indicator, Metric};

#[derive(Debug, Default, Clone, Copy)]
pub struct ThresholdEvaluator;

impl ThresholdEvaluator {
    pub fn new() -> Self {
        Self
    }

    /// Indicator for one counter window whose rate strictly exceeds `threshold_mb`.
    pub fn evaluate(&self, window: &DeltaWindow, threshold_mb: f64) -> Option<Indicator> {
        if window.rate() > threshold_mb {
            indicator_for(window.metric())
        } else {
            None
        }
    }

    /// Indicator when the summed rate of a group's windows strictly exceeds
    /// `threshold_mb`. Windows of other groups are ignored.
    pub fn evaluate_group(
        &self,
        group: CounterGroup,
        windows: &[DeltaWindow],
        threshold_mb: f64,
    ) -> Option<Indicator> {
        let members = group.metrics();
        let rate: f64 = windows
            .iter()
            .filter(|w| members.contains(&w.metric()))
            .map(DeltaWindow::rate)
            .sum();
        (rate > threshold_mb).then_some(group_indicator(group))
    }

    /// CPU percent is already a rate: compare directly.
    pub fn cpu_exceeds(&self, cpu_percent: f64, cpu_threshold: f64) -> bool {
        cpu_percent > cpu_threshold
    }
}

pub fn group_indicator(group: CounterGroup) -> Indicator {
    match group {
        CounterGroup::Disk => Indicator::HighDiskIo,
        CounterGroup::Network => Indicator::HighNetworkIo,
    }
}

/// Indicator of the group a byte counter belongs to. CPU has none.
pub fn indicator_for(metric: Metric) -> Option<Indicator> {
    match metric {
        Metric::DiskReadBytes | Metric::DiskWriteBytes => Some(Indicator::HighDiskIo),
        Metric::NetSentBytes | Metric::NetRecvBytes => Some(Indicator::HighNetworkIo),
        Metric::CpuPercent => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{BYTES_PER_MB, Sample};
    use tokio::time::{Duration, Instant};

    fn window(metric: Metric, start_mb: f64, end_mb: f64, secs: u64) -> DeltaWindow {
        let t0 = Instant::now();
        let interval = Duration::from_secs(secs);
        DeltaWindow::new(
            Sample::at(metric, start_mb * BYTES_PER_MB, t0),
            Sample::at(metric, end_mb * BYTES_PER_MB, t0 + interval),
            interval,
        )
        .unwrap()
    }

    #[test]
    fn rate_equal_to_threshold_is_not_anomalous() {
        let e = ThresholdEvaluator::new();
        let w = window(Metric::DiskReadBytes, 0.0, 100.0, 2);
        assert_eq!(w.rate(), 50.0);
        assert_eq!(e.evaluate(&w, 50.0), None);
        assert_eq!(e.evaluate(&w, 49.9), Some(Indicator::HighDiskIo));
    }

    #[test]
    fn network_window_maps_to_network_indicator() {
        let e = ThresholdEvaluator::new();
        let w = window(Metric::NetRecvBytes, 0.0, 15.0, 1);
        assert_eq!(e.evaluate(&w, 10.0), Some(Indicator::HighNetworkIo));
    }

    #[test]
    fn disk_group_sums_read_and_write() {
        let e = ThresholdEvaluator::new();
        let windows = [
            window(Metric::DiskReadBytes, 0.0, 100.0, 2),
            window(Metric::DiskWriteBytes, 0.0, 50.0, 2),
        ];
        assert_eq!(
            e.evaluate_group(CounterGroup::Disk, &windows, 50.0),
            Some(Indicator::HighDiskIo)
        );
        assert_eq!(e.evaluate_group(CounterGroup::Disk, &windows, 75.0), None);
    }

    #[test]
    fn group_ignores_foreign_windows() {
        let e = ThresholdEvaluator::new();
        let windows = [window(Metric::NetSentBytes, 0.0, 500.0, 1)];
        assert_eq!(e.evaluate_group(CounterGroup::Disk, &windows, 1.0), None);
    }

    #[test]
    fn wrapped_counter_never_fires() {
        let e = ThresholdEvaluator::new();
        let windows = [
            window(Metric::NetSentBytes, 900.0, 10.0, 1),
            window(Metric::NetRecvBytes, 900.0, 10.0, 1),
        ];
        assert_eq!(e.evaluate_group(CounterGroup::Network, &windows, 0.0), None);
    }

    #[test]
    fn cpu_rule_is_strict() {
        let e = ThresholdEvaluator::new();
        assert!(!e.cpu_exceeds(80.0, 80.0));
        assert!(e.cpu_exceeds(80.1, 80.0));
    }

    #[test]
    fn cpu_metric_has_no_indicator() {
        assert_eq!(indicator_for(Metric::CpuPercent), None);
        assert_eq!(
            indicator_for(Metric::DiskWriteBytes),
            Some(Indicator::HighDiskIo)
        );
        assert_eq!(
            indicator_for(Metric::NetSentBytes),
            Some(Indicator::HighNetworkIo)
        );
    }
}
