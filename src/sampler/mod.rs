// Sampler: instant and delta readings of host counters through a CounterSource port

mod linux;
mod sysinfo_source;

pub use sysinfo_source::SysinfoCounters;

use crate::error::SampleError;
use crate::logging::EventLog;
use crate::models::{CounterGroup, DeltaWindow, Metric, Sample, Unit};
use std::sync::Arc;
use tokio::time::{Duration, Instant};

/// Raw host counters. Implementations may block; the sampler calls them on the
/// blocking pool.
pub trait CounterSource: Send + Sync + 'static {
    /// Global CPU percent measured over `window`; blocks for the window.
    /// None when the counter is unavailable.
    fn cpu_percent(&self, window: Duration) -> Option<f64>;

    /// Cumulative byte counter. None when unavailable.
    fn counter(&self, metric: Metric) -> Option<u64>;
}

pub struct Sampler {
    source: Arc<dyn CounterSource>,
    log: Arc<dyn EventLog>,
    cpu_window: Duration,
}

impl Sampler {
    pub fn new(source: Arc<dyn CounterSource>, log: Arc<dyn EventLog>, cpu_window: Duration) -> Self {
        Self {
            source,
            log,
            cpu_window,
        }
    }

    pub fn cpu_window(&self) -> Duration {
        self.cpu_window
    }

    /// One immediate reading. For CPU this consumes one CPU window.
    /// An unavailable counter yields a zero sample and one warning.
    pub async fn sample_instant(&self, metric: Metric) -> Sample {
        let value = self.read(vec![metric]).await.pop().flatten();
        let captured_at = Instant::now();
        Sample::at(metric, self.degrade(metric, value), captured_at)
    }

    /// Sample, wait `interval`, sample again.
    pub async fn sample_delta(
        &self,
        metric: Metric,
        interval: Duration,
    ) -> Result<DeltaWindow, SampleError> {
        if metric.unit() != Unit::Bytes {
            return Err(SampleError::NotACounter(metric));
        }
        let mut windows = self.sample_counters_delta(vec![metric], interval).await?;
        windows.pop().ok_or(SampleError::NotACounter(metric))
    }

    /// One window over every counter of `group`, both counters read at each end.
    pub async fn sample_group_delta(
        &self,
        group: CounterGroup,
        interval: Duration,
    ) -> Result<Vec<DeltaWindow>, SampleError> {
        self.sample_counters_delta(group.metrics().to_vec(), interval)
            .await
    }

    async fn sample_counters_delta(
        &self,
        metrics: Vec<Metric>,
        interval: Duration,
    ) -> Result<Vec<DeltaWindow>, SampleError> {
        let start_values = self.read(metrics.clone()).await;
        let start_at = Instant::now();
        tokio::time::sleep(interval).await;
        let end_values = self.read(metrics.clone()).await;
        let end_at = Instant::now();

        metrics
            .into_iter()
            .zip(start_values.into_iter().zip(end_values))
            .map(|(metric, values)| {
                // Half a window would fake a spike or a drop: zero both ends.
                let (start, end) = match values {
                    (Some(s), Some(e)) => (s, e),
                    (s, e) => {
                        self.degrade(metric, s.and(e));
                        (0.0, 0.0)
                    }
                };
                DeltaWindow::new(
                    Sample::at(metric, start, start_at),
                    Sample::at(metric, end, end_at),
                    interval,
                )
            })
            .collect()
    }

    async fn read(&self, metrics: Vec<Metric>) -> Vec<Option<f64>> {
        let source = self.source.clone();
        let window = self.cpu_window;
        let n = metrics.len();
        match tokio::task::spawn_blocking(move || {
            metrics
                .into_iter()
                .map(|metric| match metric {
                    Metric::CpuPercent => source.cpu_percent(window),
                    _ => source.counter(metric).map(|v| v as f64),
                })
                .collect::<Vec<_>>()
        })
        .await
        {
            Ok(values) => values,
            Err(e) => {
                self.log.error(&format!("counter read task failed: {}", e));
                vec![None; n]
            }
        }
    }

    fn degrade(&self, metric: Metric, value: Option<f64>) -> f64 {
        match value {
            Some(v) => v,
            None => {
                self.log
                    .warn(&format!("{} unavailable, using degraded zero reading", metric));
                0.0
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::logging::{LogLevel, MemoryLog};
    use crate::models::BYTES_PER_MB;
    use std::collections::HashMap;
    use std::sync::Mutex;

    #[derive(Default)]
    struct ScriptedCounters {
        cpu: Mutex<Vec<f64>>,
        counters: Mutex<HashMap<Metric, Vec<Option<u64>>>>,
    }

    impl CounterSource for ScriptedCounters {
        fn cpu_percent(&self, _window: Duration) -> Option<f64> {
            let mut cpu = self.cpu.lock().unwrap();
            if cpu.is_empty() { None } else { Some(cpu.remove(0)) }
        }

        fn counter(&self, metric: Metric) -> Option<u64> {
            let mut counters = self.counters.lock().unwrap();
            let seq = counters.get_mut(&metric)?;
            if seq.is_empty() { None } else { seq.remove(0) }
        }
    }

    fn sampler(source: ScriptedCounters) -> (Sampler, Arc<MemoryLog>) {
        let log = Arc::new(MemoryLog::new());
        let s = Sampler::new(Arc::new(source), log.clone(), Duration::from_secs(1));
        (s, log)
    }

    #[tokio::test(start_paused = true)]
    async fn instant_cpu_sample_reads_source() {
        let source = ScriptedCounters::default();
        source.cpu.lock().unwrap().push(42.5);
        let (s, log) = sampler(source);
        let sample = s.sample_instant(Metric::CpuPercent).await;
        assert_eq!(sample.value(), 42.5);
        assert_eq!(sample.unit(), Unit::Percent);
        assert!(log.entries().is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn unavailable_cpu_degrades_to_zero_with_one_warning() {
        let (s, log) = sampler(ScriptedCounters::default());
        let sample = s.sample_instant(Metric::CpuPercent).await;
        assert_eq!(sample.value(), 0.0);
        assert_eq!(log.count(LogLevel::Warn), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn delta_spans_the_interval() {
        let source = ScriptedCounters::default();
        source.counters.lock().unwrap().insert(
            Metric::NetSentBytes,
            vec![Some(0), Some((20.0 * BYTES_PER_MB) as u64)],
        );
        let (s, _) = sampler(source);
        let w = s
            .sample_delta(Metric::NetSentBytes, Duration::from_secs(1))
            .await
            .unwrap();
        assert_eq!(w.end().captured_at() - w.start().captured_at(), Duration::from_secs(1));
        assert_eq!(w.rate(), 20.0);
    }

    #[tokio::test(start_paused = true)]
    async fn delta_rejects_cpu_metric() {
        let (s, _) = sampler(ScriptedCounters::default());
        let err = s
            .sample_delta(Metric::CpuPercent, Duration::from_secs(1))
            .await
            .unwrap_err();
        assert!(matches!(err, SampleError::NotACounter(_)));
    }

    #[tokio::test(start_paused = true)]
    async fn half_available_window_is_zeroed() {
        let source = ScriptedCounters::default();
        source
            .counters
            .lock()
            .unwrap()
            .insert(Metric::DiskReadBytes, vec![None, Some(1 << 40)]);
        let (s, log) = sampler(source);
        let w = s
            .sample_delta(Metric::DiskReadBytes, Duration::from_secs(2))
            .await
            .unwrap();
        assert_eq!(w.rate(), 0.0);
        assert_eq!(log.count(LogLevel::Warn), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn group_delta_returns_one_window_per_counter() {
        let source = ScriptedCounters::default();
        {
            let mut c = source.counters.lock().unwrap();
            c.insert(Metric::DiskReadBytes, vec![Some(0), Some(4096)]);
            c.insert(Metric::DiskWriteBytes, vec![Some(100), Some(50)]);
        }
        let (s, _) = sampler(source);
        let windows = s
            .sample_group_delta(CounterGroup::Disk, Duration::from_secs(2))
            .await
            .unwrap();
        assert_eq!(windows.len(), 2);
        assert_eq!(windows[0].metric(), Metric::DiskReadBytes);
        assert_eq!(windows[0].delta_bytes(), 4096.0);
        assert_eq!(windows[1].delta_bytes(), 0.0);
    }
}
