// Shared test fakes: scripted host counters and a scripted process table

#![allow(dead_code)]

use extguard::correlator::{
    CorrelatorSettings, ProcessCorrelator, ProcessEntry, ProcessStat, ProcessTable,
};
use extguard::detector::{Detector, DetectorConfig, DetectorDeps};
use extguard::extensions::ExtensionLocator;
use extguard::logging::{EventLog, MemoryLog};
use extguard::models::{BYTES_PER_MB, Metric, ThresholdConfig};
use extguard::sampler::{CounterSource, Sampler};
use std::collections::{HashMap, VecDeque};
use std::path::PathBuf;
use std::sync::{Arc, Mutex};
use std::time::Duration;

pub const CPU_WINDOW: Duration = Duration::from_secs(1);

pub fn mb(n: f64) -> u64 {
    (n * BYTES_PER_MB) as u64
}

/// Pops one scripted value per call; the last value repeats.
fn next<T: Copy>(queue: &mut VecDeque<T>) -> Option<T> {
    if queue.len() > 1 {
        queue.pop_front()
    } else {
        queue.front().copied()
    }
}

#[derive(Default)]
pub struct FakeCounters {
    cpu: Mutex<VecDeque<Option<f64>>>,
    counters: Mutex<HashMap<Metric, VecDeque<Option<u64>>>>,
    /// Real time spent inside each CPU read.
    cpu_delay: Duration,
}

impl FakeCounters {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cpu(self, values: &[f64]) -> Self {
        *self.cpu.lock().unwrap() = values.iter().map(|v| Some(*v)).collect();
        self
    }

    pub fn counter(self, metric: Metric, values: &[Option<u64>]) -> Self {
        self.counters
            .lock()
            .unwrap()
            .insert(metric, values.iter().copied().collect());
        self
    }

    /// Every byte counter constant, so every rate is zero.
    pub fn idle(self) -> Self {
        let mut s = self;
        for m in [
            Metric::DiskReadBytes,
            Metric::DiskWriteBytes,
            Metric::NetSentBytes,
            Metric::NetRecvBytes,
        ] {
            s = s.counter(m, &[Some(4096)]);
        }
        s
    }

    pub fn cpu_delay(mut self, delay: Duration) -> Self {
        self.cpu_delay = delay;
        self
    }
}

impl CounterSource for FakeCounters {
    fn cpu_percent(&self, _window: Duration) -> Option<f64> {
        if !self.cpu_delay.is_zero() {
            std::thread::sleep(self.cpu_delay);
        }
        let mut cpu = self.cpu.lock().unwrap();
        next(&mut *cpu).flatten()
    }

    fn counter(&self, metric: Metric) -> Option<u64> {
        let mut counters = self.counters.lock().unwrap();
        counters.get_mut(&metric).and_then(next).flatten()
    }
}

struct FakeProcess {
    entry: ProcessEntry,
    cpu_percent: f64,
    memory_mb: f64,
    /// Readable for this many stat calls, then gone.
    lifetime: Option<usize>,
    calls: usize,
}

/// Each stat call adds `cpu_percent` of the default 100ms prime interval to the
/// process CPU time, so a prime/read pair reports `cpu_percent`.
pub struct FakeProcessTable {
    cores: usize,
    procs: Mutex<Vec<FakeProcess>>,
}

impl FakeProcessTable {
    pub fn new(cores: usize) -> Self {
        Self {
            cores,
            procs: Mutex::new(Vec::new()),
        }
    }

    pub fn process(self, pid: u32, name: &str, cpu_percent: f64, memory_mb: f64) -> Self {
        self.push(pid, name, cpu_percent, memory_mb, None)
    }

    /// Listed, but exits after `lifetime` stat calls.
    pub fn short_lived(self, pid: u32, name: &str, lifetime: usize) -> Self {
        self.push(pid, name, 50.0, 10.0, Some(lifetime))
    }

    fn push(
        self,
        pid: u32,
        name: &str,
        cpu_percent: f64,
        memory_mb: f64,
        lifetime: Option<usize>,
    ) -> Self {
        self.procs.lock().unwrap().push(FakeProcess {
            entry: ProcessEntry {
                pid,
                name: name.to_string(),
            },
            cpu_percent,
            memory_mb,
            lifetime,
            calls: 0,
        });
        self
    }
}

impl ProcessTable for FakeProcessTable {
    fn logical_cores(&self) -> usize {
        self.cores
    }

    fn processes(&self) -> Vec<ProcessEntry> {
        let mut entries: Vec<ProcessEntry> = self
            .procs
            .lock()
            .unwrap()
            .iter()
            .map(|p| p.entry.clone())
            .collect();
        entries.sort_by_key(|e| e.pid);
        entries
    }

    fn stat(&self, pid: u32) -> Option<ProcessStat> {
        let mut procs = self.procs.lock().unwrap();
        let p = procs.iter_mut().find(|p| p.entry.pid == pid)?;
        if p.lifetime.is_some_and(|l| p.calls >= l) {
            return None;
        }
        p.calls += 1;
        // cpu_percent% of 100ms, in microseconds
        let step_us = (p.cpu_percent * 1000.0) as u64;
        Some(ProcessStat {
            cpu_time: Duration::from_micros(step_us * p.calls as u64),
            memory_bytes: (p.memory_mb * BYTES_PER_MB) as u64,
        })
    }
}

pub struct Harness {
    pub counters: FakeCounters,
    pub table: FakeProcessTable,
    pub roots: Vec<PathBuf>,
    pub duration: Duration,
}

impl Harness {
    pub fn new(counters: FakeCounters, table: FakeProcessTable) -> Self {
        Self {
            counters,
            table,
            roots: Vec::new(),
            duration: Duration::from_secs(3),
        }
    }

    pub fn roots(mut self, roots: Vec<PathBuf>) -> Self {
        self.roots = roots;
        self
    }

    pub fn duration(mut self, duration: Duration) -> Self {
        self.duration = duration;
        self
    }

    pub fn build(self, log: Arc<MemoryLog>) -> Detector {
        let log: Arc<dyn EventLog> = log;
        let deps = DetectorDeps {
            sampler: Sampler::new(Arc::new(self.counters), log.clone(), CPU_WINDOW),
            correlator: ProcessCorrelator::new(
                Arc::new(self.table),
                log.clone(),
                CorrelatorSettings::default(),
            ),
            locator: ExtensionLocator::new(self.roots, vec!["*augment*".into()]),
            log,
        };
        Detector::new(
            deps,
            DetectorConfig {
                thresholds: ThresholdConfig {
                    cpu_threshold: 80.0,
                    disk_threshold: 50.0,
                    network_threshold: 10.0,
                    monitoring_duration: self.duration,
                },
                ..DetectorConfig::default()
            },
        )
    }
}
