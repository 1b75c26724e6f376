// Process correlator: keyword filter, two-phase CPU attribution, core-normalized threshold

mod sysinfo_table;

pub use sysinfo_table::SysinfoProcessTable;

use crate::logging::EventLog;
use crate::models::{BYTES_PER_MB, ProcessReading};
use std::collections::HashMap;
use std::sync::Arc;
use tokio::time::{Duration, Instant};

/// A live process as enumerated, before any CPU accounting.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProcessEntry {
    pub pid: u32,
    pub name: String,
}

/// Cumulative accounting for one process at one point in time.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ProcessStat {
    pub cpu_time: Duration,
    pub memory_bytes: u64,
}

/// Live process table. Implementations may block.
pub trait ProcessTable: Send + Sync + 'static {
    fn logical_cores(&self) -> usize;

    /// Live processes in enumeration order.
    fn processes(&self) -> Vec<ProcessEntry>;

    /// None when the process has exited or access is denied.
    fn stat(&self, pid: u32) -> Option<ProcessStat>;
}

#[derive(Debug, Clone)]
pub struct CorrelatorSettings {
    pub keywords: Vec<String>,
    /// Single-core saturation percent, divided by the core count.
    pub nominal_cpu_percent: f64,
    pub prime_interval: Duration,
}

impl Default for CorrelatorSettings {
    fn default() -> Self {
        Self {
            keywords: vec!["augment".into(), "vscode".into(), "code".into()],
            nominal_cpu_percent: 80.0,
            prime_interval: Duration::from_millis(100),
        }
    }
}

#[derive(Debug, Clone, Copy)]
struct CpuSnapshot {
    cpu_time: Duration,
    taken_at: Instant,
}

pub struct ProcessCorrelator {
    table: Arc<dyn ProcessTable>,
    log: Arc<dyn EventLog>,
    settings: CorrelatorSettings,
    keywords: Vec<String>,
    /// Primed candidates in enumeration order; last-seen CPU time per pid.
    primed: Vec<ProcessEntry>,
    snapshots: HashMap<u32, CpuSnapshot>,
}

/// Case-insensitive substring match; `keywords` are already lowercase.
fn name_matches(keywords: &[String], name: &str) -> bool {
    let name = name.to_lowercase();
    keywords.iter().any(|k| name.contains(k.as_str()))
}

/// Per-process CPU limit for a host with `cores` logical cores.
pub fn normalized_threshold(nominal_percent: f64, cores: usize) -> f64 {
    nominal_percent / cores.max(1) as f64
}

impl ProcessCorrelator {
    pub fn new(
        table: Arc<dyn ProcessTable>,
        log: Arc<dyn EventLog>,
        settings: CorrelatorSettings,
    ) -> Self {
        let keywords = settings.keywords.iter().map(|k| k.to_lowercase()).collect();
        Self {
            table,
            log,
            settings,
            keywords,
            primed: Vec::new(),
            snapshots: HashMap::new(),
        }
    }

    pub fn matches(&self, name: &str) -> bool {
        name_matches(&self.keywords, name)
    }

    pub async fn effective_threshold(&self) -> f64 {
        let table = self.table.clone();
        let cores = tokio::task::spawn_blocking(move || table.logical_cores())
            .await
            .unwrap_or(1);
        normalized_threshold(self.settings.nominal_cpu_percent, cores)
    }

    /// First phase: record a CPU-time snapshot for every matching process.
    /// Returns the number of primed candidates.
    pub async fn prime(&mut self) -> usize {
        let table = self.table.clone();
        let keywords = self.keywords.clone();
        let primed = tokio::task::spawn_blocking(move || {
            table
                .processes()
                .into_iter()
                .filter(|p| name_matches(&keywords, &p.name))
                .filter_map(|p| table.stat(p.pid).map(|s| (p, s.cpu_time)))
                .collect::<Vec<_>>()
        })
        .await
        .unwrap_or_else(|e| {
            self.log
                .error(&format!("process enumeration task failed: {}", e));
            Vec::new()
        });

        let taken_at = Instant::now();
        self.primed.clear();
        self.snapshots.clear();
        for (entry, cpu_time) in primed {
            self.snapshots
                .insert(entry.pid, CpuSnapshot { cpu_time, taken_at });
            self.primed.push(entry);
        }
        self.primed.len()
    }

    /// Second phase: CPU percent since the prime for every primed process that
    /// is still readable, in enumeration order. Vanished processes are skipped.
    pub async fn read(&mut self) -> Vec<ProcessReading> {
        let table = self.table.clone();
        let pids: Vec<u32> = self.primed.iter().map(|p| p.pid).collect();
        let stats = tokio::task::spawn_blocking(move || {
            pids.into_iter().map(|pid| table.stat(pid)).collect::<Vec<_>>()
        })
        .await
        .unwrap_or_else(|e| {
            self.log.error(&format!("process read task failed: {}", e));
            Vec::new()
        });
        let now = Instant::now();

        let mut readings = Vec::with_capacity(self.primed.len());
        for (entry, stat) in self.primed.iter().zip(stats) {
            let (Some(stat), Some(prev)) = (stat, self.snapshots.get(&entry.pid).copied()) else {
                continue;
            };
            let wall = now.duration_since(prev.taken_at).as_secs_f64();
            let cpu_percent = if wall > 0.0 {
                stat.cpu_time.saturating_sub(prev.cpu_time).as_secs_f64() / wall * 100.0
            } else {
                0.0
            };
            self.snapshots.insert(
                entry.pid,
                CpuSnapshot {
                    cpu_time: stat.cpu_time,
                    taken_at: now,
                },
            );
            readings.push(ProcessReading {
                pid: entry.pid,
                name: entry.name.clone(),
                cpu_percent,
                memory_mb: stat.memory_bytes as f64 / BYTES_PER_MB,
            });
        }
        readings
    }

    /// One correlator pass: prime, wait the prime interval, read, flag.
    pub async fn correlate(&mut self) -> Vec<ProcessReading> {
        self.log.info("analyzing running processes");
        self.prime().await;
        tokio::time::sleep(self.settings.prime_interval).await;
        let readings = self.read().await;
        let threshold = self.effective_threshold().await;
        for r in flagged(&readings, threshold) {
            self.log.warn(&format!(
                "high CPU process: {} (pid {}) - CPU {:.1}%, memory {:.1}MB (limit {:.1}%)",
                r.name, r.pid, r.cpu_percent, r.memory_mb, threshold
            ));
        }
        readings
    }
}

/// Readings strictly above `threshold`, in input order.
pub fn flagged(
    readings: &[ProcessReading],
    threshold: f64,
) -> impl Iterator<Item = &ProcessReading> {
    readings.iter().filter(move |r| r.cpu_percent > threshold)
}
