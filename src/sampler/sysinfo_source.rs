// Host counters via sysinfo (CPU, network) and /proc/diskstats (disk on Linux)

use super::{CounterSource, linux};
use crate::models::Metric;
use std::sync::Mutex;
use std::time::Duration;
use sysinfo::{Networks, System};

pub struct SysinfoCounters {
    sys: Mutex<System>,
    networks: Mutex<Networks>,
    #[cfg(not(target_os = "linux"))]
    disks: Mutex<sysinfo::Disks>,
}

impl Default for SysinfoCounters {
    fn default() -> Self {
        Self::new()
    }
}

impl SysinfoCounters {
    pub fn new() -> Self {
        let mut sys = System::new();
        sys.refresh_cpu_usage();
        Self {
            sys: Mutex::new(sys),
            networks: Mutex::new(Networks::new_with_refreshed_list()),
            #[cfg(not(target_os = "linux"))]
            disks: Mutex::new(sysinfo::Disks::new_with_refreshed_list()),
        }
    }

    fn disk_bytes(&self) -> Option<(u64, u64)> {
        #[cfg(target_os = "linux")]
        {
            linux::read_disk_bytes()
        }
        #[cfg(not(target_os = "linux"))]
        {
            let mut disks = self.disks.lock().ok()?;
            disks.refresh(false);
            if disks.list().is_empty() {
                return None;
            }
            Some(disks.list().iter().fold((0u64, 0u64), |(r, w), d| {
                let usage = d.usage();
                (
                    r.saturating_add(usage.total_read_bytes),
                    w.saturating_add(usage.total_written_bytes),
                )
            }))
        }
    }

    fn network_bytes(&self) -> Option<(u64, u64)> {
        let mut networks = self.networks.lock().ok()?;
        networks.refresh(true);
        if networks.list().is_empty() {
            return None;
        }
        Some(
            networks
                .list()
                .values()
                .fold((0u64, 0u64), |(sent, recv), data| {
                    (
                        sent.saturating_add(data.total_transmitted()),
                        recv.saturating_add(data.total_received()),
                    )
                }),
        )
    }
}

impl CounterSource for SysinfoCounters {
    fn cpu_percent(&self, window: Duration) -> Option<f64> {
        let mut sys = self.sys.lock().ok()?;
        sys.refresh_cpu_usage();
        std::thread::sleep(window.max(sysinfo::MINIMUM_CPU_UPDATE_INTERVAL));
        sys.refresh_cpu_usage();
        if sys.cpus().is_empty() {
            return None;
        }
        Some((sys.global_cpu_usage() as f64).clamp(0.0, 100.0))
    }

    fn counter(&self, metric: Metric) -> Option<u64> {
        match metric {
            Metric::DiskReadBytes => self.disk_bytes().map(|(r, _)| r),
            Metric::DiskWriteBytes => self.disk_bytes().map(|(_, w)| w),
            Metric::NetSentBytes => self.network_bytes().map(|(s, _)| s),
            Metric::NetRecvBytes => self.network_bytes().map(|(_, r)| r),
            Metric::CpuPercent => None,
        }
    }
}
