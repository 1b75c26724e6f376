// Live process table via sysinfo

use super::{ProcessEntry, ProcessStat, ProcessTable};
use std::sync::Mutex;
use std::time::Duration;
use sysinfo::{Pid, ProcessesToUpdate, System};

pub struct SysinfoProcessTable {
    sys: Mutex<System>,
}

impl Default for SysinfoProcessTable {
    fn default() -> Self {
        Self::new()
    }
}

impl SysinfoProcessTable {
    pub fn new() -> Self {
        let mut sys = System::new();
        sys.refresh_cpu_usage();
        Self {
            sys: Mutex::new(sys),
        }
    }
}

impl ProcessTable for SysinfoProcessTable {
    fn logical_cores(&self) -> usize {
        let from_sysinfo = self.sys.lock().map(|s| s.cpus().len()).unwrap_or(0);
        if from_sysinfo > 0 {
            return from_sysinfo;
        }
        std::thread::available_parallelism()
            .map(|n| n.get())
            .unwrap_or(1)
    }

    fn processes(&self) -> Vec<ProcessEntry> {
        let Ok(mut sys) = self.sys.lock() else {
            return Vec::new();
        };
        sys.refresh_processes(ProcessesToUpdate::All, true);
        let mut entries: Vec<ProcessEntry> = sys
            .processes()
            .iter()
            .map(|(pid, p)| ProcessEntry {
                pid: pid.as_u32(),
                name: p.name().to_string_lossy().into_owned(),
            })
            .collect();
        // sysinfo hands back a map; ascending pid is the /proc walk order.
        entries.sort_by_key(|e| e.pid);
        entries
    }

    fn stat(&self, pid: u32) -> Option<ProcessStat> {
        let mut sys = self.sys.lock().ok()?;
        let pid = Pid::from_u32(pid);
        sys.refresh_processes(ProcessesToUpdate::Some(&[pid]), true);
        let process = sys.process(pid)?;
        Some(ProcessStat {
            cpu_time: Duration::from_millis(process.accumulated_cpu_time()),
            memory_bytes: process.memory(),
        })
    }
}
