// One-shot health summary: host usage grades, extension state, process counts, backups

use crate::correlator::ProcessTable;
use crate::extensions::VersionClass;
use serde::Serialize;
use std::fmt;
use std::path::{Path, PathBuf};
use std::time::Duration;
use sysinfo::{Disks, System};
use tracing::warn;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Grade {
    Good,
    Warning,
    Critical,
}

impl fmt::Display for Grade {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Grade::Good => "good",
            Grade::Warning => "warning",
            Grade::Critical => "critical",
        })
    }
}

/// Below `warn_at` is good, below `critical_at` is a warning, the rest critical.
pub fn grade(value: f64, warn_at: f64, critical_at: f64) -> Grade {
    if value < warn_at {
        Grade::Good
    } else if value < critical_at {
        Grade::Warning
    } else {
        Grade::Critical
    }
}

pub fn grade_cpu(percent: f64) -> Grade {
    grade(percent, 70.0, 90.0)
}

pub fn grade_memory(percent: f64) -> Grade {
    grade(percent, 80.0, 95.0)
}

pub fn grade_disk(percent: f64) -> Grade {
    grade(percent, 85.0, 95.0)
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize)]
pub struct HostUsage {
    pub cpu_percent: f64,
    pub memory_percent: f64,
    pub disk_percent: f64,
}

/// Samples global CPU over `cpu_window`, memory, and the root filesystem.
pub async fn measure_host(cpu_window: Duration) -> HostUsage {
    let result = tokio::task::spawn_blocking(move || {
        let mut sys = System::new();
        sys.refresh_cpu_usage();
        std::thread::sleep(cpu_window.max(sysinfo::MINIMUM_CPU_UPDATE_INTERVAL));
        sys.refresh_cpu_usage();
        sys.refresh_memory();

        let memory_percent = percent(sys.used_memory(), sys.total_memory());
        let disks = Disks::new_with_refreshed_list();
        let root = disks
            .list()
            .iter()
            .find(|d| d.mount_point() == Path::new("/"))
            .or_else(|| disks.list().first());
        let disk_percent = root
            .map(|d| percent(d.total_space().saturating_sub(d.available_space()), d.total_space()))
            .unwrap_or(0.0);

        HostUsage {
            cpu_percent: (sys.global_cpu_usage() as f64).clamp(0.0, 100.0),
            memory_percent,
            disk_percent,
        }
    })
    .await;

    result.unwrap_or_else(|e| {
        warn!(error = %e, operation = "measure_host", "host measurement task failed");
        HostUsage::default()
    })
}

fn percent(part: u64, total: u64) -> f64 {
    if total == 0 {
        0.0
    } else {
        part as f64 / total as f64 * 100.0
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ExtensionStatus {
    pub path: PathBuf,
    pub version: String,
    #[serde(skip)]
    pub class: VersionClass,
    pub locked: bool,
}

/// Counts matching processes as (extension, editor). Names containing `label`
/// are the extension's own; any other keyword match is the editor.
pub fn count_processes(table: &dyn ProcessTable, label: &str, keywords: &[String]) -> (usize, usize) {
    let label = label.to_lowercase();
    let keywords: Vec<String> = keywords.iter().map(|k| k.to_lowercase()).collect();
    table
        .processes()
        .iter()
        .map(|p| p.name.to_lowercase())
        .fold((0, 0), |(ext, editor), name| {
            if name.contains(&label) {
                (ext + 1, editor)
            } else if keywords.iter().any(|k| name.contains(k.as_str())) {
                (ext, editor + 1)
            } else {
                (ext, editor)
            }
        })
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SystemStatus {
    pub host: HostUsage,
    pub extension: Option<ExtensionStatus>,
    pub stable_version: String,
    pub extension_processes: usize,
    pub editor_processes: usize,
    pub backups: usize,
}

impl SystemStatus {
    pub fn recommendations(&self) -> Vec<String> {
        let mut out = Vec::new();
        if self.host.cpu_percent > 80.0 {
            out.push("High CPU usage - run `extguard detect` to find the cause".to_string());
        }
        if let Some(ext) = &self.extension {
            if !ext.locked {
                out.push("Extension version is not locked - run `extguard version lock`".to_string());
            }
            if ext.version != self.stable_version {
                out.push(format!(
                    "Extension is not on stable version {} - consider `extguard version rollback`",
                    self.stable_version
                ));
            }
        }
        if self.backups == 0 {
            out.push("No version backups - run `extguard version backup`".to_string());
        }
        out
    }

    pub fn render(&self) -> String {
        let mut lines = vec![
            "System status".to_string(),
            format!(
                "  CPU:    {:5.1}% ({})",
                self.host.cpu_percent,
                grade_cpu(self.host.cpu_percent)
            ),
            format!(
                "  Memory: {:5.1}% ({})",
                self.host.memory_percent,
                grade_memory(self.host.memory_percent)
            ),
            format!(
                "  Disk:   {:5.1}% ({})",
                self.host.disk_percent,
                grade_disk(self.host.disk_percent)
            ),
        ];
        match &self.extension {
            Some(ext) => {
                let class = match ext.class {
                    VersionClass::Stable => "stable",
                    VersionClass::Problematic => "known problematic",
                    VersionClass::Unknown => "unverified",
                };
                lines.push(format!("  Extension: {}", ext.path.display()));
                lines.push(format!("  Version:   {} ({})", ext.version, class));
                lines.push(format!(
                    "  Locked:    {}",
                    if ext.locked { "yes" } else { "no" }
                ));
            }
            None => lines.push("  Extension: not found".to_string()),
        }
        lines.push(format!(
            "  Processes: {} extension, {} editor",
            self.extension_processes, self.editor_processes
        ));
        lines.push(format!("  Backups:   {}", self.backups));

        let recommendations = self.recommendations();
        lines.push(String::new());
        if recommendations.is_empty() {
            lines.push("System appears healthy".to_string());
        } else {
            lines.push("Recommendations:".to_string());
            for (i, r) in recommendations.iter().enumerate() {
                lines.push(format!("  {}. {}", i + 1, r));
            }
        }
        lines.join("\n")
    }
}
