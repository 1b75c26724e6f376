// TOML configuration with built-in defaults and validation

use crate::correlator::CorrelatorSettings;
use crate::detector::DetectorConfig;
use crate::models::ThresholdConfig;
use anyhow::Context;
use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Env var naming the config file.
pub const CONFIG_ENV: &str = "EXTGUARD_CONFIG";
const DEFAULT_CONFIG_FILE: &str = "extguard.toml";

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    pub detection: DetectionConfig,
    pub processes: ProcessesConfig,
    pub extensions: ExtensionsConfig,
    pub versions: VersionsConfig,
    pub backup: BackupConfig,
    pub report: ReportConfig,
    pub logging: LoggingConfig,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct DetectionConfig {
    pub monitoring_duration_secs: u64,
    pub cpu_threshold: f64,
    /// MB/s, read + write, over the disk window.
    pub disk_threshold_mb: f64,
    /// MB/s, sent + received, over the network window.
    pub network_threshold_mb: f64,
    pub disk_window_secs: u64,
    pub network_window_secs: u64,
    pub cpu_window_ms: u64,
}

impl Default for DetectionConfig {
    fn default() -> Self {
        Self {
            monitoring_duration_secs: 30,
            cpu_threshold: 80.0,
            disk_threshold_mb: 50.0,
            network_threshold_mb: 10.0,
            disk_window_secs: 2,
            network_window_secs: 1,
            cpu_window_ms: 1000,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ProcessesConfig {
    /// Case-insensitive name substrings: the extension and its host editor.
    pub keywords: Vec<String>,
    pub nominal_cpu_percent: f64,
    pub prime_interval_ms: u64,
    pub cleanup_threshold: usize,
}

impl Default for ProcessesConfig {
    fn default() -> Self {
        Self {
            keywords: vec!["augment".into(), "vscode".into(), "code".into()],
            nominal_cpu_percent: 80.0,
            prime_interval_ms: 100,
            cleanup_threshold: 5,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ExtensionsConfig {
    pub roots: Vec<PathBuf>,
    pub patterns: Vec<String>,
    /// Prefix of backup names.
    pub label: String,
}

impl Default for ExtensionsConfig {
    fn default() -> Self {
        Self {
            roots: vec![
                PathBuf::from("~/.vscode/extensions"),
                PathBuf::from("~/.vscode-insiders/extensions"),
                PathBuf::from("~/.vscode-server/extensions"),
            ],
            patterns: vec!["*augment*".into()],
            label: "augment".into(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct VersionsConfig {
    pub stable: String,
    pub problematic: Vec<String>,
}

impl Default for VersionsConfig {
    fn default() -> Self {
        Self {
            stable: "0.467.1".into(),
            problematic: vec!["0.487.x".into(), "0.490.0".into(), "0.491.0".into()],
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct BackupConfig {
    pub dir: PathBuf,
    /// Action history entries kept in version_config.json.
    pub history_limit: usize,
}

impl Default for BackupConfig {
    fn default() -> Self {
        Self {
            dir: PathBuf::from("~/.augment_backups"),
            history_limit: 50,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ReportConfig {
    pub dir: PathBuf,
    pub prefix: String,
}

impl Default for ReportConfig {
    fn default() -> Self {
        Self {
            dir: PathBuf::from("."),
            prefix: "extguard_report".into(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    pub file: PathBuf,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            file: PathBuf::from("extguard.log"),
        }
    }
}

/// Expands a leading `~` to the user's home directory.
pub fn expand_home(path: &Path) -> PathBuf {
    let Ok(rest) = path.strip_prefix("~") else {
        return path.to_path_buf();
    };
    match directories::BaseDirs::new() {
        Some(dirs) => dirs.home_dir().join(rest),
        None => path.to_path_buf(),
    }
}

impl AppConfig {
    /// Explicit path, else `EXTGUARD_CONFIG`, else `./extguard.toml` if present,
    /// else built-in defaults.
    pub fn load(explicit: Option<&Path>) -> anyhow::Result<Self> {
        let path = match explicit {
            Some(p) => Some(p.to_path_buf()),
            None => match std::env::var(CONFIG_ENV) {
                Ok(p) => Some(PathBuf::from(p)),
                Err(_) => {
                    let default = PathBuf::from(DEFAULT_CONFIG_FILE);
                    default.exists().then_some(default)
                }
            },
        };
        match path {
            Some(p) => {
                let s = std::fs::read_to_string(&p)
                    .with_context(|| format!("read config {}", p.display()))?;
                Self::load_from_str(&s)
            }
            None => {
                let config = AppConfig::default();
                config.validate()?;
                Ok(config)
            }
        }
    }

    /// Parse and validate config from a string (e.g. for tests).
    pub fn load_from_str(s: &str) -> anyhow::Result<Self> {
        let config: AppConfig = toml::from_str(s)?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> anyhow::Result<()> {
        let d = &self.detection;
        anyhow::ensure!(
            d.monitoring_duration_secs > 0,
            "detection.monitoring_duration_secs must be > 0, got {}",
            d.monitoring_duration_secs
        );
        anyhow::ensure!(
            d.cpu_threshold > 0.0,
            "detection.cpu_threshold must be > 0, got {}",
            d.cpu_threshold
        );
        anyhow::ensure!(
            d.disk_threshold_mb > 0.0,
            "detection.disk_threshold_mb must be > 0, got {}",
            d.disk_threshold_mb
        );
        anyhow::ensure!(
            d.network_threshold_mb > 0.0,
            "detection.network_threshold_mb must be > 0, got {}",
            d.network_threshold_mb
        );
        anyhow::ensure!(
            d.disk_window_secs > 0,
            "detection.disk_window_secs must be > 0, got {}",
            d.disk_window_secs
        );
        anyhow::ensure!(
            d.network_window_secs > 0,
            "detection.network_window_secs must be > 0, got {}",
            d.network_window_secs
        );
        anyhow::ensure!(
            d.cpu_window_ms > 0,
            "detection.cpu_window_ms must be > 0, got {}",
            d.cpu_window_ms
        );
        anyhow::ensure!(
            !self.processes.keywords.is_empty(),
            "processes.keywords must be non-empty"
        );
        anyhow::ensure!(
            self.processes.nominal_cpu_percent > 0.0,
            "processes.nominal_cpu_percent must be > 0, got {}",
            self.processes.nominal_cpu_percent
        );
        anyhow::ensure!(
            !self.extensions.patterns.is_empty(),
            "extensions.patterns must be non-empty"
        );
        anyhow::ensure!(
            !self.extensions.label.is_empty(),
            "extensions.label must be non-empty"
        );
        anyhow::ensure!(
            self.backup.history_limit > 0,
            "backup.history_limit must be > 0, got {}",
            self.backup.history_limit
        );
        anyhow::ensure!(
            !self.report.prefix.is_empty(),
            "report.prefix must be non-empty"
        );
        Ok(())
    }

    pub fn thresholds(&self) -> ThresholdConfig {
        ThresholdConfig {
            cpu_threshold: self.detection.cpu_threshold,
            disk_threshold: self.detection.disk_threshold_mb,
            network_threshold: self.detection.network_threshold_mb,
            monitoring_duration: Duration::from_secs(self.detection.monitoring_duration_secs),
        }
    }

    pub fn detector_config(&self) -> DetectorConfig {
        DetectorConfig {
            thresholds: self.thresholds(),
            disk_window: Duration::from_secs(self.detection.disk_window_secs),
            network_window: Duration::from_secs(self.detection.network_window_secs),
            cleanup_threshold: self.processes.cleanup_threshold,
        }
    }

    pub fn correlator_settings(&self) -> CorrelatorSettings {
        CorrelatorSettings {
            keywords: self.processes.keywords.clone(),
            nominal_cpu_percent: self.processes.nominal_cpu_percent,
            prime_interval: Duration::from_millis(self.processes.prime_interval_ms),
        }
    }

    pub fn cpu_window(&self) -> Duration {
        Duration::from_millis(self.detection.cpu_window_ms)
    }

    /// Extension roots with `~` expanded, in configured order.
    pub fn extension_roots(&self) -> Vec<PathBuf> {
        self.extensions.roots.iter().map(|r| expand_home(r)).collect()
    }

    pub fn backup_dir(&self) -> PathBuf {
        expand_home(&self.backup.dir)
    }
}
