// Backup/rollback store for an extension directory: copy, list, restore, lock, unlock.
// Every action is appended to <dir>/version_config.json.

use crate::error::BackupError;
use crate::extensions::extension_version;
use chrono::{DateTime, Local};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use tracing::{info, instrument, warn};
use walkdir::WalkDir;

/// Sentinel written into a locked extension directory.
pub const LOCK_FILE: &str = ".version_locked";
const HISTORY_FILE: &str = "version_config.json";

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct BackupEntry {
    pub name: String,
    pub path: PathBuf,
    pub version: String,
    pub timestamp: String,
    pub size_mb: f64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LockInfo {
    pub locked_at: String,
    pub version: String,
    pub locked_by: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HistoryEntry {
    pub action: String,
    pub timestamp: String,
    pub data: serde_json::Value,
}

#[derive(Debug, Default, Serialize, Deserialize)]
struct History {
    #[serde(default)]
    history: Vec<HistoryEntry>,
}

pub struct BackupStore {
    dir: PathBuf,
    label: String,
    history_limit: usize,
}

impl BackupStore {
    pub fn new(dir: PathBuf, label: impl Into<String>, history_limit: usize) -> Self {
        Self {
            dir,
            label: label.into(),
            history_limit,
        }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// `<label>_v<version>_<YYYYmmdd_HHMMSS>`
    pub fn backup_name(&self, version: &str, at: DateTime<Local>) -> String {
        format!(
            "{}_v{}_{}",
            self.label,
            version,
            at.format("%Y%m%d_%H%M%S")
        )
    }

    #[instrument(skip(self), fields(operation = "create_backup"))]
    pub fn create(&self, ext_dir: &Path) -> Result<BackupEntry, BackupError> {
        if !ext_dir.is_dir() {
            return Err(BackupError::NoExtension);
        }
        std::fs::create_dir_all(&self.dir)?;
        let version = extension_version(ext_dir);
        let now = Local::now();
        let base = self.backup_name(&version, now);
        let mut name = base.clone();
        let mut n = 1;
        while self.dir.join(&name).exists() {
            name = format!("{}_{}", base, n);
            n += 1;
        }
        let path = self.dir.join(&name);
        info!(backup = %name, "backing up extension");
        copy_tree(ext_dir, &path)?;

        self.record(
            "backup_created",
            serde_json::json!({
                "version": version,
                "timestamp": now.format("%Y%m%d_%H%M%S").to_string(),
                "backup_path": path.to_string_lossy(),
                "original_path": ext_dir.to_string_lossy(),
            }),
        );
        Ok(BackupEntry {
            size_mb: dir_size_mb(&path),
            timestamp: now.format("%Y%m%d_%H%M%S").to_string(),
            name,
            path,
            version,
        })
    }

    /// Backups sorted by name. A missing store directory has no backups.
    pub fn list(&self) -> Result<Vec<BackupEntry>, BackupError> {
        if !self.dir.is_dir() {
            return Ok(Vec::new());
        }
        let prefix = format!("{}_v", self.label);
        let mut entries = Vec::new();
        for entry in std::fs::read_dir(&self.dir)? {
            let entry = entry?;
            let path = entry.path();
            let name = entry.file_name().to_string_lossy().into_owned();
            if !path.is_dir() {
                continue;
            }
            let Some(rest) = name.strip_prefix(&prefix) else {
                continue;
            };
            let parts: Vec<&str> = rest.split('_').collect();
            let version = parts.first().copied().unwrap_or("unknown").to_string();
            let timestamp = match parts.as_slice() {
                [_, date, time, ..] => format!("{}_{}", date, time),
                [_, date] => date.to_string(),
                _ => "unknown".to_string(),
            };
            entries.push(BackupEntry {
                size_mb: dir_size_mb(&path),
                name,
                path,
                version,
                timestamp,
            });
        }
        entries.sort_by(|a, b| a.name.cmp(&b.name));
        Ok(entries)
    }

    /// Absolute paths are used as-is; names resolve inside the store.
    pub fn resolve(&self, name_or_path: &str) -> PathBuf {
        let p = Path::new(name_or_path);
        if p.is_absolute() {
            p.to_path_buf()
        } else {
            self.dir.join(p)
        }
    }

    /// Replaces `ext_dir` with the backup's contents. The current extension is
    /// backed up first; returns that safety backup.
    #[instrument(skip(self), fields(operation = "restore_backup"))]
    pub fn restore(&self, name_or_path: &str, ext_dir: &Path) -> Result<BackupEntry, BackupError> {
        let backup = self.resolve(name_or_path);
        if !backup.is_dir() {
            return Err(BackupError::NotFound(name_or_path.to_string()));
        }
        if !ext_dir.is_dir() {
            return Err(BackupError::NoExtension);
        }
        if is_locked(ext_dir) {
            warn!(extension = %ext_dir.display(), "extension is locked, unlocking before restore");
            self.unlock(ext_dir)?;
        }
        let safety = self.create(ext_dir)?;

        info!(extension = %ext_dir.display(), "removing current extension");
        std::fs::remove_dir_all(ext_dir)?;
        info!(backup = %backup.display(), "restoring backup");
        copy_tree(&backup, ext_dir)?;

        self.record(
            "rollback_completed",
            serde_json::json!({
                "backup_used": backup.to_string_lossy(),
                "restored_to": ext_dir.to_string_lossy(),
                "timestamp": Local::now().to_rfc3339(),
            }),
        );
        Ok(safety)
    }

    /// Writes the sentinel, then marks the directory read-only.
    #[instrument(skip(self), fields(operation = "lock_version"))]
    pub fn lock(&self, ext_dir: &Path) -> Result<LockInfo, BackupError> {
        if !ext_dir.is_dir() {
            return Err(BackupError::NoExtension);
        }
        let version = extension_version(ext_dir);
        let lock = LockInfo {
            locked_at: Local::now().to_rfc3339(),
            version: version.clone(),
            locked_by: env!("CARGO_PKG_NAME").to_string(),
        };
        std::fs::write(
            ext_dir.join(LOCK_FILE),
            serde_json::to_string_pretty(&lock)?,
        )?;
        set_read_only(ext_dir, true)?;
        info!(version = %version, "version locked");

        self.record(
            "version_locked",
            serde_json::json!({
                "version": version,
                "timestamp": lock.locked_at,
                "extension_path": ext_dir.to_string_lossy(),
            }),
        );
        Ok(lock)
    }

    /// Restores write access, then removes the sentinel.
    #[instrument(skip(self), fields(operation = "unlock_version"))]
    pub fn unlock(&self, ext_dir: &Path) -> Result<(), BackupError> {
        if !ext_dir.is_dir() {
            return Err(BackupError::NoExtension);
        }
        set_read_only(ext_dir, false)?;
        let lock_file = ext_dir.join(LOCK_FILE);
        if lock_file.exists() {
            std::fs::remove_file(lock_file)?;
        }
        info!("version unlocked");

        self.record(
            "version_unlocked",
            serde_json::json!({
                "timestamp": Local::now().to_rfc3339(),
                "extension_path": ext_dir.to_string_lossy(),
            }),
        );
        Ok(())
    }

    /// Recorded actions, oldest first. An unreadable history file reads as empty.
    pub fn history(&self) -> Vec<HistoryEntry> {
        std::fs::read_to_string(self.dir.join(HISTORY_FILE))
            .ok()
            .and_then(|s| serde_json::from_str::<History>(&s).ok())
            .map(|h| h.history)
            .unwrap_or_default()
    }

    fn record(&self, action: &str, data: serde_json::Value) {
        let mut history = History {
            history: self.history(),
        };
        history.history.push(HistoryEntry {
            action: action.to_string(),
            timestamp: Local::now().to_rfc3339(),
            data,
        });
        let excess = history.history.len().saturating_sub(self.history_limit);
        history.history.drain(..excess);

        let result = std::fs::create_dir_all(&self.dir)
            .map_err(BackupError::from)
            .and_then(|_| Ok(serde_json::to_string_pretty(&history)?))
            .and_then(|json| Ok(std::fs::write(self.dir.join(HISTORY_FILE), json)?));
        if let Err(e) = result {
            warn!(error = %e, operation = "record_history", "failed to update history");
        }
    }
}

pub fn is_locked(ext_dir: &Path) -> bool {
    ext_dir.join(LOCK_FILE).exists()
}

pub fn lock_info(ext_dir: &Path) -> Option<LockInfo> {
    let s = std::fs::read_to_string(ext_dir.join(LOCK_FILE)).ok()?;
    serde_json::from_str(&s).ok()
}

/// Recursive copy of `src` into a new directory `dst`.
pub fn copy_tree(src: &Path, dst: &Path) -> Result<(), BackupError> {
    for entry in WalkDir::new(src) {
        let entry = entry?;
        let rel = entry
            .path()
            .strip_prefix(src)
            .map_err(|_| BackupError::StripPrefix(entry.path().to_path_buf()))?;
        let target = dst.join(rel);
        if entry.file_type().is_dir() {
            std::fs::create_dir_all(&target)?;
        } else if entry.file_type().is_file() {
            std::fs::copy(entry.path(), &target)?;
        }
    }
    Ok(())
}

/// Total size of regular files under `path`, in MB. Unreadable entries count as zero.
pub fn dir_size_mb(path: &Path) -> f64 {
    let bytes: u64 = WalkDir::new(path)
        .into_iter()
        .filter_map(Result::ok)
        .filter(|e| e.file_type().is_file())
        .filter_map(|e| e.metadata().ok())
        .map(|m| m.len())
        .sum();
    bytes as f64 / crate::models::BYTES_PER_MB
}

fn set_read_only(dir: &Path, read_only: bool) -> std::io::Result<()> {
    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        let mode = if read_only { 0o555 } else { 0o755 };
        std::fs::set_permissions(dir, std::fs::Permissions::from_mode(mode))
    }
    #[cfg(not(unix))]
    {
        let mut perms = std::fs::metadata(dir)?.permissions();
        perms.set_readonly(read_only);
        std::fs::set_permissions(dir, perms)
    }
}
