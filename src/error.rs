// Typed errors for sampling, reporting and the backup store

use crate::models::Metric;
use std::path::PathBuf;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum SampleError {
    #[error("delta window mixes metrics: {start} then {end}")]
    MetricMismatch { start: Metric, end: Metric },

    #[error("{0} is not a byte counter")]
    NotACounter(Metric),

    #[error("{0}: end sample is not after start sample")]
    NonIncreasingTimestamps(Metric),

    #[error("{0}: zero-length window")]
    ZeroInterval(Metric),
}

#[derive(Debug, Error)]
pub enum ReportError {
    #[error("serialize report: {0}")]
    Serialize(#[from] serde_json::Error),

    #[error("write report {path}: {source}")]
    Write {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

#[derive(Debug, Error)]
pub enum BackupError {
    #[error("no matching extension found")]
    NoExtension,

    #[error("backup not found: {0}")]
    NotFound(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("walk error: {0}")]
    Walk(#[from] walkdir::Error),

    #[error("path {0} is outside the copied tree")]
    StripPrefix(PathBuf),
}
