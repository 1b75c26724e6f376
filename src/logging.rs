// Logging port for the engine, plus tracing subscriber setup for the binary.
// Engine components take an Arc<dyn EventLog> instead of logging through a global.

use std::fs::OpenOptions;
use std::path::Path;
use std::sync::Mutex;
use tracing_subscriber::fmt::time::FormatTime;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{EnvFilter, Layer, filter};

/// Target for full error chains; recorded by the file sink only.
pub const DIAGNOSTICS_TARGET: &str = "diagnostics";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogLevel {
    Info,
    Warn,
    Error,
}

pub trait EventLog: Send + Sync {
    fn log(&self, level: LogLevel, message: &str);

    fn info(&self, message: &str) {
        self.log(LogLevel::Info, message);
    }

    fn warn(&self, message: &str) {
        self.log(LogLevel::Warn, message);
    }

    fn error(&self, message: &str) {
        self.log(LogLevel::Error, message);
    }
}

/// Forwards to `tracing` under the `engine` target.
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingLog;

impl EventLog for TracingLog {
    fn log(&self, level: LogLevel, message: &str) {
        match level {
            LogLevel::Info => tracing::info!(target: "engine", "{}", message),
            LogLevel::Warn => tracing::warn!(target: "engine", "{}", message),
            LogLevel::Error => tracing::error!(target: "engine", "{}", message),
        }
    }
}

/// Keeps every entry in memory (tests, dry runs).
#[derive(Debug, Default)]
pub struct MemoryLog {
    entries: Mutex<Vec<(LogLevel, String)>>,
}

impl MemoryLog {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn entries(&self) -> Vec<(LogLevel, String)> {
        self.entries.lock().map(|e| e.clone()).unwrap_or_default()
    }

    pub fn count(&self, level: LogLevel) -> usize {
        self.entries()
            .iter()
            .filter(|(l, _)| *l == level)
            .count()
    }

    pub fn contains(&self, needle: &str) -> bool {
        self.entries().iter().any(|(_, m)| m.contains(needle))
    }
}

impl EventLog for MemoryLog {
    fn log(&self, level: LogLevel, message: &str) {
        if let Ok(mut entries) = self.entries.lock() {
            entries.push((level, message.to_string()));
        }
    }
}

struct LocalTimer;

impl FormatTime for LocalTimer {
    fn format_time(&self, w: &mut tracing_subscriber::fmt::format::Writer<'_>) -> std::fmt::Result {
        write!(
            w,
            "{}",
            chrono::Local::now().format("%Y-%m-%dT%H:%M:%S%.3f%:z")
        )
    }
}

/// Console (stderr) + append-mode file sink. A file that cannot be opened
/// leaves console logging only.
pub fn init_subscriber(log_file: &Path, verbose: bool) {
    let default_level = if verbose { "debug" } else { "info" };
    let env_filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));

    let console = tracing_subscriber::fmt::layer()
        .with_timer(LocalTimer)
        .with_writer(std::io::stderr)
        .with_filter(filter::filter_fn(|meta| {
            meta.target() != DIAGNOSTICS_TARGET
        }));

    let file_error;
    let file = match OpenOptions::new().create(true).append(true).open(log_file) {
        Ok(f) => {
            file_error = None;
            Some(
                tracing_subscriber::fmt::layer()
                    .with_timer(LocalTimer)
                    .with_ansi(false)
                    .with_writer(Mutex::new(f)),
            )
        }
        Err(e) => {
            file_error = Some(e);
            None
        }
    };

    tracing_subscriber::registry()
        .with(env_filter)
        .with(console)
        .with(file)
        .init();

    if let Some(e) = file_error {
        tracing::warn!(error = %e, operation = "open_log_file", "file logging disabled");
    }
}
