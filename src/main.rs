use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use extguard::assembler;
use extguard::backup::{self, BackupStore};
use extguard::config::{AppConfig, LoggingConfig};
use extguard::correlator::{ProcessCorrelator, ProcessTable, SysinfoProcessTable};
use extguard::detector::{Detector, DetectorDeps};
use extguard::extensions::{self, ExtensionLocator};
use extguard::logging::{self, DIAGNOSTICS_TARGET, EventLog, TracingLog};
use extguard::sampler::{Sampler, SysinfoCounters};
use extguard::status::{self, ExtensionStatus, SystemStatus};
use std::path::{Path, PathBuf};
use std::process::ExitCode;
use std::sync::Arc;

/// Detects editor extensions that load the host and manages extension versions
#[derive(Parser)]
#[command(name = "extguard", version, about, long_about = None)]
struct Cli {
    /// Configuration file path
    #[arg(short, long, env = "EXTGUARD_CONFIG", global = true)]
    config: Option<PathBuf>,

    /// Enable debug logging
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Monitor CPU, disk and network, then write a report
    Detect {
        /// Monitoring duration in seconds
        #[arg(long)]
        duration: Option<u64>,
        /// Host CPU percent that triggers process correlation
        #[arg(long)]
        cpu_threshold: Option<f64>,
        /// Disk I/O threshold in MB/s
        #[arg(long)]
        disk_threshold: Option<f64>,
        /// Network threshold in MB/s
        #[arg(long)]
        network_threshold: Option<f64>,
        /// Extra extensions directory, searched first
        #[arg(long)]
        extensions_dir: Option<PathBuf>,
    },

    /// Back up, roll back and lock the installed extension version
    Version {
        #[command(subcommand)]
        action: VersionAction,
    },

    /// One-shot system and extension health summary
    Status,
}

#[derive(Subcommand)]
enum VersionAction {
    /// Show installed version, lock state and backups
    Status,
    /// Copy the installed extension into the backup store
    Backup,
    /// List available backups
    List,
    /// Restore a backup by name or path
    Rollback { name: String },
    /// Make the extension directory read-only
    Lock,
    /// Undo `lock`
    Unlock,
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();

    let config = match AppConfig::load(cli.config.as_deref()) {
        Ok(c) => c,
        Err(e) => {
            logging::init_subscriber(&LoggingConfig::default().file, cli.verbose);
            eprintln!("error: {}", e);
            tracing::error!(target: DIAGNOSTICS_TARGET, error = ?e, "config load failed");
            return ExitCode::FAILURE;
        }
    };
    logging::init_subscriber(&config.logging.file, cli.verbose);

    let result = match cli.command {
        Commands::Detect {
            duration,
            cpu_threshold,
            disk_threshold,
            network_threshold,
            extensions_dir,
        } => {
            let mut config = config;
            if let Some(d) = duration {
                config.detection.monitoring_duration_secs = d;
            }
            if let Some(t) = cpu_threshold {
                config.detection.cpu_threshold = t;
            }
            if let Some(t) = disk_threshold {
                config.detection.disk_threshold_mb = t;
            }
            if let Some(t) = network_threshold {
                config.detection.network_threshold_mb = t;
            }
            if let Some(dir) = extensions_dir {
                config.extensions.roots.insert(0, dir);
            }
            match config.validate() {
                Ok(()) => detect(&config).await,
                Err(e) => Err(e),
            }
        }
        Commands::Version { action } => version(&config, action),
        Commands::Status => show_status(&config).await,
    };

    match result {
        Ok(true) => ExitCode::SUCCESS,
        Ok(false) => ExitCode::FAILURE,
        Err(e) => {
            eprintln!("error: {}", e);
            tracing::error!(target: DIAGNOSTICS_TARGET, error = ?e, "command failed");
            ExitCode::FAILURE
        }
    }
}

/// Returns Ok(false) when the run was interrupted.
async fn detect(config: &AppConfig) -> Result<bool> {
    let log: Arc<dyn EventLog> = Arc::new(TracingLog);
    let table: Arc<dyn ProcessTable> = Arc::new(SysinfoProcessTable::new());
    let deps = DetectorDeps {
        sampler: Sampler::new(
            Arc::new(SysinfoCounters::new()),
            log.clone(),
            config.cpu_window(),
        ),
        correlator: ProcessCorrelator::new(table, log.clone(), config.correlator_settings()),
        locator: ExtensionLocator::new(
            config.extension_roots(),
            config.extensions.patterns.clone(),
        ),
        log,
    };
    let detector = Detector::new(deps, config.detector_config());

    let (shutdown_tx, shutdown_rx) = tokio::sync::oneshot::channel();
    let signal = tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            tracing::info!("Received shutdown signal");
            let _ = shutdown_tx.send(());
        } else {
            // Keep the sender alive: a dropped sender reads as an interrupt.
            std::future::pending::<()>().await;
        }
    });

    let outcome = detector.run(shutdown_rx).await;
    signal.abort();

    let path = assembler::publish_report(
        &outcome.report,
        &config.report.dir,
        &config.report.prefix,
        &mut std::io::stdout(),
    )
    .context("write report")?;
    tracing::info!(path = %path.display(), "report written");

    if outcome.interrupted {
        tracing::warn!("detection interrupted, report is partial");
    }
    Ok(!outcome.interrupted)
}

fn store(config: &AppConfig) -> BackupStore {
    BackupStore::new(
        config.backup_dir(),
        config.extensions.label.clone(),
        config.backup.history_limit,
    )
}

fn locate(config: &AppConfig) -> Option<PathBuf> {
    ExtensionLocator::new(config.extension_roots(), config.extensions.patterns.clone()).find_first()
}

fn version(config: &AppConfig, action: VersionAction) -> Result<bool> {
    let store = store(config);
    match action {
        VersionAction::Status => {
            match locate(config) {
                Some(dir) => print_extension(config, &dir),
                None => println!("Extension: not found"),
            }
            println!("Backups: {}", store.list()?.len());
        }
        VersionAction::Backup => {
            let dir = locate(config).context("no matching extension found")?;
            let entry = store.create(&dir)?;
            println!("Backup created: {} ({:.1} MB)", entry.path.display(), entry.size_mb);
        }
        VersionAction::List => {
            let entries = store.list()?;
            if entries.is_empty() {
                println!("No backups in {}", store.dir().display());
            }
            for e in entries {
                println!("{}  v{}  {}  {:.1} MB", e.name, e.version, e.timestamp, e.size_mb);
            }
        }
        VersionAction::Rollback { name } => {
            let dir = locate(config).context("no matching extension found")?;
            let safety = store.restore(&name, &dir)?;
            println!("Restored {} into {}", name, dir.display());
            println!("Previous version saved as {}", safety.name);
            println!("Restart the editor to load the restored version");
        }
        VersionAction::Lock => {
            let dir = locate(config).context("no matching extension found")?;
            let info = store.lock(&dir)?;
            println!("Locked version {}", info.version);
        }
        VersionAction::Unlock => {
            let dir = locate(config).context("no matching extension found")?;
            store.unlock(&dir)?;
            println!("Unlocked {}", dir.display());
        }
    }
    Ok(true)
}

fn print_extension(config: &AppConfig, dir: &Path) {
    let version = extensions::extension_version(dir);
    let class = extensions::classify_version(
        &version,
        &config.versions.stable,
        &config.versions.problematic,
    );
    println!("Extension: {}", dir.display());
    println!("Version:   {} ({:?})", version, class);
    match backup::lock_info(dir) {
        Some(info) => println!("Locked:    yes (since {})", info.locked_at),
        None => println!("Locked:    no"),
    }
}

async fn show_status(config: &AppConfig) -> Result<bool> {
    let host = status::measure_host(config.cpu_window()).await;

    let extension = locate(config).map(|path| {
        let version = extensions::extension_version(&path);
        ExtensionStatus {
            class: extensions::classify_version(
                &version,
                &config.versions.stable,
                &config.versions.problematic,
            ),
            locked: backup::is_locked(&path),
            path,
            version,
        }
    });

    let label = config.extensions.label.clone();
    let keywords = config.processes.keywords.clone();
    let (extension_processes, editor_processes) = tokio::task::spawn_blocking(move || {
        let table = SysinfoProcessTable::new();
        status::count_processes(&table, &label, &keywords)
    })
    .await
    .context("count processes")?;

    let status = SystemStatus {
        host,
        extension,
        stable_version: config.versions.stable.clone(),
        extension_processes,
        editor_processes,
        backups: store(config).list()?.len(),
    };
    println!("{}", status.render());
    Ok(true)
}
