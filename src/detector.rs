// Detection run: Idle -> Scanning -> Sampling (-> Correlating) -> Evaluating -> Assembling -> Done.
// Strictly sequential; every suspension point also watches the shutdown channel.

use crate::assembler::ReportAssembler;
use crate::correlator::ProcessCorrelator;
use crate::evaluator::ThresholdEvaluator;
use crate::extensions::{ExtensionLocator, ExtensionScan};
use crate::logging::EventLog;
use crate::models::{CounterGroup, CpuAnalysis, Indicator, Metric, Report, ThresholdConfig};
use crate::sampler::Sampler;
use std::collections::BTreeSet;
use std::future::Future;
use std::sync::Arc;
use tokio::sync::oneshot;
use tokio::time::Duration;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunState {
    Idle,
    Scanning,
    Sampling,
    Correlating,
    Evaluating,
    Assembling,
    Done,
}

/// Engine parts, injected so tests can swap the OS-facing ports.
pub struct DetectorDeps {
    pub sampler: Sampler,
    pub correlator: ProcessCorrelator,
    pub locator: ExtensionLocator,
    pub log: Arc<dyn EventLog>,
}

#[derive(Debug, Clone)]
pub struct DetectorConfig {
    pub thresholds: ThresholdConfig,
    pub disk_window: Duration,
    pub network_window: Duration,
    pub cleanup_threshold: usize,
}

impl Default for DetectorConfig {
    fn default() -> Self {
        Self {
            thresholds: ThresholdConfig::default(),
            disk_window: Duration::from_secs(2),
            network_window: Duration::from_secs(1),
            cleanup_threshold: 5,
        }
    }
}

#[derive(Debug, Clone)]
pub struct RunOutcome {
    pub report: Report,
    /// True when the shutdown signal cut the run short; the report is partial.
    pub interrupted: bool,
    /// Every state entered, in order.
    pub states: Vec<RunState>,
}

pub struct Detector {
    deps: DetectorDeps,
    config: DetectorConfig,
    evaluator: ThresholdEvaluator,
    assembler: ReportAssembler,
    states: Vec<RunState>,
}

/// Wraps the shutdown receiver so it is never polled after it fired.
/// A dropped sender counts as an interrupt.
struct Interrupt {
    rx: oneshot::Receiver<()>,
    fired: bool,
}

impl Interrupt {
    async fn guard<F: Future>(&mut self, fut: F) -> Option<F::Output> {
        if self.fired {
            return None;
        }
        tokio::select! {
            out = fut => Some(out),
            _ = &mut self.rx => {
                self.fired = true;
                None
            }
        }
    }
}

impl Detector {
    pub fn new(deps: DetectorDeps, config: DetectorConfig) -> Self {
        let assembler = ReportAssembler::new(config.cleanup_threshold);
        Self {
            deps,
            config,
            evaluator: ThresholdEvaluator::new(),
            assembler,
            states: vec![RunState::Idle],
        }
    }

    /// CPU samples taken during the monitoring window (one per CPU window).
    pub fn planned_samples(&self) -> usize {
        let window = self.deps.sampler.cpu_window().as_secs_f64();
        let duration = self.config.thresholds.monitoring_duration.as_secs_f64();
        if window <= 0.0 {
            return 0;
        }
        (duration / window).round().max(1.0) as usize
    }

    /// Runs without an external interrupt source.
    pub async fn run_to_completion(self) -> RunOutcome {
        let (_keep_alive, rx) = oneshot::channel();
        self.run(rx).await
    }

    /// One full run. Consumes the detector: a run cannot be resumed.
    pub async fn run(mut self, shutdown: oneshot::Receiver<()>) -> RunOutcome {
        let mut interrupt = Interrupt {
            rx: shutdown,
            fired: false,
        };
        let log = self.deps.log.clone();
        let thresholds = self.config.thresholds.clone();
        log.info("starting detection run");

        self.enter(RunState::Scanning);
        let locator = self.deps.locator.clone();
        let scan = tokio::task::spawn_blocking(move || locator.scan())
            .await
            .unwrap_or_else(|e| {
                log.error(&format!("extension scan task failed: {}", e));
                ExtensionScan::default()
            });
        for root in &scan.missing_roots {
            log.warn(&format!("extensions root not found: {}", root.display()));
        }
        for (root, e) in &scan.unreadable_roots {
            log.error(&format!("cannot list {}: {}", root.display(), e));
        }
        if scan.is_not_found() {
            log.info("no matching extensions found");
        } else {
            for m in &scan.matches {
                log.info(&format!("found extension: {}", m.display()));
            }
        }

        self.enter(RunState::Sampling);
        let planned = self.planned_samples();
        log.info(&format!(
            "monitoring CPU for {}s ({} samples)",
            thresholds.monitoring_duration.as_secs(),
            planned
        ));
        let mut readings = Vec::with_capacity(planned);
        let mut processes = Vec::new();
        for _ in 0..planned {
            let Some(sample) = interrupt
                .guard(self.deps.sampler.sample_instant(Metric::CpuPercent))
                .await
            else {
                break;
            };
            let cpu = sample.value();
            readings.push(cpu);
            if self.evaluator.cpu_exceeds(cpu, thresholds.cpu_threshold) {
                log.warn(&format!("high CPU usage detected: {:.1}%", cpu));
                self.enter(RunState::Correlating);
                let Some(mut pass) = interrupt.guard(self.deps.correlator.correlate()).await
                else {
                    break;
                };
                processes.append(&mut pass);
                self.enter(RunState::Sampling);
            }
        }
        let cpu_analysis = CpuAnalysis::from_readings(readings, thresholds.cpu_threshold);
        log.info(&format!(
            "CPU analysis - average {:.1}%, peak {:.1}%",
            cpu_analysis.average_cpu, cpu_analysis.peak_cpu
        ));

        let mut indicators: BTreeSet<Indicator> = BTreeSet::new();
        if !interrupt.fired {
            self.enter(RunState::Evaluating);
            let plan = [
                (
                    CounterGroup::Disk,
                    self.config.disk_window,
                    thresholds.disk_threshold,
                ),
                (
                    CounterGroup::Network,
                    self.config.network_window,
                    thresholds.network_threshold,
                ),
            ];
            for (group, window, threshold) in plan {
                let Some(result) = interrupt
                    .guard(self.deps.sampler.sample_group_delta(group, window))
                    .await
                else {
                    break;
                };
                let windows = match result {
                    Ok(w) => w,
                    Err(e) => {
                        log.error(&format!("{:?} window discarded: {}", group, e));
                        continue;
                    }
                };
                for w in &windows {
                    log.info(&format!(
                        "{}: {:.2}MB/s over {:?}",
                        w.metric(),
                        w.rate(),
                        window
                    ));
                }
                if let Some(indicator) = self.evaluator.evaluate_group(group, &windows, threshold)
                {
                    log.warn(&format!(
                        "{} - rate above {:.1}MB/s",
                        indicator, threshold
                    ));
                    indicators.insert(indicator);
                }
            }
        }

        if interrupt.fired {
            log.warn("detection interrupted, assembling partial report");
        }
        self.enter(RunState::Assembling);
        let report = self.assembler.assemble_now(
            &cpu_analysis,
            &processes,
            &indicators,
            &scan.matches,
        );
        self.enter(RunState::Done);
        log.info("detection complete");

        RunOutcome {
            report,
            interrupted: interrupt.fired,
            states: self.states,
        }
    }

    fn enter(&mut self, state: RunState) {
        self.states.push(state);
    }
}
