// Detection run end to end against scripted counters and processes, on paused time

mod common;

use common::{FakeCounters, FakeProcessTable, Harness, mb};
use extguard::assembler::{
    RECOMMEND_CLEANUP, RECOMMEND_DISK, RECOMMEND_NETWORK, RECOMMEND_ROLLBACK,
};
use extguard::detector::RunState;
use extguard::logging::{LogLevel, MemoryLog};
use extguard::models::{Indicator, Metric};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::oneshot;

fn approx(a: f64, b: f64) -> bool {
    (a - b).abs() < 1.0
}

#[tokio::test(start_paused = true)]
async fn test_healthy_run_takes_the_healthy_path() {
    let log = Arc::new(MemoryLog::new());
    let counters = FakeCounters::new().cpu(&[10.0, 20.0, 30.0]).idle();
    let detector = Harness::new(counters, FakeProcessTable::new(4)).build(log.clone());
    assert_eq!(detector.planned_samples(), 3);

    let outcome = detector.run_to_completion().await;

    assert!(!outcome.interrupted);
    let report = &outcome.report;
    assert_eq!(report.cpu_analysis.readings, vec![10.0, 20.0, 30.0]);
    assert!(approx(report.cpu_analysis.average_cpu, 20.0));
    assert_eq!(report.cpu_analysis.peak_cpu, 30.0);
    assert!(!report.cpu_analysis.high_usage_detected);
    assert!(report.processes.is_empty());
    assert!(report.indicators.is_empty());
    assert!(report.recommendations.is_empty());
    assert!(report.is_healthy());
    assert_eq!(
        outcome.states,
        vec![
            RunState::Idle,
            RunState::Scanning,
            RunState::Sampling,
            RunState::Evaluating,
            RunState::Assembling,
            RunState::Done,
        ]
    );
    assert!(log.contains("no matching extensions found"));
}

#[tokio::test(start_paused = true)]
async fn test_disk_burst_raises_disk_indicator() {
    let log = Arc::new(MemoryLog::new());
    // 100MB read + 50MB written over the 2s disk window: 75MB/s > 50MB/s
    let counters = FakeCounters::new()
        .cpu(&[5.0])
        .idle()
        .counter(Metric::DiskReadBytes, &[Some(0), Some(mb(100.0))])
        .counter(Metric::DiskWriteBytes, &[Some(0), Some(mb(50.0))]);
    let outcome = Harness::new(counters, FakeProcessTable::new(4))
        .build(log.clone())
        .run_to_completion()
        .await;

    let report = &outcome.report;
    assert_eq!(
        report.indicators.iter().copied().collect::<Vec<_>>(),
        vec![Indicator::HighDiskIo]
    );
    assert_eq!(report.recommendations, vec![RECOMMEND_DISK.to_string()]);
    assert!(log.contains("high_disk_io"));
}

#[tokio::test(start_paused = true)]
async fn test_network_burst_raises_network_indicator() {
    let log = Arc::new(MemoryLog::new());
    // 20MB sent + 15MB received over the 1s network window: 35MB/s > 10MB/s
    let counters = FakeCounters::new()
        .cpu(&[5.0])
        .idle()
        .counter(Metric::NetSentBytes, &[Some(0), Some(mb(20.0))])
        .counter(Metric::NetRecvBytes, &[Some(0), Some(mb(15.0))]);
    let outcome = Harness::new(counters, FakeProcessTable::new(4))
        .build(log)
        .run_to_completion()
        .await;

    let indicators: Vec<Indicator> = outcome.report.indicators.iter().copied().collect();
    assert_eq!(indicators, vec![Indicator::HighNetworkIo]);
    assert_eq!(
        outcome.report.recommendations,
        vec![RECOMMEND_NETWORK.to_string()]
    );
}

#[tokio::test(start_paused = true)]
async fn test_rate_equal_to_threshold_does_not_fire() {
    // exactly 10MB/s on the network
    let counters = FakeCounters::new()
        .cpu(&[5.0])
        .idle()
        .counter(Metric::NetSentBytes, &[Some(0), Some(mb(10.0))]);
    let outcome = Harness::new(counters, FakeProcessTable::new(4))
        .build(Arc::new(MemoryLog::new()))
        .run_to_completion()
        .await;
    assert!(outcome.report.indicators.is_empty());
}

#[tokio::test(start_paused = true)]
async fn test_unavailable_counters_degrade_to_zero() {
    let log = Arc::new(MemoryLog::new());
    // No byte counters scripted at all: every read is None.
    let counters = FakeCounters::new().cpu(&[5.0]);
    let outcome = Harness::new(counters, FakeProcessTable::new(4))
        .build(log.clone())
        .run_to_completion()
        .await;

    assert!(!outcome.interrupted);
    assert!(outcome.report.indicators.is_empty());
    assert_eq!(log.count(LogLevel::Error), 0);
    assert!(log.contains("disk_read_bytes unavailable"));
    assert!(log.contains("net_recv_bytes unavailable"));
}

#[tokio::test(start_paused = true)]
async fn test_high_cpu_correlates_matching_processes() {
    let log = Arc::new(MemoryLog::new());
    let counters = FakeCounters::new().cpu(&[90.0, 20.0, 95.0]).idle();
    // 8 cores: per-process limit is 80 / 8 = 10%
    let table = FakeProcessTable::new(8)
        .process(7, "augment-agent", 5.0, 64.0)
        .process(3, "Code Helper", 25.0, 128.0)
        .process(5, "bash", 99.0, 1.0)
        .short_lived(9, "code", 2);

    let outcome = Harness::new(counters, table)
        .build(log.clone())
        .run_to_completion()
        .await;
    let report = &outcome.report;

    assert!(report.cpu_analysis.high_usage_detected);
    assert_eq!(report.cpu_analysis.peak_cpu, 95.0);

    // First pass sees pid 9 too; it is gone by the second pass.
    let pids: Vec<u32> = report.processes.iter().map(|p| p.pid).collect();
    assert_eq!(pids, vec![3, 7, 9, 3, 7]);
    let helper = &report.processes[0];
    assert_eq!(helper.name, "Code Helper");
    assert!(approx(helper.cpu_percent, 25.0));
    assert!(approx(helper.memory_mb, 128.0));
    assert!(approx(report.processes[1].cpu_percent, 5.0));

    assert!(log.contains("high CPU process: Code Helper (pid 3)"));
    assert!(!log.contains("high CPU process: augment-agent"));
    assert!(!log.contains("bash"));

    assert_eq!(report.recommendations, vec![RECOMMEND_ROLLBACK.to_string()]);
    assert_eq!(
        outcome.states,
        vec![
            RunState::Idle,
            RunState::Scanning,
            RunState::Sampling,
            RunState::Correlating,
            RunState::Sampling,
            RunState::Correlating,
            RunState::Sampling,
            RunState::Evaluating,
            RunState::Assembling,
            RunState::Done,
        ]
    );
}

#[tokio::test(start_paused = true)]
async fn test_many_readings_recommend_cleanup() {
    let counters = FakeCounters::new().cpu(&[85.0]).idle();
    let table = FakeProcessTable::new(1)
        .process(1, "code", 1.0, 1.0)
        .process(2, "code", 1.0, 1.0)
        .process(3, "code", 1.0, 1.0);
    // 2 samples, both high: 6 readings > 5
    let outcome = Harness::new(counters, table)
        .duration(Duration::from_secs(2))
        .build(Arc::new(MemoryLog::new()))
        .run_to_completion()
        .await;

    assert_eq!(outcome.report.processes.len(), 6);
    assert_eq!(
        outcome.report.recommendations,
        vec![RECOMMEND_ROLLBACK.to_string(), RECOMMEND_CLEANUP.to_string()]
    );
}

#[tokio::test(start_paused = true)]
async fn test_extensions_found_are_reported() {
    let tmp = tempfile::TempDir::new().unwrap();
    let ext = tmp.path().join("augment.vscode-augment-0.467.1");
    std::fs::create_dir(&ext).unwrap();
    std::fs::create_dir(tmp.path().join("ms-python.python-2024.1.0")).unwrap();
    let missing = tmp.path().join("does-not-exist");

    let log = Arc::new(MemoryLog::new());
    let outcome = Harness::new(FakeCounters::new().cpu(&[5.0]).idle(), FakeProcessTable::new(1))
        .roots(vec![missing, tmp.path().to_path_buf()])
        .build(log.clone())
        .run_to_completion()
        .await;

    assert_eq!(
        outcome.report.extensions,
        vec![ext.to_string_lossy().into_owned()]
    );
    assert!(log.contains("extensions root not found"));
    assert!(log.contains("found extension"));
}

#[tokio::test(start_paused = true)]
async fn test_interrupt_during_evaluation_keeps_partial_report() {
    let log = Arc::new(MemoryLog::new());
    // The disk burst would fire, but the run is cut during the 2s disk window.
    let counters = FakeCounters::new()
        .cpu(&[90.0, 40.0])
        .idle()
        .counter(Metric::DiskReadBytes, &[Some(0), Some(mb(500.0))]);
    let detector = Harness::new(counters, FakeProcessTable::new(1))
        .duration(Duration::from_secs(2))
        .build(log.clone());

    let (tx, rx) = oneshot::channel();
    tokio::spawn(async move {
        tokio::time::sleep(Duration::from_millis(1500)).await;
        let _ = tx.send(());
    });
    let outcome = detector.run(rx).await;

    assert!(outcome.interrupted);
    assert_eq!(outcome.report.cpu_analysis.readings, vec![90.0, 40.0]);
    assert!(outcome.report.indicators.is_empty());
    assert_eq!(
        outcome.report.recommendations,
        vec![RECOMMEND_ROLLBACK.to_string()]
    );
    assert_eq!(outcome.states.last(), Some(&RunState::Done));
    assert!(log.contains("interrupted"));
}

#[tokio::test(start_paused = true)]
async fn test_dropped_sender_interrupts_before_first_sample() {
    // The CPU read spends real time on the blocking pool, so the closed
    // channel is observed first.
    let counters = FakeCounters::new()
        .cpu(&[99.0])
        .idle()
        .cpu_delay(Duration::from_millis(50));
    let detector = Harness::new(counters, FakeProcessTable::new(1)).build(Arc::new(MemoryLog::new()));

    let (tx, rx) = oneshot::channel::<()>();
    drop(tx);
    let outcome = detector.run(rx).await;

    assert!(outcome.interrupted);
    let cpu = &outcome.report.cpu_analysis;
    assert!(cpu.readings.is_empty());
    assert_eq!(cpu.average_cpu, 0.0);
    assert_eq!(cpu.peak_cpu, 0.0);
    assert!(!cpu.high_usage_detected);
    assert!(!outcome.states.contains(&RunState::Evaluating));
    assert!(outcome.report.recommendations.is_empty());
}

#[tokio::test(start_paused = true)]
async fn test_identical_inputs_give_identical_reports() {
    let run = || async {
        let counters = FakeCounters::new()
            .cpu(&[85.0, 30.0])
            .idle()
            .counter(Metric::NetRecvBytes, &[Some(0), Some(mb(12.0))]);
        let table = FakeProcessTable::new(2).process(4, "code", 30.0, 10.0);
        Harness::new(counters, table)
            .duration(Duration::from_secs(2))
            .build(Arc::new(MemoryLog::new()))
            .run_to_completion()
            .await
            .report
    };
    let mut a = serde_json::to_value(run().await).unwrap();
    let mut b = serde_json::to_value(run().await).unwrap();
    a["timestamp"] = serde_json::Value::Null;
    b["timestamp"] = serde_json::Value::Null;
    assert_eq!(a, b);
}
