// Domain models: samples, delta windows, thresholds and the run report

mod report;
mod sample;
mod thresholds;

pub use report::{CpuAnalysis, Indicator, ProcessReading, Report};
pub use sample::{BYTES_PER_MB, CounterGroup, DeltaWindow, Metric, Sample, Unit};
pub use thresholds::ThresholdConfig;
