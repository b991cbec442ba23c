//! Telemetry sources feeding the monitor: simulated host metrics, trigger
//! signals and synthetic test signals.

pub mod host;
pub mod signal;
pub mod trigger;

pub use host::SimulatedHost;
pub use trigger::{FileTrigger, ManualTrigger, TriggerSource};

use serde::Serialize;

/// One reading of the host vital signs the monitor watches.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct HostMetrics {
    /// CPU load, percent.
    pub cpu: f64,
    /// Network jitter, milliseconds.
    pub jitter: f64,
    /// Memory usage, percent.
    pub memory: f64,
}

impl HostMetrics {
    /// Feature order used for training and scoring.
    pub const FEATURES: [&'static str; 3] = ["cpu", "jitter", "memory"];

    pub fn to_vector(&self) -> Vec<f64> {
        vec![self.cpu, self.jitter, self.memory]
    }
}

/// Source of host metric samples.
pub trait MetricSource: Send {
    /// Take one sample. `under_attack` is the externally injected trigger state.
    fn sample(&mut self, under_attack: bool) -> HostMetrics;

    /// Collect `count` baseline samples for training.
    fn baseline(&mut self, count: usize) -> Vec<Vec<f64>> {
        (0..count).map(|_| self.sample(false).to_vector()).collect()
    }
}
