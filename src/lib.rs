//! Resonance -- isolation-forest anomaly scoring with a streaming watchdog.
//!
//! This crate provides the scoring core (partition trees, ensembles, score
//! normalization), the hysteresis watchdog that turns scores into alerts, and
//! the simulated telemetry and monitor loop used by the `resonance` binary.

pub mod config;
pub mod demo;
pub mod detect;
pub mod monitor;
pub mod telemetry;
pub mod watchdog;

use std::sync::Arc;

use anyhow::{Context, Result};

use crate::config::ResonanceConfig;
use crate::detect::{AnomalyScorer, IsolationEnsemble};
use crate::monitor::Monitor;
use crate::telemetry::{FileTrigger, MetricSource, SimulatedHost, TriggerSource};
use crate::watchdog::Watchdog;

/// Build a monitor over the simulated host: train on its healthy baseline, then
/// watch it through the configured trigger file.
pub fn build_monitor(config: &ResonanceConfig) -> Result<Monitor> {
    let host = SimulatedHost::new(config.simulation.seed);
    let trigger = FileTrigger::new(config.simulation.trigger_file.clone());
    monitor_with(config, Box::new(host), Box::new(trigger))
}

/// Train on `source`'s baseline and wrap the model, a watchdog and `trigger`
/// into a [`Monitor`]. With a contamination setting the per-sample verdict
/// threshold is calibrated from the baseline.
pub fn monitor_with(
    config: &ResonanceConfig,
    mut source: Box<dyn MetricSource>,
    trigger: Box<dyn TriggerSource>,
) -> Result<Monitor> {
    let samples = config.simulation.training_samples;
    tracing::info!(samples, "collecting baseline");
    let baseline = source.baseline(samples);
    let ensemble = IsolationEnsemble::fit(&baseline, &config.forest.fit_params())
        .context("failed to fit baseline model")?;

    let threshold = match config.forest.contamination {
        Some(c) => {
            let t = ensemble.calibrate_threshold(&baseline, c)?;
            tracing::info!(contamination = c, threshold = t, "calibrated verdict threshold");
            Some(t)
        }
        None => None,
    };

    let scorer: Arc<dyn AnomalyScorer> = Arc::new(ensemble);
    let watchdog = Watchdog::new(config.watchdog)?;
    let monitor = Monitor::new(scorer, watchdog, source, trigger, config.simulation.window_size);
    Ok(match threshold {
        Some(t) => monitor.with_threshold(t),
        None => monitor,
    })
}
