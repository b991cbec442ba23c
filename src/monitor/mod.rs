//! Streaming monitor: sample -> score -> watchdog -> sink, on a fixed interval.

pub mod output;

pub use output::{CsvSink, EventSink, TickSink};

use std::collections::VecDeque;
use std::sync::Arc;
use std::time::Duration;

use anyhow::Result;
use chrono::{DateTime, Utc};
use serde::Serialize;
use tracing::{debug, info, warn};

use crate::detect::{AnomalyScorer, DetectError, Verdict};
use crate::telemetry::{HostMetrics, MetricSource, TriggerSource};
use crate::watchdog::{Watchdog, WatchdogEvent, WatchdogState};

/// Everything that happened during one monitor step.
#[derive(Debug, Clone, Serialize)]
pub struct Tick {
    pub timestamp: DateTime<Utc>,
    pub metrics: HostMetrics,
    pub score: f64,
    /// Per-sample classification against the monitor threshold.
    pub verdict: Verdict,
    /// Watchdog state after this sample.
    pub state: WatchdogState,
    pub events: Vec<WatchdogEvent>,
    /// Whether the external trigger was active when the sample was taken.
    pub triggered: bool,
}

impl Tick {
    pub fn halt_requested(&self) -> bool {
        self.events
            .iter()
            .any(|e| matches!(e, WatchdogEvent::HaltRequested { .. }))
    }
}

/// Why [`Monitor::run`] returned.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunOutcome {
    /// Ctrl-C received.
    Interrupted,
    /// The tick limit was reached.
    Completed,
    /// The watchdog requested a halt; the caller decides whether to stop the process.
    HaltRequested,
}

pub struct Monitor {
    scorer: Arc<dyn AnomalyScorer>,
    watchdog: Watchdog,
    source: Box<dyn MetricSource>,
    trigger: Box<dyn TriggerSource>,
    window: VecDeque<Vec<f64>>,
    window_size: usize,
    threshold: f64,
}

impl Monitor {
    /// The per-sample verdict threshold defaults to the watchdog's anomaly threshold.
    pub fn new(
        scorer: Arc<dyn AnomalyScorer>,
        watchdog: Watchdog,
        source: Box<dyn MetricSource>,
        trigger: Box<dyn TriggerSource>,
        window_size: usize,
    ) -> Self {
        let threshold = watchdog.policy().anomaly_threshold;
        let window_size = window_size.max(1);
        Self {
            scorer,
            watchdog,
            source,
            trigger,
            window: VecDeque::with_capacity(window_size),
            window_size,
            threshold,
        }
    }

    /// Override the per-sample verdict threshold (e.g. a calibrated one).
    pub fn with_threshold(mut self, threshold: f64) -> Self {
        self.threshold = threshold;
        self
    }

    pub fn threshold(&self) -> f64 {
        self.threshold
    }

    pub fn watchdog(&self) -> &Watchdog {
        &self.watchdog
    }

    pub fn watchdog_mut(&mut self) -> &mut Watchdog {
        &mut self.watchdog
    }

    /// Take one sample and push it through the scorer and the watchdog.
    pub fn step(&mut self, timestamp: DateTime<Utc>) -> Result<Tick, DetectError> {
        let triggered = self.trigger.is_active();
        let metrics = self.source.sample(triggered);

        if self.window.len() == self.window_size {
            self.window.pop_front();
        }
        self.window.push_back(metrics.to_vector());

        let score = self.scorer.score_window(self.window.make_contiguous())?;
        let verdict = Verdict::from_score(score, self.threshold);
        let events = self.watchdog.observe(score, timestamp);
        debug!(score, %verdict, triggered, state = %self.watchdog.state(), "monitor tick");

        Ok(Tick {
            timestamp,
            metrics,
            score,
            verdict,
            state: self.watchdog.state(),
            events,
            triggered,
        })
    }

    /// Step every `interval` and hand each tick to `sink`, until Ctrl-C, a halt
    /// request, or `max_ticks` steps.
    pub async fn run(
        &mut self,
        interval: Duration,
        sink: &mut dyn TickSink,
        max_ticks: Option<u64>,
    ) -> Result<RunOutcome> {
        info!(
            engine = self.scorer.name(),
            interval_ms = interval.as_millis() as u64,
            window = self.window_size,
            "monitor started"
        );

        let mut ticker = tokio::time::interval(interval);
        let shutdown = tokio::signal::ctrl_c();
        tokio::pin!(shutdown);
        let mut ticks = 0u64;

        loop {
            if max_ticks.is_some_and(|max| ticks >= max) {
                info!(ticks, "monitor finished");
                return Ok(RunOutcome::Completed);
            }

            tokio::select! {
                _ = &mut shutdown => {
                    info!(ticks, "interrupt received, stopping monitor");
                    return Ok(RunOutcome::Interrupted);
                }
                _ = ticker.tick() => {
                    let tick = self.step(Utc::now())?;
                    ticks += 1;
                    sink.emit(&tick)?;
                    if tick.halt_requested() {
                        warn!(ticks, "halt requested by watchdog");
                        return Ok(RunOutcome::HaltRequested);
                    }
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::telemetry::{ManualTrigger, SimulatedHost};
    use crate::watchdog::WatchdogPolicy;
    use chrono::Duration as ChronoDuration;
    use std::sync::Mutex;

    /// Replays a fixed score sequence, ignoring the window contents.
    struct ScriptedScorer {
        scores: Mutex<VecDeque<f64>>,
        seen_window: Mutex<Vec<usize>>,
    }

    impl ScriptedScorer {
        fn new(scores: &[f64]) -> Self {
            Self {
                scores: Mutex::new(scores.iter().copied().collect()),
                seen_window: Mutex::new(Vec::new()),
            }
        }
    }

    impl AnomalyScorer for ScriptedScorer {
        fn name(&self) -> &'static str {
            "scripted"
        }

        fn score_window(&self, window: &[Vec<f64>]) -> Result<f64, DetectError> {
            self.seen_window.lock().unwrap().push(window.len());
            Ok(self.scores.lock().unwrap().pop_front().unwrap_or(0.0))
        }
    }

    fn monitor(scorer: Arc<dyn AnomalyScorer>, policy: WatchdogPolicy, window: usize) -> Monitor {
        Monitor::new(
            scorer,
            Watchdog::new(policy).unwrap(),
            Box::new(SimulatedHost::new(Some(3))),
            Box::new(ManualTrigger::new()),
            window,
        )
    }

    fn t(i: i64) -> DateTime<Utc> {
        DateTime::from_timestamp(1_700_000_000, 0).unwrap() + ChronoDuration::seconds(i)
    }

    #[test]
    fn test_step_feeds_watchdog() {
        let scorer = Arc::new(ScriptedScorer::new(&[0.2, 0.8, 0.8, 0.3]));
        let policy = WatchdogPolicy {
            confirm_count: 2,
            ..Default::default()
        };
        let mut m = monitor(scorer, policy, 5);

        let first = m.step(t(0)).unwrap();
        assert_eq!(first.verdict, Verdict::Normal);
        assert!(first.events.is_empty());

        let second = m.step(t(1)).unwrap();
        assert_eq!(second.verdict, Verdict::Anomaly);
        assert_eq!(second.state, WatchdogState::Normal);

        let third = m.step(t(2)).unwrap();
        assert_eq!(third.state, WatchdogState::Anomaly);
        assert!(matches!(third.events[..], [WatchdogEvent::AnomalyDetected { .. }]));
        assert_eq!(third.events[0].timestamp(), t(2));
    }

    #[test]
    fn test_window_is_bounded() {
        let scorer = Arc::new(ScriptedScorer::new(&[]));
        let mut m = monitor(scorer.clone(), WatchdogPolicy::default(), 3);
        for i in 0..6 {
            m.step(t(i)).unwrap();
        }
        assert_eq!(*scorer.seen_window.lock().unwrap(), vec![1, 2, 3, 3, 3, 3]);
    }

    #[test]
    fn test_custom_threshold_drives_verdict() {
        let scorer = Arc::new(ScriptedScorer::new(&[0.55]));
        let mut m = monitor(scorer, WatchdogPolicy::default(), 1).with_threshold(0.5);
        assert_eq!(m.threshold(), 0.5);
        assert_eq!(m.step(t(0)).unwrap().verdict, Verdict::Anomaly);
        assert_eq!(m.watchdog().state(), WatchdogState::Normal);
    }

    #[test]
    fn test_trigger_reaches_source() {
        let trigger = ManualTrigger::new();
        let scorer = Arc::new(ScriptedScorer::new(&[]));
        let mut m = Monitor::new(
            scorer,
            Watchdog::new(WatchdogPolicy::default()).unwrap(),
            Box::new(SimulatedHost::new(Some(4))),
            Box::new(trigger.clone()),
            4,
        );
        let calm = m.step(t(0)).unwrap();
        assert!(!calm.triggered);
        assert!(calm.metrics.cpu < 30.0);

        trigger.set(true);
        let attack = m.step(t(1)).unwrap();
        assert!(attack.triggered);
        assert!(attack.metrics.memory > 35.0);
    }

    #[tokio::test]
    async fn test_run_stops_on_halt() {
        let scorer = Arc::new(ScriptedScorer::new(&[0.65, 0.95, 0.1, 0.1]));
        let policy = WatchdogPolicy {
            confirm_count: 1,
            halt_on_critical: true,
            ..Default::default()
        };
        let mut m = monitor(scorer, policy, 2);
        let mut sink = CsvSink::new(Vec::new());

        let outcome = m
            .run(std::time::Duration::from_millis(1), &mut sink, Some(10))
            .await
            .unwrap();
        assert_eq!(outcome, RunOutcome::HaltRequested);
        assert!(m.watchdog().halt_requested());
        // header + two ticks
        let out = String::from_utf8(sink.into_inner()).unwrap();
        assert_eq!(out.lines().count(), 3);
    }

    #[tokio::test]
    async fn test_run_honours_tick_limit() {
        let scorer = Arc::new(ScriptedScorer::new(&[]));
        let mut m = monitor(scorer, WatchdogPolicy::default(), 2);
        let mut sink = EventSink::new(Vec::new());
        let outcome = m
            .run(std::time::Duration::from_millis(1), &mut sink, Some(3))
            .await
            .unwrap();
        assert_eq!(outcome, RunOutcome::Completed);
        assert!(sink.into_inner().is_empty());
    }
}
