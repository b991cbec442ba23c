use chrono::{DateTime, Utc};
use tracing::{error, info, warn};

use crate::detect::DetectError;
use crate::watchdog::{WatchdogEvent, WatchdogPolicy, WatchdogState, MAX_SCORE};

/// Hysteresis state machine for one monitored stream.
///
/// Scores must arrive in non-decreasing timestamp order; the machine does not
/// reorder or reject late samples.
#[derive(Debug, Clone)]
pub struct Watchdog {
    policy: WatchdogPolicy,
    state: WatchdogState,
    /// Consecutive samples confirming the pending transition (high while
    /// NORMAL, low while ANOMALY / CRITICAL).
    consecutive: u32,
    last_transition: Option<DateTime<Utc>>,
    halt_requested: bool,
    non_finite: u64,
}

impl Watchdog {
    pub fn new(policy: WatchdogPolicy) -> Result<Self, DetectError> {
        policy.validate()?;
        Ok(Self {
            policy,
            state: WatchdogState::Normal,
            consecutive: 0,
            last_transition: None,
            halt_requested: false,
            non_finite: 0,
        })
    }

    pub fn policy(&self) -> &WatchdogPolicy {
        &self.policy
    }

    pub fn state(&self) -> WatchdogState {
        self.state
    }

    /// Length of the current run of confirming samples.
    pub fn consecutive(&self) -> u32 {
        self.consecutive
    }

    pub fn last_transition(&self) -> Option<DateTime<Utc>> {
        self.last_transition
    }

    /// True once a halt has been requested and until [`Watchdog::reset`].
    pub fn halt_requested(&self) -> bool {
        self.halt_requested
    }

    /// How many NaN / infinite scores have been replaced by [`MAX_SCORE`].
    pub fn non_finite_count(&self) -> u64 {
        self.non_finite
    }

    /// Feed one score and return the events it caused (usually none).
    pub fn observe(&mut self, score: f64, timestamp: DateTime<Utc>) -> Vec<WatchdogEvent> {
        let score = self.sanitize(score);
        let mut events = Vec::new();

        match self.state {
            WatchdogState::Normal => {
                if score >= self.policy.anomaly_threshold {
                    self.consecutive += 1;
                    if self.consecutive >= self.policy.confirm_count {
                        self.transition(WatchdogState::Anomaly, timestamp);
                        warn!(%timestamp, score, "anomaly detected");
                        events.push(WatchdogEvent::AnomalyDetected { timestamp, score });
                    }
                } else {
                    self.consecutive = 0;
                }
            }
            WatchdogState::Anomaly => {
                if score >= self.policy.critical_threshold {
                    self.escalate(score, timestamp, &mut events);
                } else {
                    self.track_recovery(score, timestamp, &mut events);
                }
            }
            WatchdogState::Critical => {
                // With halt enabled the state is held until an external reset.
                if !self.policy.halt_on_critical {
                    self.track_recovery(score, timestamp, &mut events);
                }
            }
        }

        events
    }

    /// Return to NORMAL and clear counters and any pending halt.
    pub fn reset(&mut self, timestamp: DateTime<Utc>) {
        info!(%timestamp, from = %self.state, "watchdog reset");
        self.transition(WatchdogState::Normal, timestamp);
        self.halt_requested = false;
    }

    fn escalate(&mut self, score: f64, timestamp: DateTime<Utc>, events: &mut Vec<WatchdogEvent>) {
        self.transition(WatchdogState::Critical, timestamp);
        error!(%timestamp, score, "critical threat detected");
        events.push(WatchdogEvent::CriticalThreat { timestamp, score });

        if self.policy.halt_on_critical && !self.halt_requested {
            self.halt_requested = true;
            error!(%timestamp, "halt on critical configured, requesting halt");
            events.push(WatchdogEvent::HaltRequested { timestamp, score });
        }
    }

    fn track_recovery(
        &mut self,
        score: f64,
        timestamp: DateTime<Utc>,
        events: &mut Vec<WatchdogEvent>,
    ) {
        if score < self.policy.anomaly_threshold {
            self.consecutive += 1;
            if self.consecutive >= self.policy.confirm_count {
                let from = self.state;
                self.transition(WatchdogState::Normal, timestamp);
                info!(%timestamp, score, %from, "anomaly resolved");
                events.push(WatchdogEvent::AnomalyResolved { timestamp, score });
            }
        } else {
            self.consecutive = 0;
        }
    }

    fn transition(&mut self, to: WatchdogState, timestamp: DateTime<Utc>) {
        self.state = to;
        self.consecutive = 0;
        self.last_transition = Some(timestamp);
    }

    fn sanitize(&mut self, score: f64) -> f64 {
        if score.is_finite() {
            return score;
        }
        self.non_finite += 1;
        warn!(score, "non-finite score, treating as maximum anomaly");
        MAX_SCORE
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    fn t(i: i64) -> DateTime<Utc> {
        DateTime::from_timestamp(1_700_000_000, 0).unwrap() + Duration::seconds(i)
    }

    fn policy(confirm_count: u32, halt_on_critical: bool) -> WatchdogPolicy {
        WatchdogPolicy {
            anomaly_threshold: 0.6,
            critical_threshold: 0.9,
            confirm_count,
            halt_on_critical,
        }
    }

    /// Drive the watchdog into ANOMALY with `confirm_count` high scores.
    fn into_anomaly(wd: &mut Watchdog) -> i64 {
        let n = wd.policy().confirm_count as i64;
        for i in 0..n {
            wd.observe(0.7, t(i));
        }
        assert_eq!(wd.state(), WatchdogState::Anomaly);
        n
    }

    #[test]
    fn test_detects_on_confirm_count_sample() {
        let mut wd = Watchdog::new(policy(3, false)).unwrap();

        assert!(wd.observe(0.95, t(0)).is_empty());
        assert_eq!(wd.state(), WatchdogState::Normal);
        assert!(wd.observe(0.95, t(1)).is_empty());
        assert_eq!(wd.state(), WatchdogState::Normal);
        assert_eq!(wd.consecutive(), 2);

        let events = wd.observe(0.95, t(2));
        assert_eq!(
            events,
            vec![WatchdogEvent::AnomalyDetected {
                timestamp: t(2),
                score: 0.95
            }]
        );
        assert_eq!(wd.state(), WatchdogState::Anomaly);
        assert_eq!(wd.consecutive(), 0);
        assert_eq!(wd.last_transition(), Some(t(2)));
    }

    #[test]
    fn test_low_sample_resets_high_counter() {
        let mut wd = Watchdog::new(policy(3, false)).unwrap();
        wd.observe(0.95, t(0));
        wd.observe(0.95, t(1));
        wd.observe(0.2, t(2));
        assert_eq!(wd.consecutive(), 0);
        wd.observe(0.95, t(3));
        wd.observe(0.95, t(4));
        assert_eq!(wd.state(), WatchdogState::Normal);
        assert_eq!(wd.observe(0.95, t(5)).len(), 1);
        assert_eq!(wd.state(), WatchdogState::Anomaly);
    }

    #[test]
    fn test_critical_score_in_normal_only_counts_as_high() {
        let mut wd = Watchdog::new(policy(2, false)).unwrap();
        assert!(wd.observe(0.99, t(0)).is_empty());
        assert_eq!(wd.state(), WatchdogState::Normal);
    }

    #[test]
    fn test_escalates_without_delay() {
        let mut wd = Watchdog::new(policy(3, false)).unwrap();
        let next = into_anomaly(&mut wd);

        let events = wd.observe(0.99, t(next));
        assert_eq!(
            events,
            vec![WatchdogEvent::CriticalThreat {
                timestamp: t(next),
                score: 0.99
            }]
        );
        assert_eq!(wd.state(), WatchdogState::Critical);
        assert!(!wd.halt_requested());
    }

    #[test]
    fn test_recovers_after_confirm_count_low_samples() {
        let mut wd = Watchdog::new(policy(2, false)).unwrap();
        let next = into_anomaly(&mut wd);

        assert!(wd.observe(0.1, t(next)).is_empty());
        // A sample between the thresholds breaks the recovery run.
        assert!(wd.observe(0.7, t(next + 1)).is_empty());
        assert!(wd.observe(0.1, t(next + 2)).is_empty());
        let events = wd.observe(0.1, t(next + 3));
        assert_eq!(events.len(), 1);
        assert!(matches!(events[0], WatchdogEvent::AnomalyResolved { .. }));
        assert_eq!(events[0].timestamp(), t(next + 3));
        assert_eq!(wd.state(), WatchdogState::Normal);
    }

    #[test]
    fn test_critical_without_halt_recovers_like_anomaly() {
        let mut wd = Watchdog::new(policy(2, false)).unwrap();
        let next = into_anomaly(&mut wd);
        wd.observe(0.95, t(next));
        assert_eq!(wd.state(), WatchdogState::Critical);

        // Further critical scores emit nothing new.
        assert!(wd.observe(0.97, t(next + 1)).is_empty());
        assert!(wd.observe(0.3, t(next + 2)).is_empty());
        let events = wd.observe(0.3, t(next + 3));
        assert!(matches!(events[..], [WatchdogEvent::AnomalyResolved { .. }]));
        assert_eq!(wd.state(), WatchdogState::Normal);
    }

    #[test]
    fn test_halt_requested_exactly_once_and_held() {
        let mut wd = Watchdog::new(policy(1, true)).unwrap();
        let events = wd.observe(0.7, t(0));
        assert!(matches!(events[..], [WatchdogEvent::AnomalyDetected { .. }]));

        let events = wd.observe(0.95, t(1));
        assert_eq!(events.len(), 2);
        assert!(matches!(events[0], WatchdogEvent::CriticalThreat { .. }));
        assert!(matches!(events[1], WatchdogEvent::HaltRequested { .. }));
        assert!(wd.halt_requested());

        // Held: neither more critical scores nor calm scores change anything.
        for i in 2..10 {
            let score = if i % 2 == 0 { 0.99 } else { 0.01 };
            assert!(wd.observe(score, t(i)).is_empty());
            assert_eq!(wd.state(), WatchdogState::Critical);
        }

        wd.reset(t(10));
        assert_eq!(wd.state(), WatchdogState::Normal);
        assert!(!wd.halt_requested());
        assert_eq!(wd.last_transition(), Some(t(10)));

        // A later escalation may request a halt again.
        wd.observe(0.7, t(11));
        let events = wd.observe(0.95, t(12));
        assert!(events
            .iter()
            .any(|e| matches!(e, WatchdogEvent::HaltRequested { .. })));
    }

    #[test]
    fn test_non_finite_scores_fail_safe() {
        let mut wd = Watchdog::new(policy(2, false)).unwrap();
        assert!(wd.observe(f64::NAN, t(0)).is_empty());
        let events = wd.observe(f64::INFINITY, t(1));
        assert_eq!(
            events,
            vec![WatchdogEvent::AnomalyDetected {
                timestamp: t(1),
                score: MAX_SCORE
            }]
        );
        let events = wd.observe(f64::NEG_INFINITY, t(2));
        assert!(matches!(events[..], [WatchdogEvent::CriticalThreat { .. }]));
        assert_eq!(wd.non_finite_count(), 3);
    }

    #[test]
    fn test_confirm_count_one_is_immediate() {
        let mut wd = Watchdog::new(policy(1, false)).unwrap();
        assert_eq!(wd.observe(0.61, t(0)).len(), 1);
        assert_eq!(wd.observe(0.59, t(1)).len(), 1);
        assert_eq!(wd.state(), WatchdogState::Normal);
    }

    #[test]
    fn test_rejects_invalid_policy() {
        let err = Watchdog::new(WatchdogPolicy {
            confirm_count: 0,
            ..Default::default()
        })
        .unwrap_err();
        assert!(matches!(err, DetectError::InvalidConfiguration { parameter: "confirm_count", .. }));
    }
}
