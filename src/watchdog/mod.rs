//! Streaming watchdog: turns per-sample scores into NORMAL / ANOMALY / CRITICAL
//! state with hysteresis and emits transition events.

pub mod machine;

pub use machine::Watchdog;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::detect::DetectError;

/// Score substituted for NaN / infinite input: the top of the (0, 1] scale.
pub const MAX_SCORE: f64 = 1.0;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum WatchdogState {
    Normal,
    Anomaly,
    Critical,
}

impl std::fmt::Display for WatchdogState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            WatchdogState::Normal => write!(f, "NORMAL"),
            WatchdogState::Anomaly => write!(f, "ANOMALY"),
            WatchdogState::Critical => write!(f, "CRITICAL"),
        }
    }
}

/// Severity levels attached to emitted events.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Severity {
    Info,
    Warning,
    Critical,
    Fatal,
}

/// Threshold and hysteresis policy for one watchdog.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct WatchdogPolicy {
    /// Scores at or above this count towards an anomaly. Must be in (0, 1).
    pub anomaly_threshold: f64,
    /// Scores at or above this escalate a confirmed anomaly. Must be in (anomaly_threshold, 1].
    pub critical_threshold: f64,
    /// Consecutive confirming samples required to enter or leave ANOMALY.
    pub confirm_count: u32,
    /// Emit `HaltRequested` and hold on reaching CRITICAL.
    pub halt_on_critical: bool,
}

impl Default for WatchdogPolicy {
    fn default() -> Self {
        Self {
            anomaly_threshold: 0.6,
            critical_threshold: 0.7,
            confirm_count: 3,
            halt_on_critical: false,
        }
    }
}

impl WatchdogPolicy {
    pub fn validate(&self) -> Result<(), DetectError> {
        let a = self.anomaly_threshold;
        if !(a > 0.0 && a < 1.0) {
            return Err(DetectError::InvalidConfiguration {
                parameter: "anomaly_threshold",
                reason: format!("must be in (0, 1), got {}", a),
            });
        }
        let c = self.critical_threshold;
        if !(c > a && c <= MAX_SCORE) {
            return Err(DetectError::InvalidConfiguration {
                parameter: "critical_threshold",
                reason: format!("must be in ({}, {}], got {}", a, MAX_SCORE, c),
            });
        }
        if self.confirm_count == 0 {
            return Err(DetectError::InvalidConfiguration {
                parameter: "confirm_count",
                reason: "must be positive, got 0".to_string(),
            });
        }
        Ok(())
    }
}

/// State-transition notifications, consumed by logging and rendering.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum WatchdogEvent {
    AnomalyDetected { timestamp: DateTime<Utc>, score: f64 },
    AnomalyResolved { timestamp: DateTime<Utc>, score: f64 },
    CriticalThreat { timestamp: DateTime<Utc>, score: f64 },
    HaltRequested { timestamp: DateTime<Utc>, score: f64 },
}

impl WatchdogEvent {
    pub fn timestamp(&self) -> DateTime<Utc> {
        match self {
            WatchdogEvent::AnomalyDetected { timestamp, .. }
            | WatchdogEvent::AnomalyResolved { timestamp, .. }
            | WatchdogEvent::CriticalThreat { timestamp, .. }
            | WatchdogEvent::HaltRequested { timestamp, .. } => *timestamp,
        }
    }

    /// Score of the observation that triggered the event.
    pub fn score(&self) -> f64 {
        match self {
            WatchdogEvent::AnomalyDetected { score, .. }
            | WatchdogEvent::AnomalyResolved { score, .. }
            | WatchdogEvent::CriticalThreat { score, .. }
            | WatchdogEvent::HaltRequested { score, .. } => *score,
        }
    }

    pub fn kind(&self) -> &'static str {
        match self {
            WatchdogEvent::AnomalyDetected { .. } => "anomaly_detected",
            WatchdogEvent::AnomalyResolved { .. } => "anomaly_resolved",
            WatchdogEvent::CriticalThreat { .. } => "critical_threat",
            WatchdogEvent::HaltRequested { .. } => "halt_requested",
        }
    }

    pub fn severity(&self) -> Severity {
        match self {
            WatchdogEvent::AnomalyResolved { .. } => Severity::Info,
            WatchdogEvent::AnomalyDetected { .. } => Severity::Warning,
            WatchdogEvent::CriticalThreat { .. } => Severity::Critical,
            WatchdogEvent::HaltRequested { .. } => Severity::Fatal,
        }
    }

    /// Human-readable one-liner.
    pub fn message(&self) -> &'static str {
        match self {
            WatchdogEvent::AnomalyDetected { .. } => "Anomaly detected",
            WatchdogEvent::AnomalyResolved { .. } => "Anomaly resolved. System normal.",
            WatchdogEvent::CriticalThreat { .. } => "Critical threat detected",
            WatchdogEvent::HaltRequested { .. } => "Halt on critical configured. Requesting stop.",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_policy_is_valid() {
        assert!(WatchdogPolicy::default().validate().is_ok());
    }

    #[test]
    fn test_policy_validation() {
        let bad_anomaly = WatchdogPolicy {
            anomaly_threshold: 1.0,
            ..Default::default()
        };
        assert!(matches!(
            bad_anomaly.validate(),
            Err(DetectError::InvalidConfiguration { parameter: "anomaly_threshold", .. })
        ));

        let inverted = WatchdogPolicy {
            anomaly_threshold: 0.8,
            critical_threshold: 0.7,
            ..Default::default()
        };
        let err = inverted.validate().unwrap_err();
        assert!(err.to_string().contains("critical_threshold"));

        let no_confirm = WatchdogPolicy {
            confirm_count: 0,
            ..Default::default()
        };
        assert!(no_confirm.validate().is_err());

        let nan = WatchdogPolicy {
            anomaly_threshold: f64::NAN,
            ..Default::default()
        };
        assert!(nan.validate().is_err());
    }

    #[test]
    fn test_event_serializes_with_tag() {
        let ts = DateTime::from_timestamp(1_700_000_000, 0).unwrap();
        let event = WatchdogEvent::CriticalThreat {
            timestamp: ts,
            score: 0.93,
        };
        let json = serde_json::to_value(&event).unwrap();
        assert_eq!(json["event"], "critical_threat");
        assert_eq!(json["score"], 0.93);
        assert_eq!(event.severity(), Severity::Critical);
        assert_eq!(serde_json::to_value(Severity::Fatal).unwrap(), "FATAL");
    }
}
