//! Anomaly scoring: the isolation ensemble and its supporting pieces.

pub mod engine;
pub mod forest;
pub mod normalize;
pub mod tree;

pub use engine::Detector;
pub use forest::{FitParams, IsolationEnsemble};

use thiserror::Error;

/// Score at or above which `predict` reports an anomaly when the caller gives no threshold.
pub const DEFAULT_THRESHOLD: f64 = 0.5;

#[derive(Debug, Clone, PartialEq, Error)]
pub enum DetectError {
    #[error("invalid configuration for `{parameter}`: {reason}")]
    InvalidConfiguration {
        parameter: &'static str,
        reason: String,
    },
    #[error("model has not been fitted; call fit() before scoring")]
    NotFitted,
    #[error("dimension mismatch: expected {expected} features, got {actual}")]
    DimensionMismatch { expected: usize, actual: usize },
    #[error("cannot score an empty observation window")]
    EmptyWindow,
}

impl DetectError {
    pub(crate) fn invalid(parameter: &'static str, reason: impl Into<String>) -> Self {
        Self::InvalidConfiguration {
            parameter,
            reason: reason.into(),
        }
    }
}

/// Binary classification of a single observation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Verdict {
    Normal,
    Anomaly,
}

impl Verdict {
    pub fn from_score(score: f64, threshold: f64) -> Self {
        if score >= threshold || score.is_nan() {
            Verdict::Anomaly
        } else {
            Verdict::Normal
        }
    }
}

impl std::fmt::Display for Verdict {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Verdict::Normal => write!(f, "NORMAL"),
            Verdict::Anomaly => write!(f, "ANOMALY"),
        }
    }
}

/// Anything that can turn a window of recent observations into a single
/// anomaly score. The watchdog and monitor only ever see this capability, so
/// scoring engines are interchangeable.
pub trait AnomalyScorer: Send + Sync {
    /// Short engine identifier for logs.
    fn name(&self) -> &'static str;

    /// Score a window of observations, oldest first.
    fn score_window(&self, window: &[Vec<f64>]) -> Result<f64, DetectError>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_verdict_from_score() {
        assert_eq!(Verdict::from_score(0.49, 0.5), Verdict::Normal);
        assert_eq!(Verdict::from_score(0.5, 0.5), Verdict::Anomaly);
        assert_eq!(Verdict::from_score(f64::NAN, 0.5), Verdict::Anomaly);
        assert_eq!(Verdict::Anomaly.to_string(), "ANOMALY");
    }

    #[test]
    fn test_error_messages_carry_detail() {
        let err = DetectError::DimensionMismatch {
            expected: 3,
            actual: 2,
        };
        assert_eq!(err.to_string(), "dimension mismatch: expected 3 features, got 2");

        let err = DetectError::invalid("sample_size", "must be greater than 1, got 0");
        assert_eq!(
            err.to_string(),
            "invalid configuration for `sample_size`: must be greater than 1, got 0"
        );
    }
}
