use tracing::info;

use crate::detect::forest::{FitParams, IsolationEnsemble};
use crate::detect::{AnomalyScorer, DetectError, Verdict};

/// Owner of an optionally fitted ensemble.
///
/// Convenience wrapper for callers that create the detector first and train it
/// later; scoring before [`Detector::fit`] fails with [`DetectError::NotFitted`].
#[derive(Debug, Clone, Default)]
pub struct Detector {
    ensemble: Option<IsolationEnsemble>,
}

impl Detector {
    pub fn new() -> Self {
        Self::default()
    }

    /// Learn the normal state from `training`, replacing any previous fit.
    pub fn fit(&mut self, training: &[Vec<f64>], params: &FitParams) -> Result<(), DetectError> {
        info!(samples = training.len(), "fitting detector");
        let ensemble = IsolationEnsemble::fit(training, params)?;
        self.ensemble = Some(ensemble);
        info!("model fitting complete");
        Ok(())
    }

    pub fn is_fitted(&self) -> bool {
        self.ensemble.is_some()
    }

    /// The fitted ensemble.
    pub fn ensemble(&self) -> Result<&IsolationEnsemble, DetectError> {
        self.ensemble.as_ref().ok_or(DetectError::NotFitted)
    }

    /// Hand the fitted ensemble over, e.g. to share it behind an `Arc`.
    pub fn into_ensemble(self) -> Result<IsolationEnsemble, DetectError> {
        self.ensemble.ok_or(DetectError::NotFitted)
    }

    pub fn score(&self, point: &[f64]) -> Result<f64, DetectError> {
        self.ensemble()?.score(point)
    }

    pub fn predict(&self, point: &[f64], threshold: Option<f64>) -> Result<Verdict, DetectError> {
        self.ensemble()?.predict(point, threshold)
    }
}

impl AnomalyScorer for Detector {
    fn name(&self) -> &'static str {
        "detector"
    }

    fn score_window(&self, window: &[Vec<f64>]) -> Result<f64, DetectError> {
        self.ensemble()?.score_window(window)
    }
}
