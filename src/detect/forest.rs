//! Isolation ensemble: fitting, scoring and threshold calibration.

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::detect::normalize::normalize;
use crate::detect::tree::PartitionTree;
use crate::detect::{AnomalyScorer, DetectError, Verdict, DEFAULT_THRESHOLD};

/// Parameters accepted by [`IsolationEnsemble::fit`].
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct FitParams {
    /// Number of trees in the ensemble.
    pub tree_count: usize,
    /// Observations drawn (without replacement) for each tree.
    pub sample_size: usize,
    /// Seed for reproducible fits. `None` draws a fresh seed.
    pub seed: Option<u64>,
}

impl Default for FitParams {
    fn default() -> Self {
        Self {
            tree_count: 100,
            sample_size: 256,
            seed: None,
        }
    }
}

impl FitParams {
    pub fn validate(&self) -> Result<(), DetectError> {
        if self.tree_count == 0 {
            return Err(DetectError::invalid("tree_count", "must be positive, got 0"));
        }
        if self.sample_size <= 1 {
            return Err(DetectError::invalid(
                "sample_size",
                format!("must be greater than 1, got {}", self.sample_size),
            ));
        }
        Ok(())
    }

    /// Depth cap for every tree: ceil(log2(sample_size)).
    pub fn max_depth(&self) -> usize {
        (self.sample_size as f64).log2().ceil() as usize
    }
}

/// A fitted isolation ensemble. Immutable once built and safe to share
/// between any number of concurrent scorers.
#[derive(Debug, Clone)]
pub struct IsolationEnsemble {
    trees: Vec<PartitionTree>,
    /// Sample size actually drawn per tree: min(sample_size, |training set|).
    sample_size: usize,
    dimensions: usize,
    params: FitParams,
}

impl IsolationEnsemble {
    /// Build `params.tree_count` partition trees over random sub-samples of `training`.
    pub fn fit(training: &[Vec<f64>], params: &FitParams) -> Result<Self, DetectError> {
        params.validate()?;
        let dimensions = check_training_set(training)?;

        let sample_size = params.sample_size.min(training.len());
        let max_depth = params.max_depth();
        let base_seed = params.seed.unwrap_or_else(|| rand::thread_rng().gen());

        info!(
            trees = params.tree_count,
            sample_size,
            dimensions,
            observations = training.len(),
            "fitting isolation ensemble"
        );
        debug!(seed = base_seed, max_depth, "ensemble randomness");

        // Each tree owns an independent stream derived from the base seed, so
        // the result does not depend on how rayon schedules the builds.
        let trees: Vec<PartitionTree> = (0..params.tree_count)
            .into_par_iter()
            .map(|i| {
                let mut rng = StdRng::seed_from_u64(tree_seed(base_seed, i));
                let picks = rand::seq::index::sample(&mut rng, training.len(), sample_size);
                let sample: Vec<&[f64]> = picks.iter().map(|j| training[j].as_slice()).collect();
                PartitionTree::build(&sample, max_depth, &mut rng)
            })
            .collect();

        Ok(Self {
            trees,
            sample_size,
            dimensions,
            params: *params,
        })
    }

    /// Mean path length of `point` across all trees.
    pub fn average_path_length(&self, point: &[f64]) -> Result<f64, DetectError> {
        self.check_dimensions(point)?;
        let total: f64 = self.trees.iter().map(|t| t.path_length(point)).sum();
        Ok(total / self.trees.len() as f64)
    }

    /// Anomaly score in (0, 1]: around 0.5 or below is typical, close to 1 is
    /// easily isolated.
    pub fn score(&self, point: &[f64]) -> Result<f64, DetectError> {
        let avg = self.average_path_length(point)?;
        Ok(normalize(avg, self.sample_size))
    }

    /// Classify `point` against `threshold` (or [`DEFAULT_THRESHOLD`]).
    pub fn predict(&self, point: &[f64], threshold: Option<f64>) -> Result<Verdict, DetectError> {
        let score = self.score(point)?;
        Ok(Verdict::from_score(
            score,
            threshold.unwrap_or(DEFAULT_THRESHOLD),
        ))
    }

    /// Score many observations in parallel. Output order matches input order.
    pub fn score_batch(&self, points: &[Vec<f64>]) -> Result<Vec<f64>, DetectError> {
        points.par_iter().map(|p| self.score(p)).collect()
    }

    pub fn predict_batch(
        &self,
        points: &[Vec<f64>],
        threshold: Option<f64>,
    ) -> Result<Vec<Verdict>, DetectError> {
        let threshold = threshold.unwrap_or(DEFAULT_THRESHOLD);
        Ok(self
            .score_batch(points)?
            .into_iter()
            .map(|s| Verdict::from_score(s, threshold))
            .collect())
    }

    /// Derive a threshold that flags roughly `contamination` of `reference`
    /// (typically the training set) as anomalous.
    ///
    /// Returns the smallest score among the top `ceil(n * contamination)` scores.
    pub fn calibrate_threshold(
        &self,
        reference: &[Vec<f64>],
        contamination: f64,
    ) -> Result<f64, DetectError> {
        if !(contamination > 0.0 && contamination <= 0.5) {
            return Err(DetectError::invalid(
                "contamination",
                format!("must be in (0, 0.5], got {}", contamination),
            ));
        }
        if reference.is_empty() {
            return Err(DetectError::invalid(
                "reference",
                "need at least one observation to calibrate against",
            ));
        }

        let mut scores = self.score_batch(reference)?;
        scores.sort_by(|a, b| a.total_cmp(b));

        let n = scores.len();
        let flagged = ((n as f64 * contamination).ceil() as usize).clamp(1, n);
        let threshold = scores[n - flagged];
        info!(contamination, threshold, flagged, "calibrated anomaly threshold");
        Ok(threshold)
    }

    pub fn tree_count(&self) -> usize {
        self.trees.len()
    }

    /// Sample size each tree was built from.
    pub fn sample_size(&self) -> usize {
        self.sample_size
    }

    pub fn dimensions(&self) -> usize {
        self.dimensions
    }

    pub fn params(&self) -> &FitParams {
        &self.params
    }

    fn check_dimensions(&self, point: &[f64]) -> Result<(), DetectError> {
        if point.len() != self.dimensions {
            return Err(DetectError::DimensionMismatch {
                expected: self.dimensions,
                actual: point.len(),
            });
        }
        Ok(())
    }
}

impl AnomalyScorer for IsolationEnsemble {
    fn name(&self) -> &'static str {
        "isolation-forest"
    }

    /// Scores the most recent observation of the window.
    fn score_window(&self, window: &[Vec<f64>]) -> Result<f64, DetectError> {
        let latest = window.last().ok_or(DetectError::EmptyWindow)?;
        self.score(latest)
    }
}

/// Validate the training set and return its dimensionality.
fn check_training_set(training: &[Vec<f64>]) -> Result<usize, DetectError> {
    let first = training
        .first()
        .ok_or_else(|| DetectError::invalid("training_set", "must not be empty"))?;
    let dimensions = first.len();
    if dimensions == 0 {
        return Err(DetectError::invalid(
            "training_set",
            "observations must have at least one feature",
        ));
    }

    for (row, observation) in training.iter().enumerate() {
        if observation.len() != dimensions {
            return Err(DetectError::invalid(
                "training_set",
                format!(
                    "row {} has {} features, expected {}",
                    row,
                    observation.len(),
                    dimensions
                ),
            ));
        }
        if let Some(feature) = observation.iter().position(|v| !v.is_finite()) {
            return Err(DetectError::invalid(
                "training_set",
                format!("row {} feature {} is not finite", row, feature),
            ));
        }
    }
    Ok(dimensions)
}

/// splitmix64 over (base, index).
fn tree_seed(base: u64, index: usize) -> u64 {
    let mut z = base.wrapping_add((index as u64).wrapping_add(1).wrapping_mul(0x9E37_79B9_7F4A_7C15));
    z = (z ^ (z >> 30)).wrapping_mul(0xBF58_476D_1CE4_E5B9);
    z = (z ^ (z >> 27)).wrapping_mul(0x94D0_49BB_1331_11EB);
    z ^ (z >> 31)
}
