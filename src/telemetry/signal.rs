//! Synthetic "heartbeat" signals: a sine wave with Gaussian noise.

use std::ops::Range;

use rand::Rng;
use rand_distr::StandardNormal;

/// `length` samples of sin(t) for t evenly spaced over [0, 100], plus
/// N(0, noise_level) noise.
pub fn sine_wave<R: Rng + ?Sized>(length: usize, noise_level: f64, rng: &mut R) -> Vec<f64> {
    let step = if length > 1 {
        100.0 / (length - 1) as f64
    } else {
        0.0
    };
    (0..length)
        .map(|i| {
            let t = i as f64 * step;
            let noise: f64 = rng.sample(StandardNormal);
            t.sin() + noise_level * noise
        })
        .collect()
}

/// Add `offset` to every sample in `range` (clamped to the signal length).
pub fn inject_spike(signal: &mut [f64], range: Range<usize>, offset: f64) {
    let end = range.end.min(signal.len());
    let start = range.start.min(end);
    for v in &mut signal[start..end] {
        *v += offset;
    }
}

/// One single-feature observation per sample.
pub fn as_observations(signal: &[f64]) -> Vec<Vec<f64>> {
    signal.iter().map(|&v| vec![v]).collect()
}
