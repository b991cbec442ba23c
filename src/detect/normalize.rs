//! Path-length calibration for isolation scores.

/// Euler–Mascheroni constant used in the harmonic-number approximation.
pub const EULER_GAMMA: f64 = 0.5772156649;

/// Approximate the k-th harmonic number: H(k) ~ ln(k) + gamma.
///
/// Only meaningful for `k >= 1`; callers never ask for H(0).
pub fn harmonic(k: usize) -> f64 {
    (k as f64).ln() + EULER_GAMMA
}

/// Expected path length of an unsuccessful binary-search-tree lookup among `n` items.
///
/// c(n) = 2 * H(n - 1) - 2 * (n - 1) / n, and 0 for n <= 1.
pub fn adjusted_path_length(n: usize) -> f64 {
    if n <= 1 {
        return 0.0;
    }
    let n_f = n as f64;
    2.0 * harmonic(n - 1) - 2.0 * (n_f - 1.0) / n_f
}

/// Map an average path length onto the (0, 1] anomaly scale.
///
/// score = 2^(-avg_path_length / c(sample_size)). A path exactly as long as
/// c(sample_size) scores 0.5; shorter paths approach 1.0.
///
/// With `sample_size <= 1` there is nothing to calibrate against and the
/// neutral score 0.5 is returned.
pub fn normalize(avg_path_length: f64, sample_size: usize) -> f64 {
    let c = adjusted_path_length(sample_size);
    if c <= 0.0 {
        return 0.5;
    }
    (-avg_path_length / c).exp2()
}
