//! Gene-wise method-of-moments dispersion estimates

use ndarray::{Array2, ArrayView1};

use crate::linalg::{least_squares, linear_predictor};

/// Method-of-moments dispersion of one gene's normalized counts.
///
/// Group means come from a least-squares fit of the normalized counts on the
/// design and are floored at 1. The estimate is the variance in excess of
/// the Poisson expectation, divided by the squared mean, averaged over the
/// residual degrees of freedom:
///
/// `alpha = sum(((y - mu)^2 - mu) / mu^2) / (m - p)`
///
/// The result is clamped to `[min_disp, max_disp]`. The caller guarantees
/// `m > p`.
pub fn moments_dispersion(normalized: ArrayView1<f64>, design: &Array2<f64>, min_disp: f64, max_disp: f64) -> f64 {
    let y = normalized.to_vec();
    let m = y.len();
    let p = design.ncols();

    let beta = least_squares(design, &y);
    let mu = linear_predictor(design, &beta);

    let sum: f64 = y
        .iter()
        .zip(mu.iter())
        .map(|(&yi, &mui)| {
            let mui = mui.max(1.0);
            ((yi - mui).powi(2) - mui) / (mui * mui)
        })
        .sum();

    let alpha = sum / (m - p) as f64;
    if alpha.is_finite() {
        alpha.clamp(min_disp, max_disp)
    } else {
        max_disp
    }
}
