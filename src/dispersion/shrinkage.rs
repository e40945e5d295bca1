//! Empirical-Bayes shrinkage of gene-wise dispersions toward the trend

use serde::{Deserialize, Serialize};

use crate::stats::{mad_squared, trigamma};

/// Floor on the prior variance of log dispersions
const MIN_PRIOR_VAR: f64 = 0.25;

/// Variance components of the log-dispersion prior.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct PriorVariance {
    /// Robust variance of log(raw) - log(trend) across genes
    pub residual_variance: f64,
    /// Expected sampling variance of a log dispersion estimate,
    /// `trigamma((m - p) / 2)`
    pub sampling_variance: f64,
    /// `max(residual - sampling, 0.25)`
    pub prior_variance: f64,
}

/// Estimate the prior from genes whose raw estimate is off the floor.
pub fn estimate_prior_variance(
    raw: &[f64],
    trended: &[f64],
    n_samples: usize,
    n_coefs: usize,
    min_disp: f64,
) -> PriorVariance {
    let residuals: Vec<f64> = raw
        .iter()
        .zip(trended.iter())
        .filter(|(&r, &t)| r.is_finite() && t.is_finite() && t > 0.0 && r >= 100.0 * min_disp)
        .map(|(&r, &t)| r.ln() - t.ln())
        .collect();

    let sampling_variance = trigamma((n_samples - n_coefs) as f64 / 2.0);

    if residuals.len() < 3 {
        log::debug!("{} residuals for the dispersion prior; using the minimum prior variance", residuals.len());
        return PriorVariance {
            residual_variance: MIN_PRIOR_VAR,
            sampling_variance,
            prior_variance: MIN_PRIOR_VAR,
        };
    }

    let residual_variance = mad_squared(&residuals);
    let prior_variance = (residual_variance - sampling_variance).max(MIN_PRIOR_VAR);
    log::debug!(
        "Dispersion prior: residual var {:.4}, sampling var {:.4}, prior var {:.4}",
        residual_variance,
        sampling_variance,
        prior_variance
    );

    PriorVariance {
        residual_variance,
        sampling_variance,
        prior_variance,
    }
}

/// Shrunk dispersion of one gene and whether it is a dispersion outlier.
///
/// In log space the estimate is the precision-weighted average of the raw
/// estimate and the trend. Genes lying more than `outlier_sd` residual SDs
/// above the trend keep their raw estimate.
pub fn shrink_dispersion(raw: f64, trended: f64, prior: &PriorVariance, outlier_sd: f64, bounds: (f64, f64)) -> (f64, bool) {
    let log_raw = raw.ln();
    let log_trend = trended.ln();

    if log_raw - log_trend > outlier_sd * prior.residual_variance.sqrt() {
        return (raw, true);
    }

    let w_raw = 1.0 / prior.sampling_variance;
    let w_trend = 1.0 / prior.prior_variance;
    let log_shrunk = (w_raw * log_raw + w_trend * log_trend) / (w_raw + w_trend);
    (log_shrunk.exp().clamp(bounds.0, bounds.1), false)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn prior() -> PriorVariance {
        PriorVariance {
            residual_variance: 0.5,
            sampling_variance: 0.5,
            prior_variance: 0.25,
        }
    }

    #[test]
    fn test_shrinks_between_raw_and_trend() {
        let (d, outlier) = shrink_dispersion(0.05, 0.1, &prior(), 2.0, (1e-8, 10.0));
        assert!(!outlier);
        assert!(d > 0.05 && d < 0.1);
        // weights 2 and 4 in log space
        let expected = ((2.0 * 0.05f64.ln() + 4.0 * 0.1f64.ln()) / 6.0).exp();
        assert!((d - expected).abs() < 1e-12);
    }

    #[test]
    fn test_high_outlier_keeps_raw() {
        // log(2.0 / 0.1) = 3.0 > 2 * sqrt(0.5)
        let (d, outlier) = shrink_dispersion(2.0, 0.1, &prior(), 2.0, (1e-8, 10.0));
        assert!(outlier);
        assert_eq!(d, 2.0);
    }

    #[test]
    fn test_low_estimates_are_not_outliers() {
        let (d, outlier) = shrink_dispersion(1e-8, 0.1, &prior(), 2.0, (1e-8, 10.0));
        assert!(!outlier);
        assert!(d > 1e-8 && d < 0.1);
    }

    #[test]
    fn test_prior_floor() {
        let raw = vec![0.1, 0.11, 0.09, 0.1, 0.105];
        let trend = vec![0.1; 5];
        let p = estimate_prior_variance(&raw, &trend, 6, 2, 1e-8);
        assert_eq!(p.prior_variance, 0.25);
        assert!((p.sampling_variance - trigamma(2.0)).abs() < 1e-12);
    }
}
