//! Parametric mean-dispersion trend

use serde::{Deserialize, Serialize};

use crate::error::{DiffExprError, Result};

/// Outer iterations of the residual-filtered fit
const MAX_OUTER_ITER: usize = 11;
/// Convergence threshold on sum(log(coef / old_coef)^2)
const OUTER_TOL: f64 = 1e-6;
/// Genes whose raw / fitted ratio falls outside this open interval are
/// dropped from the next iteration.
const RESIDUAL_BOUNDS: (f64, f64) = (1e-4, 15.0);

/// `dispersion(mean) = asympt_disp + extra_pois / mean`
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct DispersionTrend {
    /// Dispersion approached at high expression (a0)
    pub asympt_disp: f64,
    /// Extra-Poisson term dominating at low expression (a1)
    pub extra_pois: f64,
}

impl DispersionTrend {
    pub fn evaluate(&self, mean: f64) -> f64 {
        self.asympt_disp + self.extra_pois / mean
    }
}

/// Fit the parametric trend to gene-wise dispersions.
///
/// Genes take part when their mean is positive and their raw dispersion is at
/// least `100 * min_disp`. The fit is a Gamma-family GLM with identity link
/// of `disp ~ 1 + 1/mean`, refitted on the genes whose residual ratio stays
/// inside the bounds of the previous fit.
pub fn fit_parametric_trend(means: &[f64], raw: &[f64], min_disp: f64, min_genes: usize) -> Result<DispersionTrend> {
    let usable: Vec<(f64, f64)> = means
        .iter()
        .zip(raw.iter())
        .filter(|(&m, &d)| m > 0.0 && d.is_finite() && d >= 100.0 * min_disp)
        .map(|(&m, &d)| (m, d))
        .collect();

    let min_genes = min_genes.max(3);
    if usable.len() < min_genes {
        return Err(DiffExprError::TrendFit {
            reason: format!(
                "{} gene(s) usable for the trend fit, at least {} required",
                usable.len(),
                min_genes
            ),
        });
    }

    let mut coefs = (0.1_f64, 1.0_f64);

    for iter in 0..MAX_OUTER_ITER {
        let old = coefs;

        let good: Vec<(f64, f64)> = usable
            .iter()
            .filter(|&&(mean, disp)| {
                let fitted = coefs.0 + coefs.1 / mean;
                if fitted <= 0.0 {
                    return false;
                }
                let ratio = disp / fitted;
                ratio > RESIDUAL_BOUNDS.0 && ratio < RESIDUAL_BOUNDS.1
            })
            .copied()
            .collect();

        if good.len() < 3 {
            return Err(DiffExprError::TrendFit {
                reason: format!("only {} genes within residual bounds at iteration {}", good.len(), iter + 1),
            });
        }

        let (fitted, glm_converged) = gamma_identity_glm(&good, coefs);
        coefs = fitted;
        log::debug!(
            "Trend iteration {}: {} genes, a0={:.6}, a1={:.6}",
            iter + 1,
            good.len(),
            coefs.0,
            coefs.1
        );

        if !(coefs.0 > 0.0 && coefs.1 > 0.0) {
            return Err(DiffExprError::TrendFit {
                reason: format!(
                    "coefficients must be positive (a0={:.4e}, a1={:.4e})",
                    coefs.0, coefs.1
                ),
            });
        }

        let change = (coefs.0 / old.0).ln().powi(2) + (coefs.1 / old.1).ln().powi(2);
        if change < OUTER_TOL && glm_converged {
            return Ok(DispersionTrend {
                asympt_disp: coefs.0,
                extra_pois: coefs.1,
            });
        }
    }

    Err(DiffExprError::TrendFit {
        reason: format!("no convergence after {} iterations", MAX_OUTER_ITER),
    })
}

fn gamma_deviance(data: &[(f64, f64)], a0: f64, a1: f64) -> f64 {
    data.iter()
        .map(|&(mean, disp)| {
            let mu = (a0 + a1 / mean).max(1e-8);
            2.0 * (-(disp / mu).ln() + (disp - mu) / mu)
        })
        .sum()
}

/// IRLS for a Gamma GLM with identity link on one predictor `x = 1/mean`.
///
/// Returns `((intercept, slope), converged)`.
fn gamma_identity_glm(data: &[(f64, f64)], start: (f64, f64)) -> ((f64, f64), bool) {
    const MAX_ITER: usize = 25;
    const TOL: f64 = 1e-8;

    let (mut a0, mut a1) = start;
    let mut dev_old = gamma_deviance(data, a0, a1);

    for _ in 0..MAX_ITER {
        let (mut sw, mut swx, mut swz, mut swxx, mut swxz) = (0.0, 0.0, 0.0, 0.0, 0.0);
        for &(mean, disp) in data {
            let x = 1.0 / mean;
            let mu = (a0 + a1 * x).max(1e-8);
            let w = 1.0 / (mu * mu);
            sw += w;
            swx += w * x;
            swz += w * disp;
            swxx += w * x * x;
            swxz += w * x * disp;
        }

        let det = sw * swxx - swx * swx;
        if det.abs() < 1e-10 * sw * swxx {
            break;
        }
        a0 = (swxx * swz - swx * swxz) / det;
        a1 = (sw * swxz - swx * swz) / det;

        let dev = gamma_deviance(data, a0, a1);
        if (dev_old - dev).abs() / (0.1 + dev.abs()) < TOL {
            return ((a0, a1), true);
        }
        dev_old = dev;
    }

    ((a0, a1), false)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_recovers_exact_trend() {
        let means: Vec<f64> = (1..60).map(|i| i as f64 * 15.0 + 5.0).collect();
        let raw: Vec<f64> = means.iter().map(|m| 0.05 + 3.0 / m).collect();
        let trend = fit_parametric_trend(&means, &raw, 1e-8, 3).unwrap();
        assert!((trend.asympt_disp - 0.05).abs() < 1e-6);
        assert!((trend.extra_pois - 3.0).abs() < 1e-4);
        assert!((trend.evaluate(100.0) - 0.08).abs() < 1e-6);
    }

    #[test]
    fn test_too_few_genes() {
        let err = fit_parametric_trend(&[10.0, 20.0], &[0.1, 0.05], 1e-8, 3).unwrap_err();
        assert!(matches!(err, DiffExprError::TrendFit { .. }));
    }

    #[test]
    fn test_five_genes_below_default_minimum() {
        let means = vec![10.0, 50.0, 100.0, 500.0, 1000.0];
        let raw: Vec<f64> = means.iter().map(|m| 0.05 + 3.0 / m).collect();
        let min_genes = crate::dispersion::DispersionParams::default().min_trend_genes;
        let err = fit_parametric_trend(&means, &raw, 1e-8, min_genes).unwrap_err();
        assert!(matches!(err, DiffExprError::TrendFit { .. }));
    }

    #[test]
    fn test_floor_genes_excluded() {
        let means = vec![10.0, 20.0, 30.0, 40.0];
        let raw = vec![1e-8, 1e-8, 1e-8, 0.2];
        assert!(fit_parametric_trend(&means, &raw, 1e-8, 3).is_err());
    }

    #[test]
    fn test_increasing_trend_rejected() {
        // dispersion growing with the mean forces a negative a1
        let means: Vec<f64> = (1..40).map(|i| i as f64 * 10.0).collect();
        let raw: Vec<f64> = means.iter().map(|m| 0.01 + m / 1000.0).collect();
        assert!(fit_parametric_trend(&means, &raw, 1e-8, 3).is_err());
    }
}
