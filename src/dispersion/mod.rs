//! Dispersion estimation for negative binomial models
//!
//! Three stages: gene-wise method-of-moments estimates (parallel per gene),
//! a parametric mean-dispersion trend (one sequential fit over all genes),
//! and empirical-Bayes shrinkage toward the trend (parallel per gene).

mod moments;
mod shrinkage;
mod trend;

pub use moments::moments_dispersion;
pub use shrinkage::{estimate_prior_variance, shrink_dispersion, PriorVariance};
pub use trend::{fit_parametric_trend, DispersionTrend};

use ndarray::{Array1, Axis};
use rayon::prelude::*;
use serde::{Deserialize, Serialize};

use crate::data::CountMatrix;
use crate::design::ModelMatrix;
use crate::error::{DiffExprError, Result};
use crate::normalization::SizeFactors;

/// Configurable parameters for dispersion estimation.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DispersionParams {
    /// Lower bound on every dispersion estimate
    pub min_disp: f64,
    /// Residual SDs above the trend beyond which a gene keeps its raw estimate
    pub outlier_sd: f64,
    /// Genes off the dispersion floor required to fit the trend
    pub min_trend_genes: usize,
    /// Continue without a trend (raw estimates, log transform) when the
    /// trend fit fails, instead of aborting the analysis
    pub accept_trend_fallback: bool,
}

impl Default for DispersionParams {
    fn default() -> Self {
        Self {
            min_disp: 1e-8,
            outlier_sd: 2.0,
            min_trend_genes: 10,
            accept_trend_fallback: false,
        }
    }
}

/// Per-gene dispersions of one analysis. Immutable once estimated.
///
/// All-zero genes carry NaN in every per-gene field.
#[derive(Debug, Clone)]
pub struct DispersionModel {
    means: Array1<f64>,
    raw: Array1<f64>,
    trend: Option<DispersionTrend>,
    trended: Array1<f64>,
    dispersions: Array1<f64>,
    outliers: Vec<bool>,
    prior: Option<PriorVariance>,
}

impl DispersionModel {
    /// Model from caller-supplied final dispersions, with no trend or prior.
    ///
    /// Non-finite entries mark genes that are excluded from fitting.
    pub fn fixed(means: Vec<f64>, dispersions: Vec<f64>) -> Result<Self> {
        if means.len() != dispersions.len() {
            return Err(DiffExprError::DimensionMismatch {
                expected: format!("{} dispersions", means.len()),
                got: format!("{} dispersions", dispersions.len()),
            });
        }
        if let Some(bad) = dispersions.iter().find(|d| d.is_finite() && **d <= 0.0) {
            return Err(DiffExprError::DegenerateInput {
                reason: format!("dispersions must be positive, got {}", bad),
            });
        }
        let n = dispersions.len();
        Ok(Self {
            means: Array1::from_vec(means),
            raw: Array1::from_vec(dispersions.clone()),
            trend: None,
            trended: Array1::from_elem(n, f64::NAN),
            dispersions: Array1::from_vec(dispersions),
            outliers: vec![false; n],
            prior: None,
        })
    }

    /// Mean normalized count per gene
    pub fn means(&self) -> &Array1<f64> {
        &self.means
    }

    /// Gene-wise (unshrunk) estimates
    pub fn raw(&self) -> &Array1<f64> {
        &self.raw
    }

    /// The fitted trend; `None` when a failed fit was accepted.
    pub fn trend(&self) -> Option<&DispersionTrend> {
        self.trend.as_ref()
    }

    /// Trend evaluated at each gene's mean (NaN without a trend)
    pub fn trended(&self) -> &Array1<f64> {
        &self.trended
    }

    /// Final dispersions used by model fitting
    pub fn dispersions(&self) -> &Array1<f64> {
        &self.dispersions
    }

    pub fn dispersion(&self, gene_idx: usize) -> f64 {
        self.dispersions[gene_idx]
    }

    /// Genes that kept their raw estimate as dispersion outliers
    pub fn outliers(&self) -> &[bool] {
        &self.outliers
    }

    pub fn prior(&self) -> Option<&PriorVariance> {
        self.prior.as_ref()
    }

    pub fn n_genes(&self) -> usize {
        self.raw.len()
    }
}

/// Estimate final dispersions for every gene.
///
/// Requires more samples than design coefficients. A failed trend fit is
/// fatal unless `params.accept_trend_fallback` is set, in which case every
/// gene keeps its raw estimate.
pub fn estimate_dispersions(
    counts: &CountMatrix,
    size_factors: &SizeFactors,
    design: &ModelMatrix,
    params: &DispersionParams,
    pool: &rayon::ThreadPool,
) -> Result<DispersionModel> {
    let m = counts.n_samples();
    let p = design.n_coefs();
    if m <= p {
        return Err(DiffExprError::DegenerateInput {
            reason: format!(
                "{} samples for {} design coefficients; no residual degrees of freedom to estimate dispersion",
                m, p
            ),
        });
    }

    let normalized = size_factors.normalize(counts)?;
    let means = normalized.mean_axis(Axis(1)).unwrap_or_else(|| Array1::zeros(counts.n_genes()));
    let nonzero = counts.nonzero_gene_mask();
    let max_disp = (m as f64).max(10.0);
    let bounds = (params.min_disp, max_disp);

    log::info!("Estimating gene-wise dispersions for {} genes", nonzero.iter().filter(|&&x| x).count());
    let raw: Vec<f64> = pool.install(|| {
        (0..counts.n_genes())
            .into_par_iter()
            .map(|i| {
                if nonzero[i] {
                    moments_dispersion(normalized.row(i), design.matrix(), bounds.0, bounds.1)
                } else {
                    f64::NAN
                }
            })
            .collect()
    });

    let trend = match fit_parametric_trend(means.as_slice().unwrap_or(&[]), &raw, params.min_disp, params.min_trend_genes) {
        Ok(trend) => {
            log::info!(
                "Dispersion trend: {:.4e} + {:.4e} / mean",
                trend.asympt_disp,
                trend.extra_pois
            );
            Some(trend)
        }
        Err(e) if params.accept_trend_fallback => {
            log::warn!("{}; continuing with unshrunk gene-wise dispersions", e);
            None
        }
        Err(e) => return Err(e),
    };

    let Some(trend) = trend else {
        let n = counts.n_genes();
        return Ok(DispersionModel {
            means,
            raw: Array1::from_vec(raw.clone()),
            trend: None,
            trended: Array1::from_elem(n, f64::NAN),
            dispersions: Array1::from_vec(raw),
            outliers: vec![false; n],
            prior: None,
        });
    };

    let trended: Vec<f64> = means
        .iter()
        .zip(nonzero.iter())
        .map(|(&mean, &nz)| if nz { trend.evaluate(mean) } else { f64::NAN })
        .collect();

    let prior = estimate_prior_variance(&raw, &trended, m, p, params.min_disp);

    let shrunk: Vec<(f64, bool)> = pool.install(|| {
        raw.par_iter()
            .zip(trended.par_iter())
            .map(|(&r, &t)| {
                if r.is_finite() {
                    shrink_dispersion(r, t, &prior, params.outlier_sd, bounds)
                } else {
                    (f64::NAN, false)
                }
            })
            .collect()
    });
    let n_outliers = shrunk.iter().filter(|(_, o)| *o).count();
    if n_outliers > 0 {
        log::info!("{} dispersion outlier(s) kept their gene-wise estimate", n_outliers);
    }
    let (dispersions, outliers): (Vec<f64>, Vec<bool>) = shrunk.into_iter().unzip();

    Ok(DispersionModel {
        means,
        raw: Array1::from_vec(raw),
        trend: Some(trend),
        trended: Array1::from_vec(trended),
        dispersions: Array1::from_vec(dispersions),
        outliers,
        prior: Some(prior),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::data::SampleMetadata;
    use crate::design::Formula;
    use crate::normalization::{estimate_size_factors, SizeFactorMethod};
    use ndarray::Array2;

    fn pool() -> rayon::ThreadPool {
        rayon::ThreadPoolBuilder::new().num_threads(2).build().unwrap()
    }

    fn design(n: usize) -> ModelMatrix {
        let ids: Vec<String> = (1..=n).map(|i| format!("s{}", i)).collect();
        let mut meta = SampleMetadata::new(ids).unwrap();
        let cond = (0..n).map(|i| if i < n / 2 { "a" } else { "b" }.to_string()).collect();
        meta.add_categorical("condition", cond, None).unwrap();
        ModelMatrix::build(&Formula::parse("~ condition").unwrap(), &meta).unwrap()
    }

    /// Deterministic overdispersed counts: gene means from 20 to ~2000 with
    /// alternating deviations of a few percent plus Poisson-scale noise.
    fn synthetic_counts(n_genes: usize, n_samples: usize) -> CountMatrix {
        let mut counts = Array2::<f64>::zeros((n_genes, n_samples));
        for g in 0..n_genes {
            let mu = 20.0 * (1.0 + g as f64 * 0.8).powf(1.4);
            for s in 0..n_samples {
                let sign = if (g + s) % 2 == 0 { 1.0 } else { -1.0 };
                let wiggle = 1.0 + sign * (0.15 + 0.05 * ((g * 7 + s * 3) % 5) as f64 / 4.0);
                counts[[g, s]] = (mu * wiggle + sign * mu.sqrt()).round().max(0.0);
            }
        }
        let genes = (0..n_genes).map(|g| format!("gene{}", g)).collect();
        let samples = (1..=n_samples).map(|s| format!("s{}", s)).collect();
        CountMatrix::new(counts, genes, samples).unwrap()
    }

    #[test]
    fn test_full_estimation() {
        let counts = synthetic_counts(40, 6);
        let sf = estimate_size_factors(&counts, SizeFactorMethod::Ratio).unwrap();
        let model = estimate_dispersions(&counts, &sf, &design(6), &DispersionParams::default(), &pool()).unwrap();

        assert_eq!(model.n_genes(), 40);
        assert!(model.trend().is_some());
        assert!(model.dispersions().iter().all(|d| d.is_finite() && *d >= 1e-8 && *d <= 10.0));
        assert!(model.prior().unwrap().prior_variance >= 0.25);
    }

    #[test]
    fn test_no_replicates_is_degenerate() {
        let counts = synthetic_counts(10, 2);
        let sf = SizeFactors::from_values(vec![1.0, 1.0]).unwrap();
        let err = estimate_dispersions(&counts, &sf, &design(2), &DispersionParams::default(), &pool()).unwrap_err();
        assert!(matches!(err, DiffExprError::DegenerateInput { .. }));
    }

    #[test]
    fn test_trend_failure_is_fatal_by_default() {
        let counts = CountMatrix::new(
            ndarray::array![[100.0, 100.0, 100.0, 100.0], [10.0, 20.0, 30.0, 40.0]],
            vec!["g1".into(), "g2".into()],
            (1..=4).map(|i| format!("s{}", i)).collect(),
        )
        .unwrap();
        let sf = SizeFactors::from_values(vec![1.0; 4]).unwrap();
        let err = estimate_dispersions(&counts, &sf, &design(4), &DispersionParams::default(), &pool()).unwrap_err();
        assert!(matches!(err, DiffExprError::TrendFit { .. }));

        let params = DispersionParams {
            accept_trend_fallback: true,
            ..DispersionParams::default()
        };
        let model = estimate_dispersions(&counts, &sf, &design(4), &params, &pool()).unwrap();
        assert!(model.trend().is_none());
        assert_eq!(model.dispersion(0), 1e-8);
        assert!((model.dispersion(1) - model.raw()[1]).abs() < 1e-15);
    }

    #[test]
    fn test_default_needs_ten_trend_genes() {
        assert_eq!(DispersionParams::default().min_trend_genes, 10);

        let counts = synthetic_counts(5, 6);
        let sf = estimate_size_factors(&counts, SizeFactorMethod::Ratio).unwrap();
        let err = estimate_dispersions(&counts, &sf, &design(6), &DispersionParams::default(), &pool()).unwrap_err();
        assert!(matches!(err, DiffExprError::TrendFit { .. }));
    }

    #[test]
    fn test_all_zero_gene_is_missing() {
        let mut counts = synthetic_counts(20, 6).counts().to_owned();
        counts.row_mut(3).fill(0.0);
        let counts = CountMatrix::new(
            counts,
            (0..20).map(|g| format!("gene{}", g)).collect(),
            (1..=6).map(|s| format!("s{}", s)).collect(),
        )
        .unwrap();
        let sf = estimate_size_factors(&counts, SizeFactorMethod::Ratio).unwrap();
        let model = estimate_dispersions(&counts, &sf, &design(6), &DispersionParams::default(), &pool()).unwrap();
        assert!(model.dispersion(3).is_nan());
        assert!(model.dispersion(4).is_finite());
    }
}
