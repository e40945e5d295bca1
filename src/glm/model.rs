//! Batch fitting of full and reduced models across genes

use std::sync::Arc;

use ndarray::{Array1, Array2, Array3, ArrayView1, ArrayView2};
use rayon::prelude::*;
use serde::Serialize;

use super::fitting::{fit_gene, GeneFit, GlmFitParams};
use crate::data::CountMatrix;
use crate::design::ModelMatrix;
use crate::dispersion::DispersionModel;
use crate::error::{DiffExprError, Result};
use crate::normalization::SizeFactors;

/// Outcome of fitting one gene under one design.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum FitStatus {
    Converged,
    DidNotConverge,
    /// Gene has no counts and was not fitted
    AllZero,
}

impl FitStatus {
    pub fn is_converged(self) -> bool {
        self == FitStatus::Converged
    }
}

/// Fitted full and reduced models for every gene.
///
/// Per-gene values of genes that did not converge (or were all zero) are NaN
/// so they surface as missing in every downstream table.
#[derive(Debug, Clone)]
pub struct FittedModel {
    gene_ids: Vec<String>,
    coef_names: Vec<String>,
    coefficients: Array2<f64>,
    standard_errors: Array2<f64>,
    covariances: Array3<f64>,
    full_deviance: Array1<f64>,
    reduced_deviance: Array1<f64>,
    full_status: Vec<FitStatus>,
    reduced_status: Vec<FitStatus>,
    full_coefs: usize,
    reduced_coefs: usize,
    size_factors: Arc<SizeFactors>,
    dispersions: Arc<DispersionModel>,
}

impl FittedModel {
    pub fn gene_ids(&self) -> &[String] {
        &self.gene_ids
    }

    pub fn n_genes(&self) -> usize {
        self.gene_ids.len()
    }

    /// Full-model coefficient names
    pub fn coef_names(&self) -> &[String] {
        &self.coef_names
    }

    pub fn coef_index(&self, name: &str) -> Option<usize> {
        self.coef_names.iter().position(|c| c == name)
    }

    /// Full-model coefficients (genes x coefficients, natural log scale)
    pub fn coefficients(&self) -> ArrayView2<'_, f64> {
        self.coefficients.view()
    }

    pub fn standard_errors(&self) -> ArrayView2<'_, f64> {
        self.standard_errors.view()
    }

    /// Coefficient covariance of one gene
    pub fn covariance(&self, gene_idx: usize) -> ArrayView2<'_, f64> {
        self.covariances.index_axis(ndarray::Axis(0), gene_idx)
    }

    pub fn full_deviance(&self) -> ArrayView1<'_, f64> {
        self.full_deviance.view()
    }

    pub fn reduced_deviance(&self) -> ArrayView1<'_, f64> {
        self.reduced_deviance.view()
    }

    pub fn full_status(&self) -> &[FitStatus] {
        &self.full_status
    }

    pub fn reduced_status(&self) -> &[FitStatus] {
        &self.reduced_status
    }

    /// Parameter count difference between full and reduced designs
    pub fn df(&self) -> usize {
        self.full_coefs - self.reduced_coefs
    }

    pub fn size_factors(&self) -> &Arc<SizeFactors> {
        &self.size_factors
    }

    pub fn dispersions(&self) -> &Arc<DispersionModel> {
        &self.dispersions
    }
}

struct GeneOutcome {
    full: Option<GeneFit>,
    reduced: Option<GeneFit>,
}

fn status(fit: &Option<GeneFit>) -> FitStatus {
    match fit {
        None => FitStatus::AllZero,
        Some(f) if f.converged => FitStatus::Converged,
        Some(_) => FitStatus::DidNotConverge,
    }
}

/// Fit the full and reduced designs to every gene on `pool`.
///
/// Each gene is fitted independently with its final dispersion; a gene that
/// fails to converge is recorded and never aborts the batch.
pub fn fit_models(
    counts: &CountMatrix,
    size_factors: Arc<SizeFactors>,
    dispersions: Arc<DispersionModel>,
    full: &ModelMatrix,
    reduced: &ModelMatrix,
    params: &GlmFitParams,
    pool: &rayon::ThreadPool,
) -> Result<FittedModel> {
    let n_genes = counts.n_genes();
    let n_samples = counts.n_samples();
    if full.n_samples() != n_samples || reduced.n_samples() != n_samples || size_factors.len() != n_samples {
        return Err(DiffExprError::DimensionMismatch {
            expected: format!("{} samples in design and size factors", n_samples),
            got: format!(
                "full {}, reduced {}, size factors {}",
                full.n_samples(),
                reduced.n_samples(),
                size_factors.len()
            ),
        });
    }
    if dispersions.n_genes() != n_genes {
        return Err(DiffExprError::DimensionMismatch {
            expected: format!("{} dispersions", n_genes),
            got: format!("{} dispersions", dispersions.n_genes()),
        });
    }
    if reduced.n_coefs() > full.n_coefs() {
        return Err(DiffExprError::InvalidDesign {
            reason: "reduced design has more coefficients than the full design".to_string(),
        });
    }

    log::info!("Fitting negative binomial GLMs for {} genes", n_genes);
    let sf = size_factors.values();
    let outcomes: Vec<GeneOutcome> = pool.install(|| {
        (0..n_genes)
            .into_par_iter()
            .map(|i| {
                let alpha = dispersions.dispersion(i);
                if !alpha.is_finite() {
                    return GeneOutcome { full: None, reduced: None };
                }
                let y = counts.gene_counts(i);
                GeneOutcome {
                    full: Some(fit_gene(y, full.matrix(), sf, alpha, params)),
                    reduced: Some(fit_gene(y, reduced.matrix(), sf, alpha, params)),
                }
            })
            .collect()
    });

    let p = full.n_coefs();
    let mut coefficients = Array2::from_elem((n_genes, p), f64::NAN);
    let mut standard_errors = Array2::from_elem((n_genes, p), f64::NAN);
    let mut covariances = Array3::from_elem((n_genes, p, p), f64::NAN);
    let mut full_deviance = Array1::from_elem(n_genes, f64::NAN);
    let mut reduced_deviance = Array1::from_elem(n_genes, f64::NAN);
    let mut full_status = Vec::with_capacity(n_genes);
    let mut reduced_status = Vec::with_capacity(n_genes);

    for (i, outcome) in outcomes.into_iter().enumerate() {
        let fs = status(&outcome.full);
        let rs = status(&outcome.reduced);
        if let (FitStatus::Converged, Some(fit)) = (fs, outcome.full) {
            for j in 0..p {
                coefficients[[i, j]] = fit.coefficients[j];
                standard_errors[[i, j]] = fit.standard_errors[j];
            }
            covariances.index_axis_mut(ndarray::Axis(0), i).assign(&fit.covariance);
            full_deviance[i] = fit.deviance;
        }
        if let (FitStatus::Converged, Some(fit)) = (rs, outcome.reduced) {
            reduced_deviance[i] = fit.deviance;
        }
        full_status.push(fs);
        reduced_status.push(rs);
    }

    let failed_full = full_status.iter().filter(|s| **s == FitStatus::DidNotConverge).count();
    let failed_reduced = reduced_status.iter().filter(|s| **s == FitStatus::DidNotConverge).count();
    if failed_full + failed_reduced > 0 {
        log::warn!(
            "{} gene(s) did not converge under the full design and {} under the reduced design; their statistics are missing",
            failed_full,
            failed_reduced
        );
    }

    Ok(FittedModel {
        gene_ids: counts.gene_ids().to_vec(),
        coef_names: full.coef_names().to_vec(),
        coefficients,
        standard_errors,
        covariances,
        full_deviance,
        reduced_deviance,
        full_status,
        reduced_status,
        full_coefs: full.n_coefs(),
        reduced_coefs: reduced.n_coefs(),
        size_factors,
        dispersions,
    })
}
