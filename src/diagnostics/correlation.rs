//! Rank correlation between sample covariates and principal components

use ndarray::Array2;

use super::pca::PcaResult;
use crate::data::SampleMetadata;
use crate::error::{DiffExprError, Result};
use crate::stats::spearman;

/// Spearman correlation of each covariate with each leading component.
#[derive(Debug, Clone)]
pub struct CovariateCorrelation {
    pub covariates: Vec<String>,
    pub components: Vec<String>,
    /// Covariates x components; NaN where a series is constant
    pub values: Array2<f64>,
}

impl CovariateCorrelation {
    pub fn get(&self, covariate: &str, component: usize) -> Option<f64> {
        let row = self.covariates.iter().position(|c| c == covariate)?;
        self.values.get([row, component]).copied()
    }
}

/// Correlate every covariate with the first `n_components` components.
///
/// Categorical covariates enter through their level index in declared order,
/// numeric covariates through their values. Ties get average ranks.
/// `n_components` is capped by the number of available components.
pub fn covariate_correlations(
    metadata: &SampleMetadata,
    pca: &PcaResult,
    n_components: usize,
) -> Result<CovariateCorrelation> {
    if n_components == 0 {
        return Err(DiffExprError::InvalidConfig {
            reason: "at least one component is needed for covariate correlation".to_string(),
        });
    }
    let metadata = metadata.aligned_to(&pca.sample_ids)?;
    let k = n_components.min(pca.n_components());
    if k < n_components {
        log::debug!("Only {} component(s) available for covariate correlation", k);
    }

    let covariates = metadata.covariates();
    let mut values = Array2::from_elem((covariates.len(), k), f64::NAN);
    for (ci, covariate) in covariates.iter().enumerate() {
        let surrogate = covariate.ordinal();
        for pc in 0..k {
            let scores = pca.coordinates.column(pc).to_vec();
            values[[ci, pc]] = spearman(&surrogate, &scores);
        }
    }

    Ok(CovariateCorrelation {
        covariates: covariates.iter().map(|c| c.name.clone()).collect(),
        components: (1..=k).map(|i| format!("PC{}", i)).collect(),
        values,
    })
}
