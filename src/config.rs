//! Analysis configuration
//!
//! Every field has a default so a configuration file only needs to name what
//! it changes. Loaded from JSON with serde.

use std::collections::BTreeMap;
use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::data::CovariateSchema;
use crate::dispersion::DispersionParams;
use crate::error::{DiffExprError, Result};
use crate::glm::GlmFitParams;
use crate::normalization::SizeFactorMethod;
use crate::testing::ContrastSpec;

/// Complete configuration of one analysis run.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AnalysisConfig {
    /// Full design formula, e.g. `~ batch + condition`.
    pub full_design: String,
    /// Reduced design formula for the likelihood ratio test.
    pub reduced_design: String,
    /// Wald contrasts to report. Empty means every non-intercept coefficient.
    pub contrasts: Vec<ContrastSpec>,
    /// Significance threshold on adjusted p-values.
    pub alpha: f64,
    /// Absolute log2 fold-change cutoffs for the threshold grid.
    pub fold_change_grid: Vec<f64>,
    /// Adjusted p-value cutoffs for the threshold grid.
    pub pvalue_grid: Vec<f64>,
    /// Number of principal components correlated against covariates.
    pub n_correlation_components: usize,
    /// Restrict PCA to the most variable genes.
    pub pca_top_genes: Option<usize>,
    pub size_factor_method: SizeFactorMethod,
    pub dispersion: DispersionParams,
    pub glm: GlmFitParams,
    /// Pseudocount for the log fallback transform.
    pub vst_pseudocount: f64,
    /// Worker threads for per-gene work; 0 lets rayon decide.
    pub threads: usize,
    /// Covariate kinds and level orders used when reading a sample table.
    pub covariates: BTreeMap<String, CovariateSchema>,
}

impl Default for AnalysisConfig {
    fn default() -> Self {
        Self {
            full_design: "~ condition".to_string(),
            reduced_design: "~ 1".to_string(),
            contrasts: Vec::new(),
            alpha: 0.05,
            fold_change_grid: vec![0.0, 1.0, 2.0, 3.0],
            pvalue_grid: vec![0.05, 0.01, 0.001],
            n_correlation_components: 8,
            pca_top_genes: None,
            size_factor_method: SizeFactorMethod::Ratio,
            dispersion: DispersionParams::default(),
            glm: GlmFitParams::default(),
            vst_pseudocount: 1.0,
            threads: 0,
            covariates: BTreeMap::new(),
        }
    }
}

impl AnalysisConfig {
    /// Load a configuration from a JSON file and validate it.
    pub fn from_json_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let text = std::fs::read_to_string(path)?;
        let config: Self = serde_json::from_str(&text)?;
        config.validate()?;
        Ok(config)
    }

    /// Check value ranges. Formula syntax is checked when the design is built.
    pub fn validate(&self) -> Result<()> {
        let invalid = |reason: String| Err(DiffExprError::InvalidConfig { reason });

        if !(self.alpha > 0.0 && self.alpha < 1.0) {
            return invalid(format!("alpha must lie in (0, 1), got {}", self.alpha));
        }
        if self.fold_change_grid.is_empty() || self.pvalue_grid.is_empty() {
            return invalid("threshold grids must not be empty".to_string());
        }
        if let Some(c) = self.fold_change_grid.iter().find(|c| !(c.is_finite() && **c >= 0.0)) {
            return invalid(format!("fold-change cutoff must be finite and >= 0, got {}", c));
        }
        if let Some(p) = self.pvalue_grid.iter().find(|p| !(**p > 0.0 && **p <= 1.0)) {
            return invalid(format!("p-value cutoff must lie in (0, 1], got {}", p));
        }
        if self.n_correlation_components == 0 {
            return invalid("n_correlation_components must be at least 1".to_string());
        }
        if self.pca_top_genes == Some(0) {
            return invalid("pca_top_genes must be at least 1 when set".to_string());
        }
        if !(self.vst_pseudocount > 0.0) {
            return invalid(format!("vst_pseudocount must be > 0, got {}", self.vst_pseudocount));
        }
        if !(self.glm.tolerance > 0.0) || self.glm.max_iter == 0 {
            return invalid("IRLS tolerance must be > 0 and max_iter >= 1".to_string());
        }
        if !(self.dispersion.min_disp > 0.0) || !(self.dispersion.outlier_sd > 0.0) {
            return invalid("min_disp and outlier_sd must be > 0".to_string());
        }
        Ok(())
    }

    /// Thread pool bounding all per-gene parallel work of a run.
    pub fn thread_pool(&self) -> Result<rayon::ThreadPool> {
        rayon::ThreadPoolBuilder::new()
            .num_threads(self.threads)
            .build()
            .map_err(|e| DiffExprError::InvalidConfig {
                reason: format!("could not build thread pool: {}", e),
            })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::NamedTempFile;

    #[test]
    fn test_defaults_are_valid() {
        let config = AnalysisConfig::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.alpha, 0.05);
        assert_eq!(config.n_correlation_components, 8);
        assert_eq!(config.fold_change_grid, vec![0.0, 1.0, 2.0, 3.0]);
    }

    #[test]
    fn test_partial_json_keeps_defaults() {
        let mut file = NamedTempFile::new().unwrap();
        writeln!(
            file,
            r#"{{"full_design": "~ batch + condition", "reduced_design": "~ batch", "alpha": 0.1, "threads": 2}}"#
        )
        .unwrap();

        let config = AnalysisConfig::from_json_file(file.path()).unwrap();
        assert_eq!(config.full_design, "~ batch + condition");
        assert_eq!(config.reduced_design, "~ batch");
        assert_eq!(config.alpha, 0.1);
        assert_eq!(config.threads, 2);
        assert_eq!(config.pvalue_grid, vec![0.05, 0.01, 0.001]);
        assert_eq!(config.glm.max_iter, 100);
    }

    #[test]
    fn test_invalid_alpha_rejected() {
        let config = AnalysisConfig {
            alpha: 1.5,
            ..AnalysisConfig::default()
        };
        assert!(matches!(config.validate(), Err(DiffExprError::InvalidConfig { .. })));
    }

    #[test]
    fn test_thread_pool_size() {
        let config = AnalysisConfig {
            threads: 3,
            ..AnalysisConfig::default()
        };
        let pool = config.thread_pool().unwrap();
        assert_eq!(pool.current_num_threads(), 3);
    }
}
