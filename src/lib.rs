//! diffexpr: differential gene expression from RNA-seq read counts
//!
//! Size-factor normalization, negative binomial GLMs with empirical-Bayes
//! dispersion shrinkage, Wald and likelihood ratio tests with
//! Benjamini-Hochberg correction, a variance-stabilizing transform, PCA
//! diagnostics and summaries across comparisons.
//!
//! # Example
//!
//! ```ignore
//! use diffexpr::prelude::*;
//!
//! let config = AnalysisConfig::from_json_file("analysis.json")?;
//! let counts = read_count_table("counts.tsv")?;
//! let metadata = read_sample_table("samples.tsv", &config.covariates)?;
//!
//! let analysis = run_analysis(counts, &metadata, &config)?;
//! for summary in analysis.summarize(&config) {
//!     println!("{}: {:?}", summary.comparison, summary.counts());
//! }
//! ```

pub mod cli;
pub mod config;
pub mod data;
pub mod design;
pub mod diagnostics;
pub mod dispersion;
pub mod error;
pub mod glm;
pub mod io;
pub mod linalg;
pub mod normalization;
pub mod stats;
pub mod summary;
pub mod testing;
pub mod transform;

/// Prelude module for convenient imports
pub mod prelude {
    pub use crate::config::AnalysisConfig;
    pub use crate::data::{CountMatrix, CovariateKind, CovariateSchema, SampleMetadata};
    pub use crate::design::{DesignSpecification, Formula, ModelMatrix};
    pub use crate::diagnostics::{covariate_correlations, principal_components, CovariateCorrelation, PcaParams, PcaResult};
    pub use crate::dispersion::{estimate_dispersions, DispersionModel, DispersionParams};
    pub use crate::error::{DiffExprError, Result};
    pub use crate::glm::{fit_models, FitStatus, FittedModel, GlmFitParams};
    pub use crate::io::{read_count_table, read_sample_table};
    pub use crate::normalization::{estimate_size_factors, SizeFactorMethod, SizeFactors};
    pub use crate::summary::{classify, DESummary, Direction, OverlapSet, Regulation, ThresholdGrid};
    pub use crate::testing::{benjamini_hochberg, run_tests, ComparisonResult, ContrastSpec, TestKind};
    pub use crate::transform::{relative_log_expression, variance_stabilize, RleMatrix, TransformKind, TransformedMatrix};
    pub use crate::{run_analysis, run_analysis_with_size_factors, Analysis};
}

use std::sync::Arc;

use prelude::*;

/// A fitted and tested analysis. Everything downstream of fitting reads from
/// it and never feeds back.
#[derive(Debug, Clone)]
pub struct Analysis {
    pub counts: CountMatrix,
    /// Metadata in count-matrix column order
    pub metadata: SampleMetadata,
    pub design: DesignSpecification,
    pub size_factors: Arc<SizeFactors>,
    pub dispersions: Arc<DispersionModel>,
    pub model: FittedModel,
    /// Likelihood ratio test first, then one Wald test per contrast
    pub results: Vec<ComparisonResult>,
}

/// Run normalization, dispersion estimation, model fitting and testing.
pub fn run_analysis(counts: CountMatrix, metadata: &SampleMetadata, config: &AnalysisConfig) -> Result<Analysis> {
    run(counts, metadata, None, config)
}

/// [`run_analysis`] with externally supplied size factors.
pub fn run_analysis_with_size_factors(
    counts: CountMatrix,
    metadata: &SampleMetadata,
    size_factors: SizeFactors,
    config: &AnalysisConfig,
) -> Result<Analysis> {
    run(counts, metadata, Some(size_factors), config)
}

fn run(
    counts: CountMatrix,
    metadata: &SampleMetadata,
    size_factors: Option<SizeFactors>,
    config: &AnalysisConfig,
) -> Result<Analysis> {
    config.validate()?;
    let metadata = metadata.aligned_to(counts.sample_ids())?;
    let design = DesignSpecification::new(&config.full_design, &config.reduced_design, &metadata)?;
    let (full, reduced) = design.model_matrices(&metadata)?;
    let pool = config.thread_pool()?;

    let size_factors = match size_factors {
        Some(sf) if sf.len() != counts.n_samples() => {
            return Err(DiffExprError::DimensionMismatch {
                expected: format!("{} size factors", counts.n_samples()),
                got: format!("{} size factors", sf.len()),
            })
        }
        Some(sf) => sf,
        None => estimate_size_factors(&counts, config.size_factor_method)?,
    };
    let size_factors = Arc::new(size_factors);

    let dispersions = Arc::new(estimate_dispersions(
        &counts,
        &size_factors,
        &full,
        &config.dispersion,
        &pool,
    )?);

    let model = fit_models(
        &counts,
        Arc::clone(&size_factors),
        Arc::clone(&dispersions),
        &full,
        &reduced,
        &config.glm,
        &pool,
    )?;

    let results = run_tests(&model, &config.contrasts, &metadata)?;
    for r in &results {
        log::info!(
            "{}: {} of {} tested genes with padj < {}",
            r.name,
            r.significant_genes(config.alpha).len(),
            r.n_tested(),
            config.alpha
        );
    }

    Ok(Analysis {
        counts,
        metadata,
        design,
        size_factors,
        dispersions,
        model,
        results,
    })
}

impl Analysis {
    pub fn result(&self, name: &str) -> Option<&ComparisonResult> {
        self.results.iter().find(|r| r.name == name)
    }

    /// Variance-stabilized counts, or the log fallback without a trend.
    pub fn transform(&self, config: &AnalysisConfig) -> Result<TransformedMatrix> {
        variance_stabilize(&self.counts, &self.size_factors, &self.dispersions, config.vst_pseudocount)
    }

    /// PCA of transformed counts and covariate correlations with the leading
    /// components.
    pub fn diagnostics(
        &self,
        transformed: &TransformedMatrix,
        config: &AnalysisConfig,
    ) -> Result<(PcaResult, CovariateCorrelation)> {
        let params = PcaParams {
            top_genes: config.pca_top_genes,
        };
        let pca = principal_components(transformed, &params)?;
        let correlation = covariate_correlations(&self.metadata, &pca, config.n_correlation_components)?;
        Ok((pca, correlation))
    }

    /// Calls at `config.alpha` and threshold-grid counts per comparison.
    pub fn summarize(&self, config: &AnalysisConfig) -> Vec<DESummary> {
        self.results
            .iter()
            .map(|r| DESummary::new(r, config.alpha, &config.fold_change_grid, &config.pvalue_grid))
            .collect()
    }

    /// Significant-gene sets of every comparison at `config.alpha`.
    pub fn overlap(&self, config: &AnalysisConfig, direction: Direction) -> Result<OverlapSet> {
        OverlapSet::new(&self.results, config.alpha, direction)
    }
}
