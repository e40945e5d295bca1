//! Statistical testing for differential expression
//!
//! Each comparison is either a Wald test of one contrast or the likelihood
//! ratio test of the full against the reduced design. Benjamini-Hochberg
//! correction runs within each comparison.

mod contrast;
mod fdr;
mod lrt;
mod pvalue;
mod wald;

pub use contrast::{ContrastSpec, ResolvedContrast};
pub use fdr::benjamini_hochberg;
pub use lrt::likelihood_ratio_test;
pub use pvalue::{chi_squared_pvalue, normal_pvalue};
pub use wald::{default_contrasts, wald_test};

use serde::{Deserialize, Serialize};

use crate::data::SampleMetadata;
use crate::error::Result;
use crate::glm::FittedModel;

/// Kind of test behind a comparison.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TestKind {
    Wald,
    Lrt,
}

impl std::fmt::Display for TestKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            TestKind::Wald => write!(f, "wald"),
            TestKind::Lrt => write!(f, "lrt"),
        }
    }
}

/// Per-gene results of one comparison. Missing values are NaN.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ComparisonResult {
    pub name: String,
    pub kind: TestKind,
    pub gene_ids: Vec<String>,
    /// Log2 fold change
    pub estimate: Vec<f64>,
    /// Standard error of the log2 fold change
    pub std_error: Vec<f64>,
    /// Wald z or LRT chi-squared statistic
    pub statistic: Vec<f64>,
    pub pvalue: Vec<f64>,
    /// Benjamini-Hochberg adjusted p-values
    pub padj: Vec<f64>,
}

impl ComparisonResult {
    fn new(name: String, kind: TestKind, gene_ids: Vec<String>) -> Self {
        let n = gene_ids.len();
        Self {
            name,
            kind,
            gene_ids,
            estimate: vec![f64::NAN; n],
            std_error: vec![f64::NAN; n],
            statistic: vec![f64::NAN; n],
            pvalue: vec![f64::NAN; n],
            padj: vec![f64::NAN; n],
        }
    }

    pub fn n_genes(&self) -> usize {
        self.gene_ids.len()
    }

    /// Genes with `padj < alpha`
    pub fn significant_genes(&self, alpha: f64) -> Vec<&str> {
        self.gene_ids
            .iter()
            .zip(self.padj.iter())
            .filter(|(_, &p)| p < alpha)
            .map(|(id, _)| id.as_str())
            .collect()
    }

    /// Genes with a finite raw p-value
    pub fn n_tested(&self) -> usize {
        self.pvalue.iter().filter(|p| p.is_finite()).count()
    }

    fn adjust(&mut self) {
        self.padj = benjamini_hochberg(&self.pvalue);
    }
}

/// Likelihood ratio test followed by one Wald test per contrast.
///
/// An empty contrast list tests every non-intercept coefficient.
pub fn run_tests(model: &FittedModel, contrasts: &[ContrastSpec], metadata: &SampleMetadata) -> Result<Vec<ComparisonResult>> {
    let contrasts = if contrasts.is_empty() {
        default_contrasts(model)
    } else {
        contrasts.to_vec()
    };

    let mut results = Vec::with_capacity(contrasts.len() + 1);
    results.push(likelihood_ratio_test(model));
    for contrast in &contrasts {
        let resolved = contrast.resolve(model.coef_names(), metadata)?;
        results.push(wald_test(model, &resolved)?);
    }
    Ok(results)
}
