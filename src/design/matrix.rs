//! Model matrix construction with treatment contrasts

use std::ops::Range;

use ndarray::Array2;

use super::formula::{Formula, Term};
use crate::data::{Covariate, CovariateValues, SampleMetadata};
use crate::error::{DiffExprError, Result};
use crate::linalg::qr_rank;

/// Numeric design matrix (samples x coefficients) with coefficient names.
///
/// Column 0 is always the intercept. Categorical covariates contribute one
/// indicator column per non-reference level, named
/// `<covariate>_<level>_vs_<reference>`; numeric covariates contribute one
/// column named after the covariate. Interaction columns are element-wise
/// products named by joining their parts with `.`.
#[derive(Debug, Clone)]
pub struct ModelMatrix {
    matrix: Array2<f64>,
    coef_names: Vec<String>,
    term_columns: Vec<(Term, Range<usize>)>,
}

struct Column {
    name_parts: Vec<String>,
    values: Vec<f64>,
}

/// Columns one covariate contributes to a term.
fn covariate_block(cov: &Covariate, in_interaction: bool) -> Result<Vec<Column>> {
    match &cov.values {
        CovariateValues::Categorical { levels, codes } => {
            if levels.len() < 2 {
                return Err(DiffExprError::InvalidDesign {
                    reason: format!("covariate '{}' has a single level and cannot enter the design", cov.name),
                });
            }
            let reference = &levels[0];
            Ok(levels
                .iter()
                .enumerate()
                .skip(1)
                .map(|(li, level)| Column {
                    name_parts: vec![if in_interaction {
                        format!("{}{}", cov.name, level)
                    } else {
                        format!("{}_{}_vs_{}", cov.name, level, reference)
                    }],
                    values: codes.iter().map(|&c| if c == li { 1.0 } else { 0.0 }).collect(),
                })
                .collect())
        }
        CovariateValues::Numeric(values) => Ok(vec![Column {
            name_parts: vec![cov.name.clone()],
            values: values.clone(),
        }]),
    }
}

impl ModelMatrix {
    /// Build the model matrix of `formula` over `metadata` and check it has
    /// full column rank.
    pub fn build(formula: &Formula, metadata: &SampleMetadata) -> Result<Self> {
        let n = metadata.n_samples();
        if n == 0 {
            return Err(DiffExprError::InvalidDesign {
                reason: "no samples to build a design matrix from".to_string(),
            });
        }

        let mut columns = vec![Column {
            name_parts: vec!["Intercept".to_string()],
            values: vec![1.0; n],
        }];
        let mut term_columns = Vec::with_capacity(formula.terms().len());

        for term in formula.terms() {
            let mut block = vec![Column {
                name_parts: Vec::new(),
                values: vec![1.0; n],
            }];
            for factor in term.factors() {
                let cov = metadata.covariate(factor).ok_or_else(|| DiffExprError::InvalidDesign {
                    reason: format!("formula '{}' references unknown covariate '{}'", formula, factor),
                })?;
                let part = covariate_block(cov, term.is_interaction())?;
                block = block
                    .iter()
                    .flat_map(|left| {
                        part.iter().map(move |right| Column {
                            name_parts: left.name_parts.iter().chain(right.name_parts.iter()).cloned().collect(),
                            values: left.values.iter().zip(right.values.iter()).map(|(a, b)| a * b).collect(),
                        })
                    })
                    .collect();
            }
            let start = columns.len();
            columns.extend(block);
            term_columns.push((term.clone(), start..columns.len()));
        }

        let p = columns.len();
        let mut matrix = Array2::<f64>::zeros((n, p));
        for (j, col) in columns.iter().enumerate() {
            for (i, &v) in col.values.iter().enumerate() {
                matrix[[i, j]] = v;
            }
        }
        check_full_rank(&matrix)?;

        Ok(Self {
            matrix,
            coef_names: columns.into_iter().map(|c| c.name_parts.join(".")).collect(),
            term_columns,
        })
    }

    pub fn matrix(&self) -> &Array2<f64> {
        &self.matrix
    }

    pub fn coef_names(&self) -> &[String] {
        &self.coef_names
    }

    pub fn n_coefs(&self) -> usize {
        self.matrix.ncols()
    }

    pub fn n_samples(&self) -> usize {
        self.matrix.nrows()
    }

    pub fn coef_index(&self, name: &str) -> Option<usize> {
        self.coef_names.iter().position(|c| c == name)
    }

    /// Column range a term occupies.
    pub fn term_columns(&self, term: &Term) -> Option<Range<usize>> {
        self.term_columns
            .iter()
            .find(|(t, _)| t == term)
            .map(|(_, r)| r.clone())
    }
}

/// Reject a model matrix that is not of full column rank.
///
/// The error message distinguishes empty level combinations (a column of
/// zeros) from linearly dependent terms.
pub fn check_full_rank(matrix: &Array2<f64>) -> Result<()> {
    let ncol = matrix.ncols();
    if matrix.nrows() == 0 || ncol == 0 {
        return Err(DiffExprError::InvalidDesign {
            reason: "design matrix has zero rows or columns".to_string(),
        });
    }

    if qr_rank(matrix) < ncol {
        let has_zero_column = (0..ncol).any(|j| matrix.column(j).iter().all(|&v| v == 0.0));
        let reason = if has_zero_column {
            "the model matrix is not full rank: levels or combinations of levels without any samples \
             produce column(s) of zeros"
        } else {
            "the model matrix is not full rank: one or more terms are linear combinations of the others"
        };
        return Err(DiffExprError::InvalidDesign {
            reason: reason.to_string(),
        });
    }
    Ok(())
}
