//! Sample metadata with an explicit covariate schema

use std::collections::{HashMap, HashSet};

use serde::{Deserialize, Serialize};

use crate::error::{DiffExprError, Result};

/// Kind of a covariate column.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CovariateKind {
    Categorical,
    Numeric,
}

/// Declared schema for one covariate column of a sample table.
///
/// For categorical covariates `levels` fixes the level order and the first
/// level is the reference. Without it, levels are taken in order of first
/// appearance.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CovariateSchema {
    pub kind: CovariateKind,
    #[serde(default)]
    pub levels: Option<Vec<String>>,
}

/// Values of one covariate across samples.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum CovariateValues {
    /// `codes[i]` indexes into `levels`; `levels[0]` is the reference.
    Categorical { levels: Vec<String>, codes: Vec<usize> },
    Numeric(Vec<f64>),
}

/// A named covariate column.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Covariate {
    pub name: String,
    pub values: CovariateValues,
}

impl Covariate {
    pub fn is_categorical(&self) -> bool {
        matches!(self.values, CovariateValues::Categorical { .. })
    }

    /// Declared levels, reference first. `None` for numeric covariates.
    pub fn levels(&self) -> Option<&[String]> {
        match &self.values {
            CovariateValues::Categorical { levels, .. } => Some(levels),
            CovariateValues::Numeric(_) => None,
        }
    }

    pub fn reference_level(&self) -> Option<&str> {
        self.levels().and_then(|l| l.first()).map(String::as_str)
    }

    /// Ordinal surrogate used for correlations: the level index for
    /// categorical covariates, the value itself for numeric ones.
    pub fn ordinal(&self) -> Vec<f64> {
        match &self.values {
            CovariateValues::Categorical { codes, .. } => codes.iter().map(|&c| c as f64).collect(),
            CovariateValues::Numeric(values) => values.clone(),
        }
    }

    fn len(&self) -> usize {
        match &self.values {
            CovariateValues::Categorical { codes, .. } => codes.len(),
            CovariateValues::Numeric(values) => values.len(),
        }
    }

    fn select(&self, indices: &[usize]) -> Self {
        let values = match &self.values {
            CovariateValues::Categorical { levels, codes } => CovariateValues::Categorical {
                levels: levels.clone(),
                codes: indices.iter().map(|&i| codes[i]).collect(),
            },
            CovariateValues::Numeric(values) => {
                CovariateValues::Numeric(indices.iter().map(|&i| values[i]).collect())
            }
        };
        Self {
            name: self.name.clone(),
            values,
        }
    }
}

/// Per-sample covariates, in the order they were declared.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SampleMetadata {
    sample_ids: Vec<String>,
    covariates: Vec<Covariate>,
}

impl SampleMetadata {
    /// Create metadata for the given samples. Sample identifiers must be unique.
    pub fn new(sample_ids: Vec<String>) -> Result<Self> {
        let mut seen = HashSet::new();
        for id in &sample_ids {
            if !seen.insert(id.as_str()) {
                return Err(DiffExprError::InvalidMetadata {
                    reason: format!("duplicate sample ID '{}'", id),
                });
            }
        }
        Ok(Self {
            sample_ids,
            covariates: Vec::new(),
        })
    }

    fn check_new_column(&self, name: &str, len: usize) -> Result<()> {
        if len != self.sample_ids.len() {
            return Err(DiffExprError::DimensionMismatch {
                expected: format!("{} values for '{}'", self.sample_ids.len(), name),
                got: format!("{} values", len),
            });
        }
        if self.covariate(name).is_some() {
            return Err(DiffExprError::InvalidMetadata {
                reason: format!("covariate '{}' declared twice", name),
            });
        }
        Ok(())
    }

    /// Add a categorical covariate.
    ///
    /// With `levels` given, every value must be one of them. Without it, the
    /// level order is the order of first appearance.
    pub fn add_categorical(&mut self, name: &str, values: Vec<String>, levels: Option<Vec<String>>) -> Result<()> {
        self.check_new_column(name, values.len())?;

        let levels = match levels {
            Some(levels) => {
                let unique: HashSet<&String> = levels.iter().collect();
                if levels.is_empty() || unique.len() != levels.len() {
                    return Err(DiffExprError::InvalidMetadata {
                        reason: format!("levels of '{}' must be non-empty and unique", name),
                    });
                }
                levels
            }
            None => {
                let mut levels: Vec<String> = Vec::new();
                for v in &values {
                    if !levels.contains(v) {
                        levels.push(v.clone());
                    }
                }
                levels
            }
        };

        let index: HashMap<&str, usize> = levels.iter().enumerate().map(|(i, l)| (l.as_str(), i)).collect();
        let codes = values
            .iter()
            .map(|v| {
                index.get(v.as_str()).copied().ok_or_else(|| DiffExprError::InvalidMetadata {
                    reason: format!("value '{}' of '{}' is not a declared level {:?}", v, name, levels),
                })
            })
            .collect::<Result<Vec<usize>>>()?;

        self.covariates.push(Covariate {
            name: name.to_string(),
            values: CovariateValues::Categorical { levels, codes },
        });
        Ok(())
    }

    /// Add a numeric covariate
    pub fn add_numeric(&mut self, name: &str, values: Vec<f64>) -> Result<()> {
        self.check_new_column(name, values.len())?;
        if values.iter().any(|v| !v.is_finite()) {
            return Err(DiffExprError::InvalidMetadata {
                reason: format!("numeric covariate '{}' contains non-finite values", name),
            });
        }
        self.covariates.push(Covariate {
            name: name.to_string(),
            values: CovariateValues::Numeric(values),
        });
        Ok(())
    }

    pub fn covariate(&self, name: &str) -> Option<&Covariate> {
        self.covariates.iter().find(|c| c.name == name)
    }

    pub fn covariates(&self) -> &[Covariate] {
        &self.covariates
    }

    pub fn sample_ids(&self) -> &[String] {
        &self.sample_ids
    }

    pub fn n_samples(&self) -> usize {
        self.sample_ids.len()
    }

    /// Reorder records to match `sample_ids` (count-matrix column order).
    ///
    /// Both sides must contain exactly the same samples.
    pub fn aligned_to(&self, sample_ids: &[String]) -> Result<Self> {
        if sample_ids.len() != self.sample_ids.len() {
            return Err(DiffExprError::DimensionMismatch {
                expected: format!("{} samples in metadata", sample_ids.len()),
                got: format!("{} samples", self.sample_ids.len()),
            });
        }
        let position: HashMap<&str, usize> =
            self.sample_ids.iter().enumerate().map(|(i, s)| (s.as_str(), i)).collect();
        let order = sample_ids
            .iter()
            .map(|id| {
                position.get(id.as_str()).copied().ok_or_else(|| DiffExprError::InvalidMetadata {
                    reason: format!("sample '{}' has no metadata record", id),
                })
            })
            .collect::<Result<Vec<usize>>>()?;

        debug_assert!(self.covariates.iter().all(|c| c.len() == order.len()));
        Ok(Self {
            sample_ids: sample_ids.to_vec(),
            covariates: self.covariates.iter().map(|c| c.select(&order)).collect(),
        })
    }
}
