//! Contrast specifications and their resolution to coefficient weights

use serde::{Deserialize, Serialize};

use crate::data::SampleMetadata;
use crate::error::{DiffExprError, Result};

/// A linear combination of full-model coefficients to test.
///
/// In configuration files contrasts are tagged by `type`:
///
/// ```json
/// { "type": "levels", "covariate": "condition", "numerator": "treated", "denominator": "control" }
/// ```
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ContrastSpec {
    /// A single coefficient by name
    Coefficient { name: String },
    /// Two levels of one categorical covariate; either may be the reference
    Levels {
        covariate: String,
        numerator: String,
        denominator: String,
    },
    /// Explicit weights, one per coefficient
    Numeric {
        #[serde(default)]
        name: Option<String>,
        weights: Vec<f64>,
    },
    /// Sum of numerator coefficients minus sum of denominator coefficients
    List {
        numerator: Vec<String>,
        #[serde(default)]
        denominator: Vec<String>,
    },
}

/// A contrast resolved against a coefficient layout.
#[derive(Debug, Clone, PartialEq)]
pub struct ResolvedContrast {
    pub name: String,
    pub weights: Vec<f64>,
}

fn coef_position(coef_names: &[String], name: &str) -> Result<usize> {
    coef_names
        .iter()
        .position(|c| c == name)
        .ok_or_else(|| DiffExprError::InvalidContrast {
            reason: format!("coefficient '{}' not found; available: {}", name, coef_names.join(", ")),
        })
}

impl ContrastSpec {
    pub fn coefficient(name: &str) -> Self {
        ContrastSpec::Coefficient { name: name.to_string() }
    }

    pub fn levels(covariate: &str, numerator: &str, denominator: &str) -> Self {
        ContrastSpec::Levels {
            covariate: covariate.to_string(),
            numerator: numerator.to_string(),
            denominator: denominator.to_string(),
        }
    }

    /// Resolve to a weight vector over `coef_names`.
    pub fn resolve(&self, coef_names: &[String], metadata: &SampleMetadata) -> Result<ResolvedContrast> {
        let p = coef_names.len();
        match self {
            ContrastSpec::Coefficient { name } => {
                let mut weights = vec![0.0; p];
                weights[coef_position(coef_names, name)?] = 1.0;
                Ok(ResolvedContrast {
                    name: name.clone(),
                    weights,
                })
            }
            ContrastSpec::Levels {
                covariate,
                numerator,
                denominator,
            } => {
                let levels = metadata
                    .covariate(covariate)
                    .and_then(|c| c.levels())
                    .ok_or_else(|| DiffExprError::InvalidContrast {
                        reason: format!("'{}' is not a categorical covariate", covariate),
                    })?;
                for level in [numerator, denominator] {
                    if !levels.contains(level) {
                        return Err(DiffExprError::InvalidContrast {
                            reason: format!("'{}' is not a level of '{}'", level, covariate),
                        });
                    }
                }
                if numerator == denominator {
                    return Err(DiffExprError::InvalidContrast {
                        reason: format!("contrast compares level '{}' with itself", numerator),
                    });
                }

                let reference = &levels[0];
                let column = |level: &str| coef_position(coef_names, &format!("{}_{}_vs_{}", covariate, level, reference));
                let mut weights = vec![0.0; p];
                if numerator != reference {
                    weights[column(numerator)?] += 1.0;
                }
                if denominator != reference {
                    weights[column(denominator)?] -= 1.0;
                }
                Ok(ResolvedContrast {
                    name: format!("{}_{}_vs_{}", covariate, numerator, denominator),
                    weights,
                })
            }
            ContrastSpec::Numeric { name, weights } => {
                if weights.len() != p {
                    return Err(DiffExprError::InvalidContrast {
                        reason: format!("{} contrast weights for {} coefficients", weights.len(), p),
                    });
                }
                if weights.iter().any(|w| !w.is_finite()) || weights.iter().all(|w| *w == 0.0) {
                    return Err(DiffExprError::InvalidContrast {
                        reason: "contrast weights must be finite and not all zero".to_string(),
                    });
                }
                let name = name.clone().unwrap_or_else(|| {
                    let parts: Vec<String> = weights.iter().map(|w| w.to_string()).collect();
                    format!("contrast[{}]", parts.join(","))
                });
                Ok(ResolvedContrast {
                    name,
                    weights: weights.clone(),
                })
            }
            ContrastSpec::List { numerator, denominator } => {
                if numerator.is_empty() && denominator.is_empty() {
                    return Err(DiffExprError::InvalidContrast {
                        reason: "list contrast names no coefficients".to_string(),
                    });
                }
                let mut weights = vec![0.0; p];
                for name in numerator {
                    weights[coef_position(coef_names, name)?] += 1.0;
                }
                for name in denominator {
                    weights[coef_position(coef_names, name)?] -= 1.0;
                }
                let name = if denominator.is_empty() {
                    numerator.join("+")
                } else {
                    format!("({})-({})", numerator.join("+"), denominator.join("+"))
                };
                Ok(ResolvedContrast { name, weights })
            }
        }
    }
}
