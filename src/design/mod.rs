//! Design formulas and model matrices

mod formula;
mod matrix;

pub use formula::{Formula, Term};
pub use matrix::{check_full_rank, ModelMatrix};

use crate::data::SampleMetadata;
use crate::error::{DiffExprError, Result};

/// Full and reduced design of an analysis, validated against the metadata.
#[derive(Debug, Clone)]
pub struct DesignSpecification {
    full: Formula,
    reduced: Formula,
}

impl DesignSpecification {
    /// Parse both formulas and check them before any fitting happens.
    ///
    /// Every referenced covariate must exist and every reduced term must
    /// also appear in the full design.
    pub fn new(full: &str, reduced: &str, metadata: &SampleMetadata) -> Result<Self> {
        let full = Formula::parse(full)?;
        let reduced = Formula::parse(reduced)?;

        for formula in [&full, &reduced] {
            if let Some(missing) = formula.covariates().into_iter().find(|c| metadata.covariate(c).is_none()) {
                return Err(DiffExprError::InvalidDesign {
                    reason: format!("formula '{}' references unknown covariate '{}'", formula, missing),
                });
            }
        }

        if !reduced.is_subset_of(&full) {
            let extra: Vec<String> = reduced
                .terms()
                .iter()
                .filter(|t| !full.contains(t))
                .map(|t| t.to_string())
                .collect();
            return Err(DiffExprError::InvalidDesign {
                reason: format!(
                    "reduced design '{}' is not nested in full design '{}' (extra terms: {})",
                    reduced,
                    full,
                    extra.join(", ")
                ),
            });
        }

        if reduced.terms().len() == full.terms().len() {
            log::warn!(
                "Reduced design '{}' equals the full design; the likelihood ratio test has no degrees of freedom",
                reduced
            );
        }

        Ok(Self { full, reduced })
    }

    pub fn full(&self) -> &Formula {
        &self.full
    }

    pub fn reduced(&self) -> &Formula {
        &self.reduced
    }

    /// Build the full and reduced model matrices.
    pub fn model_matrices(&self, metadata: &SampleMetadata) -> Result<(ModelMatrix, ModelMatrix)> {
        let full = ModelMatrix::build(&self.full, metadata)?;
        let reduced = ModelMatrix::build(&self.reduced, metadata)?;
        log::debug!(
            "Design matrices: full {} coefficients {:?}, reduced {} coefficients",
            full.n_coefs(),
            full.coef_names(),
            reduced.n_coefs()
        );
        Ok((full, reduced))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn metadata() -> SampleMetadata {
        let ids: Vec<String> = (1..=4).map(|i| format!("s{}", i)).collect();
        let mut meta = SampleMetadata::new(ids).unwrap();
        meta.add_categorical(
            "condition",
            vec!["a".into(), "a".into(), "b".into(), "b".into()],
            None,
        )
        .unwrap();
        meta.add_categorical(
            "batch",
            vec!["x".into(), "y".into(), "x".into(), "y".into()],
            None,
        )
        .unwrap();
        meta
    }

    #[test]
    fn test_nested_designs_accepted() {
        let spec = DesignSpecification::new("~ batch + condition", "~ batch", &metadata()).unwrap();
        let (full, reduced) = spec.model_matrices(&metadata()).unwrap();
        assert_eq!(full.n_coefs(), 3);
        assert_eq!(reduced.n_coefs(), 2);
    }

    #[test]
    fn test_non_nested_rejected() {
        let err = DesignSpecification::new("~ condition", "~ batch", &metadata()).unwrap_err();
        assert!(matches!(err, DiffExprError::InvalidDesign { .. }));
    }

    #[test]
    fn test_missing_covariate_rejected() {
        let err = DesignSpecification::new("~ condition + donor", "~ 1", &metadata()).unwrap_err();
        assert!(matches!(err, DiffExprError::InvalidDesign { .. }));
    }

    #[test]
    fn test_equal_designs_allowed() {
        assert!(DesignSpecification::new("~ condition", "~ condition", &metadata()).is_ok());
    }
}
