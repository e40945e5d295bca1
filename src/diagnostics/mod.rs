//! Sample-level diagnostics: principal components of transformed data and
//! their rank correlation with sample covariates

mod correlation;
mod pca;

pub use correlation::{covariate_correlations, CovariateCorrelation};
pub use pca::{principal_components, PcaParams, PcaResult};
