//! Generalized Linear Model fitting for negative binomial data

mod fitting;
mod model;
mod negative_binomial;

pub use fitting::{fit_gene, try_fit_gene, GeneFit, GlmFitParams};
pub use model::{fit_models, FitStatus, FittedModel};
