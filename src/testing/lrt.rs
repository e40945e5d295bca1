//! Likelihood ratio test of the full against the reduced design
//!
//! stat = deviance(reduced) - deviance(full), compared with a chi-squared
//! distribution on `p_full - p_reduced` degrees of freedom.

use super::pvalue::chi_squared_pvalue;
use super::{ComparisonResult, TestKind};
use crate::glm::FittedModel;

/// Likelihood ratio test for every gene.
///
/// Genes need converged full and reduced fits; others stay NaN. With zero
/// degrees of freedom every fitted gene gets stat 0 and p 1. The estimate
/// column carries the last full-model coefficient in log2.
pub fn likelihood_ratio_test(model: &FittedModel) -> ComparisonResult {
    let df = model.df();
    let name = "LRT".to_string();
    log::info!("Likelihood ratio test on {} degree(s) of freedom", df);
    if df == 0 {
        log::warn!("Full and reduced designs are identical; every LRT p-value is 1");
    }

    let ln2 = std::f64::consts::LN_2;
    let last = model.coef_names().len() - 1;
    let coefficients = model.coefficients();
    let standard_errors = model.standard_errors();
    let full_dev = model.full_deviance();
    let reduced_dev = model.reduced_deviance();

    let mut result = ComparisonResult::new(name, TestKind::Lrt, model.gene_ids().to_vec());
    for i in 0..model.n_genes() {
        if !(model.full_status()[i].is_converged() && model.reduced_status()[i].is_converged()) {
            continue;
        }
        let stat = if df == 0 {
            0.0
        } else {
            (reduced_dev[i] - full_dev[i]).max(0.0)
        };
        result.estimate[i] = coefficients[[i, last]] / ln2;
        result.std_error[i] = standard_errors[[i, last]] / ln2;
        result.statistic[i] = stat;
        result.pvalue[i] = chi_squared_pvalue(stat, df);
    }

    result.adjust();
    result
}
