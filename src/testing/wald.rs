//! Wald test for differential expression

use super::contrast::{ContrastSpec, ResolvedContrast};
use super::pvalue::normal_pvalue;
use super::{ComparisonResult, TestKind};
use crate::error::{DiffExprError, Result};
use crate::glm::FittedModel;

/// One coefficient contrast per non-intercept coefficient of the full design.
pub fn default_contrasts(model: &FittedModel) -> Vec<ContrastSpec> {
    model
        .coef_names()
        .iter()
        .skip(1)
        .map(|name| ContrastSpec::coefficient(name))
        .collect()
}

/// Wald test of `contrast' beta = 0` for every gene.
///
/// estimate = c'beta and se = sqrt(c' Sigma c) on the natural-log scale; both
/// are reported in log2. Genes whose full fit did not converge stay NaN.
pub fn wald_test(model: &FittedModel, contrast: &ResolvedContrast) -> Result<ComparisonResult> {
    let p = model.coef_names().len();
    if contrast.weights.len() != p {
        return Err(DiffExprError::InvalidContrast {
            reason: format!("{} contrast weights for {} coefficients", contrast.weights.len(), p),
        });
    }

    log::info!("Wald test: {}", contrast.name);
    let ln2 = std::f64::consts::LN_2;
    let c = &contrast.weights;
    let coefficients = model.coefficients();
    let mut result = ComparisonResult::new(contrast.name.clone(), TestKind::Wald, model.gene_ids().to_vec());

    for i in 0..model.n_genes() {
        if !model.full_status()[i].is_converged() {
            continue;
        }
        let beta = coefficients.row(i);
        let cov = model.covariance(i);

        let estimate: f64 = c.iter().zip(beta.iter()).map(|(w, b)| w * b).sum();
        let mut var = 0.0;
        for j in 0..p {
            for k in 0..p {
                var += c[j] * cov[[j, k]] * c[k];
            }
        }
        if !(var > 0.0) || !estimate.is_finite() {
            continue;
        }
        let se = var.sqrt();
        let z = estimate / se;

        result.estimate[i] = estimate / ln2;
        result.std_error[i] = se / ln2;
        result.statistic[i] = z;
        result.pvalue[i] = normal_pvalue(z);
    }

    result.adjust();
    Ok(result)
}

#[cfg(test)]
mod tests {
    use super::super::fixtures;
    use super::*;

    #[test]
    fn test_detects_fourfold_change() {
        let model = fixtures::fitted("~ 1");
        let contrast = ContrastSpec::coefficient("condition_trt_vs_ctl")
            .resolve(model.coef_names(), &fixtures::metadata())
            .unwrap();
        let result = wald_test(&model, &contrast).unwrap();

        assert!((result.estimate[0] - 2.0).abs() < 1e-3);
        assert!(result.pvalue[0] < 1e-6);
        assert!(result.estimate[1].abs() < 0.05);
        assert!(result.pvalue[1] > 0.5);
        assert!(result.estimate[2].is_nan() && result.pvalue[2].is_nan());
    }

    #[test]
    fn test_reversed_levels_flip_sign() {
        let model = fixtures::fitted("~ 1");
        let meta = fixtures::metadata();
        let forward = ContrastSpec::levels("condition", "trt", "ctl")
            .resolve(model.coef_names(), &meta)
            .unwrap();
        let reverse = ContrastSpec::levels("condition", "ctl", "trt")
            .resolve(model.coef_names(), &meta)
            .unwrap();
        let a = wald_test(&model, &forward).unwrap();
        let b = wald_test(&model, &reverse).unwrap();
        assert!((a.estimate[0] + b.estimate[0]).abs() < 1e-12);
        assert!((a.pvalue[0] - b.pvalue[0]).abs() < 1e-12);
        assert_eq!(b.name, "condition_ctl_vs_trt");
    }

    #[test]
    fn test_default_contrasts_skip_intercept() {
        let model = fixtures::fitted("~ 1");
        assert_eq!(
            default_contrasts(&model),
            vec![ContrastSpec::coefficient("condition_trt_vs_ctl")]
        );
    }
}
