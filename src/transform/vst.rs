//! Variance Stabilizing Transformation (VST)
//!
//! Maps normalized counts to an approximately homoskedastic log2-like scale
//! using the parametric dispersion trend `a0 + a1 / mean`.

use ndarray::Array2;
use serde::Serialize;

use crate::data::CountMatrix;
use crate::dispersion::DispersionModel;
use crate::error::{DiffExprError, Result};
use crate::normalization::SizeFactors;

/// Which transform produced a [`TransformedMatrix`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum TransformKind {
    /// Closed-form VST from the parametric trend
    Parametric,
    /// `log2(q + pseudocount)`, used when no trend is available
    LogFallback,
}

/// Transformed values (genes x samples).
#[derive(Debug, Clone)]
pub struct TransformedMatrix {
    pub values: Array2<f64>,
    pub gene_ids: Vec<String>,
    pub sample_ids: Vec<String>,
    pub kind: TransformKind,
}

impl TransformedMatrix {
    pub fn n_genes(&self) -> usize {
        self.values.nrows()
    }

    pub fn n_samples(&self) -> usize {
        self.values.ncols()
    }
}

/// Parametric VST of one normalized count:
/// `log2((1 + a1 + 2 a0 q + 2 sqrt(a0 q (1 + a1 + a0 q))) / (4 a0))`.
///
/// Applied to zero counts as well, which map to a finite floor.
pub fn vst_parametric_single(q: f64, asympt_disp: f64, extra_pois: f64) -> f64 {
    let a = asympt_disp;
    let e = extra_pois;
    let q = q.max(0.0);

    let numerator = 1.0 + e + 2.0 * a * q + 2.0 * (a * q * (1.0 + e + a * q)).sqrt();
    (numerator / (4.0 * a)).log2()
}

/// Variance-stabilize normalized counts.
///
/// Falls back to `log2(q + pseudocount)` when the dispersion model carries no
/// trend; the result records which transform was used.
pub fn variance_stabilize(
    counts: &CountMatrix,
    size_factors: &SizeFactors,
    dispersions: &DispersionModel,
    pseudocount: f64,
) -> Result<TransformedMatrix> {
    if !(pseudocount > 0.0) {
        return Err(DiffExprError::InvalidConfig {
            reason: format!("pseudocount must be > 0, got {}", pseudocount),
        });
    }
    let normalized = size_factors.normalize(counts)?;

    let (values, kind) = match dispersions.trend() {
        Some(trend) => {
            log::info!("Applying parametric variance-stabilizing transform");
            let a0 = trend.asympt_disp;
            let a1 = trend.extra_pois;
            (normalized.mapv(|q| vst_parametric_single(q, a0, a1)), TransformKind::Parametric)
        }
        None => {
            log::warn!(
                "No dispersion trend available; using log2(normalized + {}) instead of the VST. Variance is not stabilized for low counts",
                pseudocount
            );
            (normalized.mapv(|q| (q + pseudocount).log2()), TransformKind::LogFallback)
        }
    };

    Ok(TransformedMatrix {
        values,
        gene_ids: counts.gene_ids().to_vec(),
        sample_ids: counts.sample_ids().to_vec(),
        kind,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::array;

    #[test]
    fn test_vst_tracks_log2_for_large_counts() {
        // for a0 q >> 1 the transform approaches log2(q)
        let v = vst_parametric_single(10000.0, 0.01, 1.0);
        assert!((v - 10000f64.log2()).abs() < 0.1);
    }

    #[test]
    fn test_vst_zero_is_finite_floor() {
        let zero = vst_parametric_single(0.0, 0.1, 0.01);
        assert!((zero - (1.01f64 / 0.4).log2()).abs() < 1e-12);
        assert!(vst_parametric_single(1.0, 0.1, 0.01) > zero);
    }

    #[test]
    fn test_log_fallback_without_trend() {
        let counts = CountMatrix::new(
            array![[0.0, 3.0], [7.0, 15.0]],
            vec!["g1".into(), "g2".into()],
            vec!["s1".into(), "s2".into()],
        )
        .unwrap();
        let sf = SizeFactors::from_values(vec![1.0, 1.0]).unwrap();
        let disp = DispersionModel::fixed(vec![1.5, 11.0], vec![0.1, 0.1]).unwrap();
        let vst = variance_stabilize(&counts, &sf, &disp, 1.0).unwrap();
        assert_eq!(vst.kind, TransformKind::LogFallback);
        assert_eq!(vst.values, array![[0.0, 2.0], [3.0, 4.0]]);
    }
}
