//! Size factor estimation using the median of ratios method

use ndarray::{Array1, Array2, ArrayView1, ArrayView2, Axis};
use serde::{Deserialize, Serialize};

use crate::data::CountMatrix;
use crate::error::{DiffExprError, Result};
use crate::stats::median;

/// Size factors below this are reported as likely technical outliers.
const LOW_SIZE_FACTOR: f64 = 1e-3;

/// Method for size factor estimation
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SizeFactorMethod {
    /// Median of ratios over genes with no zero counts
    #[default]
    Ratio,
    /// Geometric means over positive counts only, for sparse data
    PosCounts,
}

/// One positive scaling factor per sample.
#[derive(Debug, Clone, PartialEq)]
pub struct SizeFactors {
    values: Array1<f64>,
}

impl SizeFactors {
    /// Wrap externally supplied size factors.
    pub fn from_values(values: Vec<f64>) -> Result<Self> {
        if values.is_empty() {
            return Err(DiffExprError::DegenerateInput {
                reason: "no size factors supplied".to_string(),
            });
        }
        if let Some(bad) = values.iter().find(|v| !(v.is_finite() && **v > 0.0)) {
            return Err(DiffExprError::DegenerateInput {
                reason: format!("size factors must be positive and finite, got {}", bad),
            });
        }
        Ok(Self {
            values: Array1::from_vec(values),
        })
    }

    pub fn values(&self) -> ArrayView1<'_, f64> {
        self.values.view()
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    /// Counts divided by their sample's size factor
    pub fn normalize(&self, counts: &CountMatrix) -> Result<Array2<f64>> {
        if counts.n_samples() != self.len() {
            return Err(DiffExprError::DimensionMismatch {
                expected: format!("{} size factors", counts.n_samples()),
                got: format!("{} size factors", self.len()),
            });
        }
        let mut normalized = counts.counts().to_owned();
        for (mut col, &sf) in normalized.axis_iter_mut(Axis(1)).zip(self.values.iter()) {
            col.mapv_inplace(|x| x / sf);
        }
        Ok(normalized)
    }
}

/// Estimate size factors for every sample of `counts`.
///
/// Fails with `DegenerateInput` when fewer than two genes can serve as
/// reference. Very small factors are logged but accepted.
pub fn estimate_size_factors(counts: &CountMatrix, method: SizeFactorMethod) -> Result<SizeFactors> {
    let values = match method {
        SizeFactorMethod::Ratio => size_factors_ratio(counts.counts())?,
        SizeFactorMethod::PosCounts => size_factors_poscounts(counts.counts())?,
    };

    for (id, &sf) in counts.sample_ids().iter().zip(values.iter()) {
        if sf < LOW_SIZE_FACTOR {
            log::warn!("Sample '{}' has a very small size factor ({:.3e}); possible technical outlier", id, sf);
        }
    }
    log::debug!("Size factors: {:?}", values.to_vec());

    SizeFactors::from_values(values.to_vec())
}

/// Per-sample median of count / reference over the reference genes.
fn median_of_ratios(counts: ArrayView2<f64>, reference: &[(usize, f64)]) -> Result<Array1<f64>> {
    let n_samples = counts.ncols();
    let mut size_factors = Array1::zeros(n_samples);

    for j in 0..n_samples {
        let ratios: Vec<f64> = reference
            .iter()
            .map(|&(i, geo_mean)| counts[[i, j]] / geo_mean)
            .filter(|r| *r > 0.0)
            .collect();

        let sf = median(&ratios);
        if !(sf.is_finite() && sf > 0.0) {
            return Err(DiffExprError::DegenerateInput {
                reason: format!("sample {} has no positive count among the reference genes", j + 1),
            });
        }
        size_factors[j] = sf;
    }
    Ok(size_factors)
}

fn size_factors_ratio(counts: ArrayView2<f64>) -> Result<Array1<f64>> {
    let n_samples = counts.ncols() as f64;

    let reference: Vec<(usize, f64)> = counts
        .axis_iter(Axis(0))
        .enumerate()
        .filter(|(_, row)| row.iter().all(|&x| x > 0.0))
        .map(|(i, row)| (i, (row.iter().map(|x| x.ln()).sum::<f64>() / n_samples).exp()))
        .collect();

    if reference.len() < 2 {
        return Err(DiffExprError::DegenerateInput {
            reason: format!(
                "{} gene(s) have non-zero counts in every sample; at least 2 are needed for median-of-ratios normalization",
                reference.len()
            ),
        });
    }
    log::debug!("Median of ratios over {} reference genes", reference.len());

    median_of_ratios(counts, &reference)
}

/// The geometric mean divides the log sum of positive counts by the total
/// number of samples, so zeros shrink it instead of excluding the gene.
fn size_factors_poscounts(counts: ArrayView2<f64>) -> Result<Array1<f64>> {
    let n_samples = counts.ncols() as f64;

    let reference: Vec<(usize, f64)> = counts
        .axis_iter(Axis(0))
        .enumerate()
        .filter(|(_, row)| row.iter().any(|&x| x > 0.0))
        .map(|(i, row)| {
            let log_sum: f64 = row.iter().filter(|&&x| x > 0.0).map(|x| x.ln()).sum();
            (i, (log_sum / n_samples).exp())
        })
        .collect();

    if reference.len() < 2 {
        return Err(DiffExprError::DegenerateInput {
            reason: "fewer than 2 genes with positive counts".to_string(),
        });
    }

    let mut sf = median_of_ratios(counts, &reference)?;
    // scale to geometric mean 1
    let log_center = sf.iter().map(|x| x.ln()).sum::<f64>() / sf.len() as f64;
    let center = log_center.exp();
    sf.mapv_inplace(|x| x / center);
    Ok(sf)
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::array;

    fn matrix(counts: Array2<f64>) -> CountMatrix {
        let genes = (1..=counts.nrows()).map(|i| format!("gene{}", i)).collect();
        let samples = (1..=counts.ncols()).map(|i| format!("s{}", i)).collect();
        CountMatrix::new(counts, genes, samples).unwrap()
    }

    fn depth_matrix() -> CountMatrix {
        matrix(array![
            [100.0, 200.0, 80.0, 160.0],
            [500.0, 1000.0, 400.0, 800.0],
            [50.0, 100.0, 40.0, 80.0],
            [200.0, 400.0, 160.0, 320.0]
        ])
    }

    #[test]
    fn test_size_factors_follow_depth() {
        let sf = estimate_size_factors(&depth_matrix(), SizeFactorMethod::Ratio).unwrap();
        assert_eq!(sf.len(), 4);
        assert!(sf.values().iter().all(|&x| x > 0.0));
        assert!((sf.values()[1] / sf.values()[0] - 2.0).abs() < 1e-12);
        assert!((sf.values()[3] / sf.values()[2] - 2.0).abs() < 1e-12);
    }

    #[test]
    fn test_scale_invariance() {
        let counts = matrix(array![
            [10.0, 14.0, 9.0, 30.0],
            [120.0, 90.0, 150.0, 111.0],
            [7.0, 0.0, 3.0, 5.0],
            [55.0, 61.0, 40.0, 70.0],
            [300.0, 280.0, 350.0, 260.0]
        ]);
        let sf = estimate_size_factors(&counts, SizeFactorMethod::Ratio).unwrap();
        let sf_scaled = estimate_size_factors(&counts.scaled(7).unwrap(), SizeFactorMethod::Ratio).unwrap();
        for (a, b) in sf.values().iter().zip(sf_scaled.values().iter()) {
            assert!((a - b).abs() < 1e-12, "{} vs {}", a, b);
        }
    }

    #[test]
    fn test_zero_genes_excluded_from_reference() {
        // gene 3 has a zero and must not pull sample 2 down
        let counts = matrix(array![[10.0, 10.0], [20.0, 20.0], [5.0, 0.0]]);
        let sf = estimate_size_factors(&counts, SizeFactorMethod::Ratio).unwrap();
        assert!((sf.values()[0] - 1.0).abs() < 1e-12);
        assert!((sf.values()[1] - 1.0).abs() < 1e-12);
    }

    #[test]
    fn test_too_few_reference_genes() {
        let counts = matrix(array![[10.0, 12.0], [0.0, 20.0], [5.0, 0.0]]);
        let err = estimate_size_factors(&counts, SizeFactorMethod::Ratio).unwrap_err();
        assert!(matches!(err, DiffExprError::DegenerateInput { .. }));
    }

    #[test]
    fn test_poscounts_handles_sparse_genes() {
        let counts = matrix(array![[10.0, 0.0, 12.0], [0.0, 20.0, 18.0], [5.0, 8.0, 0.0]]);
        let sf = estimate_size_factors(&counts, SizeFactorMethod::PosCounts).unwrap();
        let log_mean: f64 = sf.values().iter().map(|x| x.ln()).sum::<f64>() / 3.0;
        assert!(log_mean.abs() < 1e-12);
    }

    #[test]
    fn test_normalize_divides_columns() {
        let sf = SizeFactors::from_values(vec![1.0, 2.0, 0.5, 1.0]).unwrap();
        let norm = sf.normalize(&depth_matrix()).unwrap();
        assert_eq!(norm[[0, 1]], 100.0);
        assert_eq!(norm[[0, 2]], 160.0);
    }

    #[test]
    fn test_supplied_factors_validated() {
        assert!(SizeFactors::from_values(vec![1.0, 0.0]).is_err());
        assert!(SizeFactors::from_values(vec![1.0, f64::NAN]).is_err());
    }
}
