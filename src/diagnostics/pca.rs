//! Principal component analysis of samples

use faer::{Mat, Side};
use ndarray::{Array2, Axis};
use serde::{Deserialize, Serialize};

use crate::error::{DiffExprError, Result};
use crate::stats::variance;
use crate::transform::TransformedMatrix;

/// Configurable parameters for PCA.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct PcaParams {
    /// Use only the most variable genes; `None` uses every gene
    pub top_genes: Option<usize>,
}

/// Sample coordinates on the principal components.
#[derive(Debug, Clone)]
pub struct PcaResult {
    pub sample_ids: Vec<String>,
    /// Samples x components
    pub coordinates: Array2<f64>,
    pub singular_values: Vec<f64>,
    /// Percent of total variance per component; sums to 100
    pub percent_variance: Vec<f64>,
    pub genes_used: usize,
}

impl PcaResult {
    pub fn n_components(&self) -> usize {
        self.coordinates.ncols()
    }

    pub fn component_names(&self) -> Vec<String> {
        (1..=self.n_components()).map(|k| format!("PC{}", k)).collect()
    }
}

/// PCA of the samples of a transformed matrix.
///
/// Genes are centered, not scaled. The decomposition goes through the
/// samples x samples Gram matrix, so its cost is independent of the number
/// of genes beyond forming that matrix. Each component's sign is fixed so
/// the largest-magnitude loading on the samples is positive.
pub fn principal_components(transformed: &TransformedMatrix, params: &PcaParams) -> Result<PcaResult> {
    let n_samples = transformed.n_samples();
    if n_samples < 2 {
        return Err(DiffExprError::DegenerateInput {
            reason: format!("PCA needs at least 2 samples, got {}", n_samples),
        });
    }

    let mut gene_order: Vec<(usize, f64)> = transformed
        .values
        .axis_iter(Axis(0))
        .enumerate()
        .map(|(i, row)| (i, variance(&row.to_vec())))
        .filter(|(_, v)| v.is_finite())
        .collect();
    gene_order.sort_by(|a, b| b.1.total_cmp(&a.1));
    if let Some(top) = params.top_genes {
        gene_order.truncate(top);
    }
    if gene_order.is_empty() {
        return Err(DiffExprError::DegenerateInput {
            reason: "no genes with finite values for PCA".to_string(),
        });
    }
    let selected: Vec<usize> = gene_order.iter().map(|(i, _)| *i).collect();

    let mut centered = transformed.values.select(Axis(0), &selected);
    for mut row in centered.axis_iter_mut(Axis(0)) {
        let mean = row.mean().unwrap_or(0.0);
        row.mapv_inplace(|v| v - mean);
    }

    let gram = centered.t().dot(&centered);
    let (eigenvalues, mut vectors) = gram_eigen(&gram)?;

    let n_components = (n_samples - 1).min(selected.len());
    let singular_values: Vec<f64> = eigenvalues.iter().take(n_components).map(|&l| l.max(0.0).sqrt()).collect();
    let total: f64 = eigenvalues.iter().map(|&l| l.max(0.0)).sum();
    if !(total > 0.0) {
        return Err(DiffExprError::DegenerateInput {
            reason: "transformed values have no variance across samples".to_string(),
        });
    }
    let percent_variance: Vec<f64> = singular_values.iter().map(|s| s * s / total * 100.0).collect();

    let mut coordinates = Array2::<f64>::zeros((n_samples, n_components));
    for k in 0..n_components {
        let mut v = vectors.column_mut(k);
        let pivot = v.iter().copied().fold(0.0f64, |acc, x| if x.abs() > acc.abs() { x } else { acc });
        if pivot < 0.0 {
            v.mapv_inplace(|x| -x);
        }
        coordinates.column_mut(k).assign(&v.mapv(|x| x * singular_values[k]));
    }

    log::info!(
        "PCA on {} genes: PC1 {:.1}%{}",
        selected.len(),
        percent_variance[0],
        percent_variance
            .get(1)
            .map(|p| format!(", PC2 {:.1}%", p))
            .unwrap_or_default()
    );

    Ok(PcaResult {
        sample_ids: transformed.sample_ids.clone(),
        coordinates,
        singular_values,
        percent_variance,
        genes_used: selected.len(),
    })
}

/// Eigenpairs of the symmetric samples x samples Gram matrix, eigenvalues
/// in decreasing order with matching eigenvectors as columns.
fn gram_eigen(gram: &Array2<f64>) -> Result<(Vec<f64>, Array2<f64>)> {
    let n = gram.nrows();
    let matrix = Mat::from_fn(n, n, |i, j| gram[[i, j]]);
    let eig = matrix
        .self_adjoint_eigen(Side::Lower)
        .map_err(|err| DiffExprError::DegenerateInput {
            reason: format!("eigendecomposition of the sample Gram matrix failed: {:?}", err),
        })?;

    let diag = eig.S();
    let basis = eig.U();

    let mut order: Vec<(usize, f64)> = (0..n).map(|i| (i, diag[i])).collect();
    order.sort_by(|a, b| b.1.total_cmp(&a.1));

    let values = order.iter().map(|&(_, value)| value).collect();
    let vectors = Array2::from_shape_fn((n, n), |(row, col)| basis[(row, order[col].0)]);
    Ok((values, vectors))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::transform::TransformKind;
    use ndarray::array;

    fn rank_one() -> TransformedMatrix {
        // centered rows are (2, -1, -1) and (4, -2, -2)
        TransformedMatrix {
            values: array![[12.0, 9.0, 9.0], [7.0, 1.0, 1.0], [5.0, 5.0, 5.0]],
            gene_ids: vec!["g1".into(), "g2".into(), "g3".into()],
            sample_ids: vec!["s1".into(), "s2".into(), "s3".into()],
            kind: TransformKind::Parametric,
        }
    }

    #[test]
    fn test_rank_one_structure() {
        let pca = principal_components(&rank_one(), &PcaParams::default()).unwrap();
        assert_eq!(pca.n_components(), 2);
        assert!((pca.percent_variance[0] - 100.0).abs() < 1e-8);
        assert!(pca.percent_variance[1].abs() < 1e-8);
        assert!((pca.singular_values[0] - 30f64.sqrt()).abs() < 1e-8);
        assert!((pca.coordinates[[0, 0]] - 20f64.sqrt()).abs() < 1e-8);
        assert!((pca.coordinates[[1, 0]] + 5f64.sqrt()).abs() < 1e-8);
        assert_eq!(pca.component_names(), vec!["PC1", "PC2"]);
    }

    #[test]
    fn test_gram_eigen_orders_pairs() {
        let gram = array![[2.0, 1.0, 0.0], [1.0, 2.0, 0.0], [0.0, 0.0, 0.5]];
        let (values, vectors) = gram_eigen(&gram).unwrap();
        assert!((values[0] - 3.0).abs() < 1e-10);
        assert!((values[1] - 1.0).abs() < 1e-10);
        assert!((values[2] - 0.5).abs() < 1e-10);
        for k in 0..3 {
            let v = vectors.column(k);
            let gv = gram.dot(&v);
            for i in 0..3 {
                assert!((gv[i] - values[k] * v[i]).abs() < 1e-10);
            }
            assert!((v.dot(&v) - 1.0).abs() < 1e-10);
        }
    }

    #[test]
    fn test_top_genes_restricts_input() {
        let params = PcaParams { top_genes: Some(1) };
        let pca = principal_components(&rank_one(), &params).unwrap();
        assert_eq!(pca.genes_used, 1);
        assert_eq!(pca.n_components(), 1);
        // only g2, centered (4, -2, -2)
        assert!((pca.singular_values[0] - 24f64.sqrt()).abs() < 1e-8);
    }

    #[test]
    fn test_constant_data_is_degenerate() {
        let mut t = rank_one();
        t.values.fill(3.0);
        assert!(matches!(
            principal_components(&t, &PcaParams::default()),
            Err(DiffExprError::DegenerateInput { .. })
        ));
    }

    #[test]
    fn test_percent_variance_sums_to_100() {
        let t = TransformedMatrix {
            values: array![[1.0, 4.0, 2.0, 8.0], [3.0, 0.5, 2.5, 1.0], [6.0, 6.5, 5.0, 7.0]],
            gene_ids: vec!["a".into(), "b".into(), "c".into()],
            sample_ids: (1..=4).map(|i| format!("s{}", i)).collect(),
            kind: TransformKind::Parametric,
        };
        let pca = principal_components(&t, &PcaParams::default()).unwrap();
        let total: f64 = pca.percent_variance.iter().sum();
        assert!((total - 100.0).abs() < 1e-8);
        assert!(pca.percent_variance.windows(2).all(|w| w[0] >= w[1]));
    }
}
