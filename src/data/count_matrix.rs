//! Count matrix representation for RNA-seq data

use std::collections::HashSet;

use ndarray::{Array2, ArrayView1, ArrayView2, Axis};

use crate::error::{DiffExprError, Result};

fn ensure_unique(ids: &[String], what: &str) -> Result<()> {
    let mut seen = HashSet::with_capacity(ids.len());
    for id in ids {
        if !seen.insert(id.as_str()) {
            return Err(DiffExprError::InvalidCountMatrix {
                reason: format!("duplicate {} identifier '{}'", what, id),
            });
        }
    }
    Ok(())
}

/// Non-negative integer read counts, rows are genes and columns are samples.
///
/// Values are stored as `f64` for the numeric code downstream but are
/// guaranteed to be integral.
#[derive(Debug, Clone)]
pub struct CountMatrix {
    counts: Array2<f64>,
    gene_ids: Vec<String>,
    sample_ids: Vec<String>,
}

impl CountMatrix {
    /// Create a count matrix from floating-point storage.
    ///
    /// Fractional, negative or non-finite entries are rejected rather than
    /// rounded.
    pub fn new(counts: Array2<f64>, gene_ids: Vec<String>, sample_ids: Vec<String>) -> Result<Self> {
        let (n_genes, n_samples) = counts.dim();

        if gene_ids.len() != n_genes {
            return Err(DiffExprError::DimensionMismatch {
                expected: format!("{} gene IDs", n_genes),
                got: format!("{} gene IDs", gene_ids.len()),
            });
        }
        if sample_ids.len() != n_samples {
            return Err(DiffExprError::DimensionMismatch {
                expected: format!("{} sample IDs", n_samples),
                got: format!("{} sample IDs", sample_ids.len()),
            });
        }
        if n_genes == 0 || n_samples == 0 {
            return Err(DiffExprError::InvalidCountMatrix {
                reason: "count matrix has no genes or no samples".to_string(),
            });
        }

        if let Some(bad) = counts.iter().find(|&&x| !x.is_finite() || x < 0.0) {
            return Err(DiffExprError::InvalidCountMatrix {
                reason: format!("counts must be non-negative finite values, found {}", bad),
            });
        }
        if let Some(bad) = counts.iter().find(|&&x| x.fract() != 0.0) {
            return Err(DiffExprError::InvalidCountMatrix {
                reason: format!("counts must be integers, found {}", bad),
            });
        }

        ensure_unique(&gene_ids, "gene")?;
        ensure_unique(&sample_ids, "sample")?;

        Ok(Self {
            counts,
            gene_ids,
            sample_ids,
        })
    }

    /// Create from integer counts, as read from a count table.
    pub fn from_integers(counts: Array2<u64>, gene_ids: Vec<String>, sample_ids: Vec<String>) -> Result<Self> {
        Self::new(counts.mapv(|x| x as f64), gene_ids, sample_ids)
    }

    pub fn n_genes(&self) -> usize {
        self.counts.nrows()
    }

    pub fn n_samples(&self) -> usize {
        self.counts.ncols()
    }

    pub fn counts(&self) -> ArrayView2<'_, f64> {
        self.counts.view()
    }

    pub fn gene_ids(&self) -> &[String] {
        &self.gene_ids
    }

    pub fn sample_ids(&self) -> &[String] {
        &self.sample_ids
    }

    /// Counts for one gene across samples
    pub fn gene_counts(&self, gene_idx: usize) -> ArrayView1<'_, f64> {
        self.counts.row(gene_idx)
    }

    pub fn gene_index(&self, gene_id: &str) -> Option<usize> {
        self.gene_ids.iter().position(|id| id == gene_id)
    }

    /// Total counts per sample (library size)
    pub fn library_sizes(&self) -> Vec<f64> {
        self.counts.axis_iter(Axis(1)).map(|col| col.sum()).collect()
    }

    /// `true` for genes with at least one non-zero count.
    ///
    /// All-zero genes are skipped by dispersion estimation and model fitting
    /// but keep their row in every output table.
    pub fn nonzero_gene_mask(&self) -> Vec<bool> {
        self.counts
            .axis_iter(Axis(0))
            .map(|row| row.iter().any(|&x| x > 0.0))
            .collect()
    }

    /// Multiply every count by a positive integer factor.
    pub fn scaled(&self, factor: u64) -> Result<Self> {
        Self::new(
            self.counts.mapv(|x| x * factor as f64),
            self.gene_ids.clone(),
            self.sample_ids.clone(),
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::array;

    fn ids(prefix: &str, n: usize) -> Vec<String> {
        (1..=n).map(|i| format!("{}{}", prefix, i)).collect()
    }

    #[test]
    fn test_count_matrix_creation() {
        let matrix = CountMatrix::new(array![[10.0, 20.0, 30.0], [5.0, 15.0, 25.0]], ids("gene", 2), ids("s", 3)).unwrap();
        assert_eq!(matrix.n_genes(), 2);
        assert_eq!(matrix.n_samples(), 3);
        assert_eq!(matrix.gene_index("gene2"), Some(1));
    }

    #[test]
    fn test_negative_counts_rejected() {
        let result = CountMatrix::new(array![[10.0, -5.0], [5.0, 15.0]], ids("gene", 2), ids("s", 2));
        assert!(matches!(result, Err(DiffExprError::InvalidCountMatrix { .. })));
    }

    #[test]
    fn test_fractional_counts_rejected() {
        let result = CountMatrix::new(array![[10.5, 5.0], [5.0, 15.0]], ids("gene", 2), ids("s", 2));
        assert!(matches!(result, Err(DiffExprError::InvalidCountMatrix { .. })));
    }

    #[test]
    fn test_duplicate_gene_ids_rejected() {
        let result = CountMatrix::new(
            array![[1.0, 2.0], [3.0, 4.0]],
            vec!["g".to_string(), "g".to_string()],
            ids("s", 2),
        );
        assert!(result.is_err());
    }

    #[test]
    fn test_nonzero_mask_and_library_sizes() {
        let matrix = CountMatrix::from_integers(array![[10, 20], [0, 0], [5, 15]], ids("gene", 3), ids("s", 2)).unwrap();
        assert_eq!(matrix.nonzero_gene_mask(), vec![true, false, true]);
        assert_eq!(matrix.library_sizes(), vec![15.0, 35.0]);
    }
}
