//! Counts of regulated genes over a grid of fold-change and p-value cutoffs

use ndarray::Array2;

use crate::testing::ComparisonResult;

/// Up and down counts for each (fold-change, p-value) cutoff pair.
#[derive(Debug, Clone, PartialEq)]
pub struct ThresholdGrid {
    pub fold_changes: Vec<f64>,
    pub pvalues: Vec<f64>,
    /// Fold changes x p-values
    pub up: Array2<usize>,
    pub down: Array2<usize>,
}

impl ThresholdGrid {
    /// Count genes with `padj < p` and `lfc > c` (up) or `lfc < -c` (down).
    ///
    /// At `c == 0` a zero fold change counts as down, matching [`super::classify`].
    pub fn new(result: &ComparisonResult, fold_changes: &[f64], pvalues: &[f64]) -> Self {
        let mut up = Array2::zeros((fold_changes.len(), pvalues.len()));
        let mut down = Array2::zeros((fold_changes.len(), pvalues.len()));

        for (&padj, &lfc) in result.padj.iter().zip(result.estimate.iter()) {
            if padj.is_nan() || lfc.is_nan() {
                continue;
            }
            for (i, &c) in fold_changes.iter().enumerate() {
                let is_up = lfc > c;
                let is_down = lfc < -c || (c == 0.0 && lfc == 0.0);
                for (j, &p) in pvalues.iter().enumerate() {
                    if padj < p {
                        if is_up {
                            up[[i, j]] += 1;
                        } else if is_down {
                            down[[i, j]] += 1;
                        }
                    }
                }
            }
        }

        Self {
            fold_changes: fold_changes.to_vec(),
            pvalues: pvalues.to_vec(),
            up,
            down,
        }
    }

    /// `(+up, -down)` at one cell
    pub fn signed(&self, fc_idx: usize, p_idx: usize) -> (i64, i64) {
        (self.up[[fc_idx, p_idx]] as i64, -(self.down[[fc_idx, p_idx]] as i64))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::TestKind;

    #[test]
    fn test_grid_counts() {
        let result = ComparisonResult {
            name: "x".into(),
            kind: TestKind::Wald,
            gene_ids: (0..6).map(|i| format!("g{}", i)).collect(),
            estimate: vec![2.5, 0.5, -1.5, 0.0, -3.5, 1.0],
            std_error: vec![0.1; 6],
            statistic: vec![0.0; 6],
            pvalue: vec![0.0; 6],
            padj: vec![0.001, 0.04, 0.0005, 0.02, 0.2, 0.009],
        };
        let grid = ThresholdGrid::new(&result, &[0.0, 1.0, 2.0], &[0.05, 0.01]);

        // c = 0: up g0 g1 g5, down g2 g3 (g4 fails padj)
        assert_eq!(grid.signed(0, 0), (3, -2));
        assert_eq!(grid.signed(0, 1), (2, -1));
        // c = 1: lfc must exceed 1 strictly, so g5 drops out
        assert_eq!(grid.signed(1, 0), (1, -1));
        assert_eq!(grid.signed(2, 0), (1, 0));
    }
}
