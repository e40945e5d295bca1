//! Per-gene regulation calls

use serde::{Deserialize, Serialize};

use super::grid::ThresholdGrid;
use crate::testing::ComparisonResult;

/// Direction of a significant change.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Regulation {
    Up,
    Down,
    NotSignificant,
}

impl std::fmt::Display for Regulation {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Regulation::Up => "up",
            Regulation::Down => "down",
            Regulation::NotSignificant => "ns",
        };
        write!(f, "{}", s)
    }
}

/// Call one gene.
///
/// Significant means `padj < threshold` (strict). A significant gene with
/// `lfc == 0` counts as `Down`. Missing values are never significant.
pub fn classify(padj: f64, lfc: f64, threshold: f64) -> Regulation {
    if !(padj < threshold) || lfc.is_nan() {
        return Regulation::NotSignificant;
    }
    if lfc > 0.0 {
        Regulation::Up
    } else {
        Regulation::Down
    }
}

/// Calls and threshold-grid counts for one comparison.
#[derive(Debug, Clone)]
pub struct DESummary {
    pub comparison: String,
    pub threshold: f64,
    pub gene_ids: Vec<String>,
    pub calls: Vec<Regulation>,
    pub grid: ThresholdGrid,
}

impl DESummary {
    pub fn new(result: &ComparisonResult, threshold: f64, fold_changes: &[f64], pvalues: &[f64]) -> Self {
        let calls = result
            .padj
            .iter()
            .zip(result.estimate.iter())
            .map(|(&p, &lfc)| classify(p, lfc, threshold))
            .collect();
        Self {
            comparison: result.name.clone(),
            threshold,
            gene_ids: result.gene_ids.clone(),
            calls,
            grid: ThresholdGrid::new(result, fold_changes, pvalues),
        }
    }

    /// Number of `Up`, `Down` and `NotSignificant` calls
    pub fn counts(&self) -> (usize, usize, usize) {
        let count = |r: Regulation| self.calls.iter().filter(|&&c| c == r).count();
        (
            count(Regulation::Up),
            count(Regulation::Down),
            count(Regulation::NotSignificant),
        )
    }

    pub fn genes_with(&self, regulation: Regulation) -> Vec<&str> {
        self.gene_ids
            .iter()
            .zip(self.calls.iter())
            .filter(|(_, &c)| c == regulation)
            .map(|(id, _)| id.as_str())
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::TestKind;

    fn result() -> ComparisonResult {
        ComparisonResult {
            name: "cond_b_vs_a".into(),
            kind: TestKind::Wald,
            gene_ids: ["g1", "g2", "g3", "g4", "g5", "g6"].iter().map(|s| s.to_string()).collect(),
            estimate: vec![1.5, -2.0, 0.0, 3.0, 0.4, f64::NAN],
            std_error: vec![0.1; 6],
            statistic: vec![1.0; 6],
            pvalue: vec![0.001; 6],
            padj: vec![0.01, 0.001, 0.02, 0.05, f64::NAN, 0.01],
        }
    }

    #[test]
    fn test_classify_rules() {
        assert_eq!(classify(0.01, 1.0, 0.05), Regulation::Up);
        assert_eq!(classify(0.01, -1.0, 0.05), Regulation::Down);
        assert_eq!(classify(0.01, 0.0, 0.05), Regulation::Down);
        assert_eq!(classify(0.05, 1.0, 0.05), Regulation::NotSignificant);
        assert_eq!(classify(f64::NAN, 1.0, 0.05), Regulation::NotSignificant);
    }

    #[test]
    fn test_summary_counts() {
        let summary = DESummary::new(&result(), 0.05, &[0.0, 1.0], &[0.05, 0.01]);
        assert_eq!(summary.counts(), (1, 2, 3));
        assert_eq!(summary.genes_with(Regulation::Up), vec!["g1"]);
        assert_eq!(summary.genes_with(Regulation::Down), vec!["g2", "g3"]);
    }

    #[test]
    fn test_reclassification_is_idempotent() {
        let r = result();
        let first = DESummary::new(&r, 0.05, &[0.0], &[0.05]);
        let second = DESummary::new(&r, 0.05, &[0.0], &[0.05]);
        assert_eq!(first.calls, second.calls);
        for (call, (&p, &lfc)) in first.calls.iter().zip(r.padj.iter().zip(r.estimate.iter())) {
            assert_eq!(classify(p, lfc, 0.05), *call);
        }
    }
}
