//! Benjamini-Hochberg false discovery rate correction

/// Benjamini-Hochberg adjusted p-values.
///
/// Only finite p-values count toward the number of tests; NaN inputs stay NaN.
/// The result is monotone in the raw p-values and capped at 1.
pub fn benjamini_hochberg(pvalues: &[f64]) -> Vec<f64> {
    let n = pvalues.len();
    let mut padj = vec![f64::NAN; n];

    let mut indices: Vec<usize> = (0..n).filter(|&i| pvalues[i].is_finite()).collect();
    let m = indices.len();
    if m == 0 {
        return padj;
    }
    indices.sort_by(|&a, &b| pvalues[a].total_cmp(&pvalues[b]));

    // walk from the largest p-value down, carrying the running minimum
    let mut cummin = f64::INFINITY;
    for (pos, &i) in indices.iter().enumerate().rev() {
        let rank = pos + 1;
        let adj = (pvalues[i] * m as f64 / rank as f64).min(1.0);
        cummin = cummin.min(adj);
        padj[i] = cummin;
    }

    padj
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_bh_known_values() {
        let padj = benjamini_hochberg(&[0.01, 0.04, 0.03, 0.02]);
        // every p * 4 / rank equals 0.04
        for adj in &padj {
            assert!((adj - 0.04).abs() < 1e-12);
        }

        let padj = benjamini_hochberg(&[0.001, 0.5, 0.02]);
        assert!((padj[0] - 0.003).abs() < 1e-12);
        assert!((padj[2] - 0.03).abs() < 1e-12);
        assert!((padj[1] - 0.5).abs() < 1e-12);
    }

    #[test]
    fn test_bh_with_nan() {
        let padj = benjamini_hochberg(&[0.01, f64::NAN, 0.03, 0.02]);
        assert!(padj[1].is_nan());
        // three tests, not four
        assert!((padj[0] - 0.03).abs() < 1e-12);
        assert!((padj[2] - 0.03).abs() < 1e-12);
    }

    #[test]
    fn test_bh_monotone_and_bounded() {
        let pvalues = vec![0.9, 0.001, 0.2, 0.04, 0.04, 0.7, 1.0, 0.0005];
        let padj = benjamini_hochberg(&pvalues);
        for i in 0..pvalues.len() {
            assert!(padj[i] >= pvalues[i] && padj[i] <= 1.0);
            for j in 0..pvalues.len() {
                if pvalues[i] <= pvalues[j] {
                    assert!(padj[i] <= padj[j]);
                }
            }
        }
    }

    #[test]
    fn test_bh_all_missing() {
        let padj = benjamini_hochberg(&[f64::NAN, f64::NAN]);
        assert!(padj.iter().all(|p| p.is_nan()));
        assert!(benjamini_hochberg(&[]).is_empty());
    }
}
