//! Relative log expression

use ndarray::{Array2, Axis};

use super::vst::TransformedMatrix;
use crate::stats::median;

/// Per-gene, per-sample deviation from the gene's median across samples.
#[derive(Debug, Clone)]
pub struct RleMatrix {
    pub values: Array2<f64>,
    pub gene_ids: Vec<String>,
    pub sample_ids: Vec<String>,
    /// Median RLE of each sample; values far from zero flag problem samples
    pub sample_medians: Vec<f64>,
}

/// RLE of a log-scale matrix.
pub fn relative_log_expression(transformed: &TransformedMatrix) -> RleMatrix {
    let mut values = transformed.values.clone();
    for mut row in values.axis_iter_mut(Axis(0)) {
        let center = median(&row.to_vec());
        row.mapv_inplace(|v| v - center);
    }

    let sample_medians = values.axis_iter(Axis(1)).map(|col| median(&col.to_vec())).collect();

    RleMatrix {
        values,
        gene_ids: transformed.gene_ids.clone(),
        sample_ids: transformed.sample_ids.clone(),
        sample_medians,
    }
}
