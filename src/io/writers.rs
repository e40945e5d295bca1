//! TSV writers for every output table

use std::collections::BTreeSet;
use std::fs::File;
use std::path::Path;

use ndarray::Array2;

use crate::diagnostics::{CovariateCorrelation, PcaResult};
use crate::dispersion::DispersionModel;
use crate::error::{DiffExprError, Result};
use crate::normalization::SizeFactors;
use crate::summary::{DESummary, OverlapSet};
use crate::testing::ComparisonResult;
use crate::transform::RleMatrix;

fn tsv<P: AsRef<Path>>(path: P) -> Result<csv::Writer<File>> {
    let path = path.as_ref();
    log::debug!("Writing {}", path.display());
    Ok(csv::WriterBuilder::new().delimiter(b'\t').from_path(path)?)
}

fn fixed(v: f64) -> String {
    if v.is_nan() {
        "NA".to_string()
    } else {
        format!("{:.6}", v)
    }
}

fn sci(v: f64) -> String {
    if v.is_nan() {
        "NA".to_string()
    } else {
        format!("{:.6e}", v)
    }
}

/// Per-gene statistics of one comparison.
pub fn write_results<P: AsRef<Path>>(path: P, result: &ComparisonResult, dispersions: &DispersionModel) -> Result<()> {
    if dispersions.n_genes() != result.n_genes() {
        return Err(DiffExprError::DimensionMismatch {
            expected: format!("{} genes", result.n_genes()),
            got: format!("{} dispersions", dispersions.n_genes()),
        });
    }
    let mut w = tsv(path)?;
    w.write_record(["gene_id", "baseMean", "log2FoldChange", "lfcSE", "stat", "pvalue", "padj", "dispersion"])?;
    for i in 0..result.n_genes() {
        w.write_record([
            result.gene_ids[i].clone(),
            fixed(dispersions.means()[i]),
            fixed(result.estimate[i]),
            fixed(result.std_error[i]),
            fixed(result.statistic[i]),
            sci(result.pvalue[i]),
            sci(result.padj[i]),
            sci(dispersions.dispersion(i)),
        ])?;
    }
    w.flush()?;
    Ok(())
}

/// Raw, trended and final dispersion of every gene.
pub fn write_dispersions<P: AsRef<Path>>(path: P, gene_ids: &[String], dispersions: &DispersionModel) -> Result<()> {
    let mut w = tsv(path)?;
    w.write_record(["gene_id", "baseMean", "dispGeneEst", "dispFit", "dispersion", "dispOutlier"])?;
    for (i, gene) in gene_ids.iter().enumerate() {
        w.write_record([
            gene.clone(),
            fixed(dispersions.means()[i]),
            sci(dispersions.raw()[i]),
            sci(dispersions.trended()[i]),
            sci(dispersions.dispersion(i)),
            dispersions.outliers()[i].to_string(),
        ])?;
    }
    w.flush()?;
    Ok(())
}

pub fn write_size_factors<P: AsRef<Path>>(path: P, sample_ids: &[String], size_factors: &SizeFactors) -> Result<()> {
    let mut w = tsv(path)?;
    w.write_record(["sample_id", "size_factor"])?;
    for (sample, sf) in sample_ids.iter().zip(size_factors.values().iter()) {
        w.write_record([sample.clone(), fixed(*sf)])?;
    }
    w.flush()?;
    Ok(())
}

/// A labelled matrix: one row per `row_ids` entry, one column per `col_ids` entry.
pub fn write_matrix<P: AsRef<Path>>(
    path: P,
    corner: &str,
    row_ids: &[String],
    col_ids: &[String],
    values: &Array2<f64>,
) -> Result<()> {
    if values.dim() != (row_ids.len(), col_ids.len()) {
        return Err(DiffExprError::DimensionMismatch {
            expected: format!("{} x {} values", row_ids.len(), col_ids.len()),
            got: format!("{:?}", values.dim()),
        });
    }
    let mut w = tsv(path)?;
    let mut header = vec![corner.to_string()];
    header.extend(col_ids.iter().cloned());
    w.write_record(&header)?;
    for (id, row) in row_ids.iter().zip(values.rows()) {
        let mut record = vec![id.clone()];
        record.extend(row.iter().map(|&v| fixed(v)));
        w.write_record(&record)?;
    }
    w.flush()?;
    Ok(())
}

/// Per-sample median RLE.
pub fn write_rle<P: AsRef<Path>>(path: P, rle: &RleMatrix) -> Result<()> {
    let mut w = tsv(path)?;
    w.write_record(["sample_id", "median_rle"])?;
    for (sample, median) in rle.sample_ids.iter().zip(rle.sample_medians.iter()) {
        w.write_record([sample.clone(), fixed(*median)])?;
    }
    w.flush()?;
    Ok(())
}

/// Sample coordinates to `coords_path` and per-component variance to
/// `variance_path`.
pub fn write_pca<P: AsRef<Path>, Q: AsRef<Path>>(coords_path: P, variance_path: Q, pca: &PcaResult) -> Result<()> {
    write_matrix(
        coords_path,
        "sample_id",
        &pca.sample_ids,
        &pca.component_names(),
        &pca.coordinates,
    )?;

    let mut w = tsv(variance_path)?;
    w.write_record(["component", "singular_value", "percent_variance"])?;
    for (name, (s, pct)) in pca
        .component_names()
        .into_iter()
        .zip(pca.singular_values.iter().zip(pca.percent_variance.iter()))
    {
        w.write_record([name, fixed(*s), fixed(*pct)])?;
    }
    w.flush()?;
    Ok(())
}

pub fn write_correlation<P: AsRef<Path>>(path: P, correlation: &CovariateCorrelation) -> Result<()> {
    write_matrix(
        path,
        "covariate",
        &correlation.covariates,
        &correlation.components,
        &correlation.values,
    )
}

/// Up, down and not-significant counts per comparison.
pub fn write_summary<P: AsRef<Path>>(path: P, summaries: &[DESummary]) -> Result<()> {
    let mut w = tsv(path)?;
    w.write_record(["comparison", "padj_threshold", "up", "down", "not_significant"])?;
    for s in summaries {
        let (up, down, ns) = s.counts();
        w.write_record([
            s.comparison.clone(),
            s.threshold.to_string(),
            up.to_string(),
            down.to_string(),
            ns.to_string(),
        ])?;
    }
    w.flush()?;
    Ok(())
}

/// Per-gene calls, one column per comparison.
pub fn write_calls<P: AsRef<Path>>(path: P, summaries: &[DESummary]) -> Result<()> {
    let Some(first) = summaries.first() else {
        return Ok(());
    };
    if summaries.iter().any(|s| s.gene_ids != first.gene_ids) {
        return Err(DiffExprError::DimensionMismatch {
            expected: "comparisons over the same genes".to_string(),
            got: "differing gene lists".to_string(),
        });
    }
    let mut w = tsv(path)?;
    let mut header = vec!["gene_id".to_string()];
    header.extend(summaries.iter().map(|s| s.comparison.clone()));
    w.write_record(&header)?;
    for (i, gene) in first.gene_ids.iter().enumerate() {
        let mut record = vec![gene.clone()];
        record.extend(summaries.iter().map(|s| s.calls[i].to_string()));
        w.write_record(&record)?;
    }
    w.flush()?;
    Ok(())
}

/// Signed threshold-grid counts: positive for up, negative for down.
pub fn write_grid<P: AsRef<Path>>(path: P, summaries: &[DESummary]) -> Result<()> {
    let mut w = tsv(path)?;
    w.write_record(["comparison", "lfc_cutoff", "padj_cutoff", "up", "down"])?;
    for s in summaries {
        let grid = &s.grid;
        for (i, c) in grid.fold_changes.iter().enumerate() {
            for (j, p) in grid.pvalues.iter().enumerate() {
                let (up, down) = grid.signed(i, j);
                w.write_record([
                    s.comparison.clone(),
                    c.to_string(),
                    p.to_string(),
                    up.to_string(),
                    down.to_string(),
                ])?;
            }
        }
    }
    w.flush()?;
    Ok(())
}

/// Pairwise intersection sizes to `pairwise_path`; membership of every
/// significant gene to `membership_path`, with a final column marking genes
/// in every set.
pub fn write_overlap<P: AsRef<Path>, Q: AsRef<Path>>(pairwise_path: P, membership_path: Q, overlap: &OverlapSet) -> Result<()> {
    let names = overlap.names();
    let sizes = overlap.pairwise();
    let mut w = tsv(pairwise_path)?;
    let mut header = vec!["comparison".to_string()];
    header.extend(names.iter().cloned());
    w.write_record(&header)?;
    for (name, row) in names.iter().zip(sizes.rows()) {
        let mut record = vec![name.clone()];
        record.extend(row.iter().map(|n| n.to_string()));
        w.write_record(&record)?;
    }
    w.flush()?;

    let union: BTreeSet<&String> = names.iter().filter_map(|n| overlap.set(n)).flatten().collect();
    let all = overlap.full_intersection();
    let mut w = tsv(membership_path)?;
    let mut header = vec!["gene_id".to_string()];
    header.extend(names.iter().cloned());
    header.push("all".to_string());
    w.write_record(&header)?;
    for gene in union {
        let mut record = vec![gene.clone()];
        for name in names {
            let member = overlap.set(name).map_or(false, |s| s.contains(gene));
            record.push(u8::from(member).to_string());
        }
        record.push(u8::from(all.contains(gene)).to_string());
        w.write_record(&record)?;
    }
    w.flush()?;
    Ok(())
}
