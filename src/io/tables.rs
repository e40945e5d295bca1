//! Readers for count and sample tables

use std::collections::BTreeMap;
use std::fs::File;
use std::io::{BufRead, BufReader};
use std::path::Path;

use ndarray::Array2;

use crate::data::{CountMatrix, CovariateKind, CovariateSchema, SampleMetadata};
use crate::error::{DiffExprError, Result};

/// Tab if the header line has one, else comma.
fn detect_delimiter(path: &Path) -> Result<u8> {
    let mut header = String::new();
    BufReader::new(File::open(path)?).read_line(&mut header)?;
    Ok(if header.contains('\t') { b'\t' } else { b',' })
}

fn open(path: &Path) -> Result<csv::Reader<File>> {
    let delimiter = detect_delimiter(path)?;
    Ok(csv::ReaderBuilder::new()
        .has_headers(true)
        .delimiter(delimiter)
        .trim(csv::Trim::All)
        .from_path(path)?)
}

/// Read a gene x sample count table.
///
/// The header names the samples after the identifier column. Counts must be
/// non-negative integers.
pub fn read_count_table<P: AsRef<Path>>(path: P) -> Result<CountMatrix> {
    let path = path.as_ref();
    let mut reader = open(path)?;
    let sample_ids: Vec<String> = reader.headers()?.iter().skip(1).map(str::to_string).collect();
    if sample_ids.is_empty() {
        return Err(DiffExprError::InvalidCountMatrix {
            reason: format!("{} has no sample columns", path.display()),
        });
    }

    let mut gene_ids = Vec::new();
    let mut values = Vec::new();
    for (line, record) in reader.records().enumerate() {
        let record = record?;
        let mut fields = record.iter();
        let gene = fields.next().unwrap_or_default().to_string();
        for (sample, field) in sample_ids.iter().zip(fields) {
            let value: u64 = field.parse().map_err(|_| DiffExprError::InvalidCountMatrix {
                reason: format!(
                    "gene '{}' sample '{}' (row {}): '{}' is not a non-negative integer count",
                    gene,
                    sample,
                    line + 2,
                    field
                ),
            })?;
            values.push(value);
        }
        gene_ids.push(gene);
    }

    let n_genes = gene_ids.len();
    let counts = Array2::from_shape_vec((n_genes, sample_ids.len()), values).map_err(|e| {
        DiffExprError::InvalidCountMatrix {
            reason: format!("ragged count table: {}", e),
        }
    })?;
    log::info!("Read {} genes x {} samples from {}", n_genes, sample_ids.len(), path.display());
    CountMatrix::from_integers(counts, gene_ids, sample_ids)
}

/// Read a sample table into metadata.
///
/// Columns named in `schema` take its kind and level order. Other columns
/// are categorical with levels in order of first appearance.
pub fn read_sample_table<P: AsRef<Path>>(path: P, schema: &BTreeMap<String, CovariateSchema>) -> Result<SampleMetadata> {
    let path = path.as_ref();
    let mut reader = open(path)?;
    let columns: Vec<String> = reader.headers()?.iter().skip(1).map(str::to_string).collect();
    if let Some(missing) = schema.keys().find(|name| !columns.contains(name)) {
        return Err(DiffExprError::InvalidMetadata {
            reason: format!("covariate '{}' declared in the schema is not a column of {}", missing, path.display()),
        });
    }

    let mut sample_ids = Vec::new();
    let mut raw: Vec<Vec<String>> = vec![Vec::new(); columns.len()];
    for record in reader.records() {
        let record = record?;
        let mut fields = record.iter();
        sample_ids.push(fields.next().unwrap_or_default().to_string());
        for (column, field) in raw.iter_mut().zip(fields) {
            column.push(field.to_string());
        }
    }

    let mut metadata = SampleMetadata::new(sample_ids)?;
    for (name, values) in columns.iter().zip(raw) {
        match schema.get(name) {
            Some(CovariateSchema {
                kind: CovariateKind::Numeric,
                ..
            }) => {
                let numeric = values
                    .iter()
                    .map(|v| {
                        v.parse::<f64>().map_err(|_| DiffExprError::InvalidMetadata {
                            reason: format!("numeric covariate '{}' has non-numeric value '{}'", name, v),
                        })
                    })
                    .collect::<Result<Vec<f64>>>()?;
                metadata.add_numeric(name, numeric)?;
            }
            Some(CovariateSchema { levels, .. }) => metadata.add_categorical(name, values, levels.clone())?,
            None => metadata.add_categorical(name, values, None)?,
        }
    }
    log::info!(
        "Read {} samples with {} covariate(s) from {}",
        metadata.n_samples(),
        columns.len(),
        path.display()
    );
    Ok(metadata)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::NamedTempFile;

    fn file(contents: &str) -> NamedTempFile {
        let mut f = NamedTempFile::new().unwrap();
        write!(f, "{}", contents).unwrap();
        f
    }

    #[test]
    fn test_read_tab_counts() {
        let f = file("gene\ts1\ts2\ng1\t10\t0\ng2\t3\t7\n");
        let counts = read_count_table(f.path()).unwrap();
        assert_eq!(counts.n_genes(), 2);
        assert_eq!(counts.sample_ids(), &["s1".to_string(), "s2".to_string()]);
        assert_eq!(counts.counts()[[1, 1]], 7.0);
    }

    #[test]
    fn test_read_comma_counts_with_quotes() {
        let f = file("\"gene\",\"a\",\"b\"\n\"g1\",1,2\n");
        let counts = read_count_table(f.path()).unwrap();
        assert_eq!(counts.gene_ids(), &["g1".to_string()]);
        assert_eq!(counts.counts()[[0, 1]], 2.0);
    }

    #[test]
    fn test_fractional_count_rejected() {
        let f = file("gene\ts1\ts2\ng1\t1.5\t2\n");
        assert!(matches!(
            read_count_table(f.path()),
            Err(DiffExprError::InvalidCountMatrix { .. })
        ));
        let f = file("gene\ts1\ts2\ng1\tabc\t2\n");
        assert!(read_count_table(f.path()).is_err());
        let f = file("gene\ts1\ts2\ng1\t-3\t2\n");
        assert!(matches!(
            read_count_table(f.path()),
            Err(DiffExprError::InvalidCountMatrix { .. })
        ));
    }

    #[test]
    fn test_read_sample_table_with_schema() {
        let f = file("sample\tcondition\tage\tbatch\ns1\ttrt\t30\tb2\ns2\tctl\t41\tb1\n");
        let mut schema = BTreeMap::new();
        schema.insert(
            "condition".to_string(),
            CovariateSchema {
                kind: CovariateKind::Categorical,
                levels: Some(vec!["ctl".into(), "trt".into()]),
            },
        );
        schema.insert(
            "age".to_string(),
            CovariateSchema {
                kind: CovariateKind::Numeric,
                levels: None,
            },
        );
        let meta = read_sample_table(f.path(), &schema).unwrap();
        assert_eq!(meta.covariate("condition").unwrap().reference_level(), Some("ctl"));
        assert_eq!(meta.covariate("age").unwrap().ordinal(), vec![30.0, 41.0]);
        // no schema entry: first appearance order
        assert_eq!(meta.covariate("batch").unwrap().reference_level(), Some("b2"));
    }

    #[test]
    fn test_undeclared_level_rejected() {
        let f = file("sample,condition\ns1,trt\ns2,other\n");
        let mut schema = BTreeMap::new();
        schema.insert(
            "condition".to_string(),
            CovariateSchema {
                kind: CovariateKind::Categorical,
                levels: Some(vec!["ctl".into(), "trt".into()]),
            },
        );
        assert!(matches!(
            read_sample_table(f.path(), &schema),
            Err(DiffExprError::InvalidMetadata { .. })
        ));
    }
}
