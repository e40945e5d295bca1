//! Plain delimited table input and TSV output
//!
//! Tables have a header row; the first column holds identifiers. Input may be
//! tab or comma separated. Output is always tab separated with `NA` for
//! missing values.

mod tables;
mod writers;

pub use tables::{read_count_table, read_sample_table};
pub use writers::{
    write_calls, write_correlation, write_dispersions, write_grid, write_matrix, write_overlap, write_pca,
    write_results, write_rle, write_size_factors, write_summary,
};
