//! Transformations of count data for visualization and diagnostics
//!
//! The variance-stabilizing transform uses the fitted dispersion trend; RLE
//! works on any log-scale matrix.

mod rle;
mod vst;

pub use rle::{relative_log_expression, RleMatrix};
pub use vst::{variance_stabilize, vst_parametric_single, TransformKind, TransformedMatrix};
