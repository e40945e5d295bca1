//! Summaries of comparison results: per-gene calls, counts over a grid of
//! thresholds, and overlaps of significant genes across comparisons

mod classify;
mod grid;
mod overlap;

pub use classify::{classify, DESummary, Regulation};
pub use grid::ThresholdGrid;
pub use overlap::{Direction, OverlapSet};
