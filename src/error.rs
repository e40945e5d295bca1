//! Error types for diffexpr

use thiserror::Error;

/// Main error type for differential expression analysis
#[derive(Error, Debug)]
pub enum DiffExprError {
    #[error("Invalid count matrix: {reason}")]
    InvalidCountMatrix { reason: String },

    #[error("Invalid metadata: {reason}")]
    InvalidMetadata { reason: String },

    #[error("Dimension mismatch: expected {expected}, got {got}")]
    DimensionMismatch { expected: String, got: String },

    /// Too few genes or samples to estimate the requested quantity.
    #[error("Degenerate input: {reason}")]
    DegenerateInput { reason: String },

    /// The mean-dispersion trend could not be fitted.
    #[error("Dispersion trend fit failed: {reason}")]
    TrendFit { reason: String },

    /// Design formula or model matrix rejected before fitting.
    #[error("Invalid design: {reason}")]
    InvalidDesign { reason: String },

    /// Single-gene fit that did not converge. Batch fitting records this as a
    /// missing result instead of raising it.
    #[error("GLM fit did not converge for gene {gene_id}: {reason}")]
    ConvergenceFailure { gene_id: String, reason: String },

    #[error("Invalid contrast specification: {reason}")]
    InvalidContrast { reason: String },

    #[error("Invalid configuration: {reason}")]
    InvalidConfig { reason: String },

    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),

    #[error("CSV parsing error: {0}")]
    CsvError(#[from] csv::Error),

    #[error("JSON parsing error: {0}")]
    JsonError(#[from] serde_json::Error),
}

/// Result type alias for diffexpr operations
pub type Result<T> = std::result::Result<T, DiffExprError>;
