//! Error types for tianqi-vector.

use thiserror::Error;

/// Result type for tianqi-vector operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Errors that can occur in tianqi-vector operations.
#[derive(Error, Debug)]
pub enum Error {
    /// No entry is stored under the given index.
    #[error("Index {0} not found")]
    IndexNotFound(u64),

    /// Dimension mismatch between a vector and the index.
    #[error("Dimension mismatch: expected {expected}, got {actual}")]
    DimensionMismatch {
        /// Expected dimensions.
        expected: usize,
        /// Actual dimensions provided.
        actual: usize,
    },

    /// Invalid vector (empty, or contains NaN/Inf).
    #[error("Invalid vector: {0}")]
    InvalidVector(String),

    /// Persistence error (serialization, unsupported format, corrupt files).
    #[error("Persistence error: {0}")]
    Persistence(String),

    /// I/O error.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}
