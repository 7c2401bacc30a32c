//! Engine-wide error type.
//!
//! Every fallible operation returns [`Result`]; shape violations, malformed
//! model documents, bad configuration and I/O failures all surface through
//! [`EngineError`] rather than panics.

use thiserror::Error;

/// Convenience alias used throughout the crate.
pub type Result<T> = std::result::Result<T, EngineError>;

#[derive(Debug, Error)]
pub enum EngineError {
    /// Two operands had incompatible shapes for a matrix operation.
    #[error("{op}: incompatible shapes {left_rows}x{left_cols} and {right_rows}x{right_cols}")]
    Shape {
        op: &'static str,
        left_rows: usize,
        left_cols: usize,
        right_rows: usize,
        right_cols: usize,
    },

    /// A serialized model document failed validation.
    #[error("invalid model: {0}")]
    InvalidModel(String),

    /// An index or label fell outside its valid range.
    #[error("{what}: index {index} out of range for length {len}")]
    Index {
        what: &'static str,
        index: usize,
        len: usize,
    },

    /// A run configuration was rejected.
    #[error("invalid config: {0}")]
    Config(String),

    #[error("i/o error: {0}")]
    Io(#[from] std::io::Error),
}

impl EngineError {
    /// Shorthand for [`EngineError::Shape`] from two `(rows, cols)` pairs.
    pub(crate) fn shape(op: &'static str, left: (usize, usize), right: (usize, usize)) -> Self {
        EngineError::Shape {
            op,
            left_rows: left.0,
            left_cols: left.1,
            right_rows: right.0,
            right_cols: right.1,
        }
    }
}
