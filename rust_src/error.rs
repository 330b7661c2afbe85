//! Error taxonomy for the design-matrix layer.

use thiserror::Error;

/// Axis of an index subset, used in error messages.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Axis {
    Rows,
    Cols,
}

impl std::fmt::Display for Axis {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Axis::Rows => f.write_str("row"),
            Axis::Cols => f.write_str("column"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Error)]
pub enum MatrixError {
    /// Dense construction only accepts floating-point element types.
    #[error("dense design matrices are only implemented for float data, got {dtype}")]
    UnsupportedDtype { dtype: &'static str },

    #[error("{what} has length {got}, expected {expected}")]
    Shape {
        what: &'static str,
        expected: usize,
        got: usize,
    },

    #[error("{axis} index {index} is out of bounds for a dimension of size {bound}")]
    IndexOutOfBounds {
        axis: Axis,
        index: usize,
        bound: usize,
    },

    #[error("{axis} index {index} appears more than once in the subset")]
    DuplicateIndex { axis: Axis, index: usize },

    #[error("sparse matrix must be in {expected} storage, got {got}")]
    Layout {
        expected: &'static str,
        got: &'static str,
    },

    /// Raw compressed arrays that do not describe a valid matrix.
    #[error("malformed compressed sparse structure: {0}")]
    Structure(String),

    #[error("invalid weights: {0}")]
    InvalidWeights(String),

    #[error("invalid kernel configuration: {0}")]
    InvalidConfig(String),
}

pub type Result<T> = std::result::Result<T, MatrixError>;
