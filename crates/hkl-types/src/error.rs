use thiserror::Error;

/// Errors produced by value-model operations.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum TypeError {
    #[error("array shape {shape:?} does not match {len} elements")]
    ShapeMismatch { shape: Vec<usize>, len: usize },

    #[error("unhashable type: {0}")]
    Unhashable(String),

    #[error("invalid class name: {0:?}")]
    InvalidClassName(String),

    #[error("expected {expected}, got {actual}")]
    WrongType { expected: String, actual: String },
}
