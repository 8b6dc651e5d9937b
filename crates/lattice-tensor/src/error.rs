//! Error types for lattice-tensor.

use thiserror::Error;

use crate::TensorId;

/// Result type for lattice-tensor operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Errors that can occur during tensor operations.
#[derive(Debug, Error)]
pub enum Error {
    /// Shape is empty or contains a zero dimension.
    #[error("invalid shape: {0}")]
    InvalidShape(String),

    /// Two tensors (or a buffer and a shape) disagree on dimensions.
    #[error("shape mismatch: expected {expected:?}, got {got:?}")]
    ShapeMismatch {
        expected: Vec<usize>,
        got: Vec<usize>,
    },

    /// Operation requires a published tensor.
    #[error("tensor {0} has not been published")]
    NotPublished(TensorId),

    /// Tensor failed integrity verification.
    #[error("integrity failure for tensor {0}")]
    IntegrityFailure(TensorId),

    /// Referenced tensor is not in the store.
    #[error("unknown tensor: {0}")]
    UnknownTensor(TensorId),

    /// A tensor with this id is already stored.
    #[error("duplicate tensor: {0}")]
    Duplicate(TensorId),

    /// Insert would create a gap in a version chain.
    #[error("causal gap for {id}: version {got} but predecessor has {prev}")]
    CausalGap { id: TensorId, prev: u64, got: u64 },

    /// Byte encoding or decoding failed.
    #[error("codec failure: {0}")]
    Codec(#[from] bincode::Error),
}
