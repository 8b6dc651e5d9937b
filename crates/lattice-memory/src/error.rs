//! Error types for lattice-memory.

use thiserror::Error;

use lattice_tensor::TensorId;

/// Result type for lattice-memory operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Errors that can occur during memory consolidation.
#[derive(Debug, Error)]
pub enum Error {
    /// Referenced node does not exist in the graph.
    #[error("unknown memory node: {0}")]
    UnknownNode(TensorId),

    /// Only published tensors may be remembered.
    #[error("tensor {0} is not published")]
    NotPublished(TensorId),

    /// Importance outside [0, 1].
    #[error("importance {0} outside [0, 1]")]
    InvalidImportance(f64),
}
