//! Error types for lattice-attention.

use thiserror::Error;

/// Result type for lattice-attention operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Errors that can occur during aggregation.
///
/// Per-candidate problems (shape mismatch, unknown origin) degrade the
/// outcome rather than erroring; only a malformed query surfaces here.
#[derive(Debug, Error)]
pub enum Error {
    /// The query tensor's origin worker is not registered.
    #[error(transparent)]
    Topology(#[from] lattice_topology::Error),

    /// Building the aggregate tensor failed.
    #[error(transparent)]
    Tensor(#[from] lattice_tensor::Error),
}
