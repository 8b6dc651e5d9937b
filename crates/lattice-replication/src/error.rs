//! Error types for lattice-replication.

use thiserror::Error;

use lattice_tensor::TensorId;

/// Result type for lattice-replication operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Errors that can occur during replication.
///
/// Per-target failures (timeouts, integrity mismatches) are not errors:
/// they degrade the [`ReplicationOutcome`](crate::ReplicationOutcome)
/// instead. Only malformed requests surface here.
#[derive(Debug, Error)]
pub enum Error {
    /// A replication factor of zero makes no sense.
    #[error("replication factor must be at least 1")]
    ZeroFactor,

    /// Only published tensors can be replicated.
    #[error("tensor {0} has not been published")]
    NotPublished(TensorId),

    /// The tensor's origin worker is not registered.
    #[error(transparent)]
    Topology(#[from] lattice_topology::Error),
}
