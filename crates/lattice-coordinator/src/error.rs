//! Error types for lattice-coordinator.

use thiserror::Error;

use lattice_topology::WorkerId;

/// Result type for lattice-coordinator operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Errors surfaced at the orchestration boundary. Component errors pass
/// through; recoverable degradation never lands here (it is reported in
/// outcome structs instead).
#[derive(Debug, Error)]
pub enum Error {
    #[error(transparent)]
    Topology(#[from] lattice_topology::Error),

    #[error(transparent)]
    Tensor(#[from] lattice_tensor::Error),

    #[error(transparent)]
    Replication(#[from] lattice_replication::Error),

    #[error(transparent)]
    Attention(#[from] lattice_attention::Error),

    #[error(transparent)]
    Consensus(#[from] lattice_consensus::Error),

    #[error(transparent)]
    Memory(#[from] lattice_memory::Error),

    /// A submission claiming one worker but originating from another.
    #[error("submission from {claimed} carries a tensor originating at {actual}")]
    OriginMismatch { claimed: WorkerId, actual: WorkerId },

    /// No candidate tensors exist for the requested logical key.
    #[error("no contributions recorded for logical key {0:?}")]
    NoCandidates(String),
}
