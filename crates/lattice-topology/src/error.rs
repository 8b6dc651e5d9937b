//! Error types for lattice-topology.

use thiserror::Error;

use crate::WorkerId;

/// Result type for lattice-topology operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Errors that can occur during topology operations.
#[derive(Debug, Error)]
pub enum Error {
    /// Operation referenced a worker that is not registered.
    #[error("unknown worker: {0}")]
    UnknownWorker(WorkerId),

    /// Worker descriptor failed validation at registration.
    #[error("invalid worker descriptor: {0}")]
    InvalidDescriptor(String),
}
