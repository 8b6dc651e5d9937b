//! Integrity proofs attached to replica copies.

use lattice_tensor::TensorId;
use lattice_topology::WorkerId;
use serde::{Deserialize, Serialize};

/// Proof that a worker holds a byte-exact copy of a tensor.
///
/// The hash is the tensor's published integrity hash, recomputed from
/// the copy at the target; the witness is the worker that performed the
/// verification.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IntegrityProof {
    /// The replicated tensor.
    pub tensor_id: TensorId,
    /// blake3 hash recomputed from the copy.
    pub hash: [u8; 32],
    /// Worker that verified the copy.
    pub witness: WorkerId,
    /// When the copy was verified (unix millis).
    pub timestamp_ms: u64,
}

impl IntegrityProof {
    /// Hash as hex, for logs.
    pub fn hash_hex(&self) -> String {
        hex::encode(self.hash)
    }
}

/// Why a replication attempt to one target failed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum FailureReason {
    /// The copy did not complete within the per-target deadline.
    Timeout,
    /// The copy's recomputed hash did not match the source.
    IntegrityMismatch,
    /// The transport reported an unreachable target.
    Unreachable,
}

impl std::fmt::Display for FailureReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Timeout => write!(f, "timeout"),
            Self::IntegrityMismatch => write!(f, "integrity mismatch"),
            Self::Unreachable => write!(f, "unreachable"),
        }
    }
}

/// A failed replication attempt, reported in the outcome.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReplicaFailure {
    /// The target that failed.
    pub target: WorkerId,
    /// What went wrong.
    pub reason: FailureReason,
}
