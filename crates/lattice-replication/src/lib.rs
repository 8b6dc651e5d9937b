//! Lattice Replication Manager
//!
//! Copies published tensors to additional workers so the loss of any one
//! location does not lose state.
//!
//! # Placement
//!
//! Targets are the active workers nearest the origin (by estimated
//! latency) that still have capacity headroom. Replication is best-effort:
//! if fewer eligible targets exist than the requested factor, the tensor
//! is copied to as many as are available and the outcome reports the
//! effective factor. It never blocks waiting for capacity.
//!
//! # Integrity
//!
//! Every successful copy is re-verified at the target (hash recompute
//! against the source hash) and produces an [`IntegrityProof`] naming the
//! witness worker. A copy that fails verification is discarded and only
//! lowers the effective factor.
//!
//! # Deadlines
//!
//! Each per-target copy runs under a mandatory timeout; a slow target
//! turns into a recorded failure, never a hang.

mod error;
mod manager;
mod proof;
mod transport;

pub use error::{Error, Result};
pub use manager::{ReplicationConfig, ReplicationManager, ReplicationOutcome};
pub use proof::{FailureReason, IntegrityProof, ReplicaFailure};
pub use transport::{LocalTransport, ReplicaTransport};
