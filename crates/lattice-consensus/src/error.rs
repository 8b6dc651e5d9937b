//! Error types for lattice-consensus.

use thiserror::Error;

use lattice_topology::WorkerId;

use crate::proposal::{ProposalId, ProposalState};

/// Result type for lattice-consensus operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Errors that can occur during consensus operations.
#[derive(Debug, Error)]
pub enum Error {
    /// Referenced proposal does not exist.
    #[error("unknown proposal: {0}")]
    UnknownProposal(ProposalId),

    /// Vote from a worker that was not invited to the round.
    #[error("worker {0} was not invited to this proposal")]
    NotInvited(WorkerId),

    /// A second vote from the same worker. First vote wins; allowing
    /// replacement would let a faulty worker walk a proposal across the
    /// threshold repeatedly.
    #[error("worker {0} already voted")]
    DuplicateVote(WorkerId),

    /// The proposal already reached a terminal state.
    #[error("proposal is terminal: {0}")]
    Terminal(ProposalState),

    /// Vote confidence outside [0, 1].
    #[error("confidence {0} outside [0, 1]")]
    InvalidConfidence(f64),

    /// An accept vote must carry a proposed value.
    #[error("accept vote from {0} carries no value")]
    MissingValue(WorkerId),

    /// A submitted value does not match the proposal's shape.
    #[error("submitted value has shape {got:?}, proposal expects {expected:?}")]
    ShapeMismatch {
        expected: Vec<usize>,
        got: Vec<usize>,
    },

    /// A proposal needs at least one invited participant.
    #[error("proposal opened with no participants")]
    NoParticipants,
}
