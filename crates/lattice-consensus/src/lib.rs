//! Lattice Consensus Engine
//!
//! Quorum voting over proposed tensor updates. When several workers claim
//! to know the next value for the same logical key, the mesh does not pick
//! a winner by fiat — it runs a round and agrees.
//!
//! # Quorum Rule
//!
//! Votes carry a confidence in [0, 1]. A proposal with `n` invited
//! participants is:
//!
//! - **accepted** the instant Σ accept-confidence / n exceeds 2/3 — the
//!   standard Byzantine threshold, tolerating up to ⌊(n−1)/3⌋ faulty
//!   participants;
//! - **rejected** if Σ reject-confidence exceeds n/3 first;
//! - **expired** if neither happens by the deadline.
//!
//! # Agreed Value
//!
//! The agreed value is the confidence-weighted *element-wise median* of
//! the accepting voters' submitted values — median, not mean, so a
//! minority of arbitrary (faulty) submissions cannot drag the result.
//!
//! # Proofs
//!
//! Every terminal proposal emits an [`AgreementProof`]: participants,
//! votes, the blake3 hash of the agreed value, and a timestamp. Proofs
//! are not cryptographically signed; the quorum arithmetic itself is the
//! contract, and signature verification belongs to a transport layer
//! outside this crate.

mod engine;
mod error;
mod median;
mod proof;
mod proposal;
mod quorum;

pub use engine::{ConsensusConfig, ConsensusEngine, ConsensusStatus, TerminalRecord};
pub use error::{Error, Result};
pub use median::weighted_elementwise_median;
pub use proof::{AgreementProof, VoteRecord};
pub use proposal::{ConsensusProposal, ProposalId, ProposalState, Vote, VoteDecision};
pub use quorum::{accept_quorum, max_faulty, reject_quorum};

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn quorum_thresholds_are_strict() {
        // 4 participants, 3 accept with confidence 1.0: 3/4 = 0.75 > 2/3
        assert!(accept_quorum(3.0, 4));
        // 2 of 3 at full confidence is not enough: 2/3 is not > 2/3
        assert!(!accept_quorum(2.0, 3));
    }
}
