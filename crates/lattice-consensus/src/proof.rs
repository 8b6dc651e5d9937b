//! Agreement proofs.
//!
//! Once a proposal reaches a terminal state the engine records a proof:
//! who was invited, who voted how, and the hash of the value that was
//! agreed (when one was). The proof is a durable audit record, not a
//! signed certificate.

use std::collections::BTreeSet;

use serde::{Deserialize, Serialize};

use lattice_topology::WorkerId;

use crate::proposal::{ConsensusProposal, ProposalId, ProposalState, VoteDecision};

/// One voter's entry in an agreement proof. Submitted values are hashed
/// out; only the stance and confidence are retained.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VoteRecord {
    pub voter: WorkerId,
    pub decision: VoteDecision,
    pub confidence: f64,
    pub cast_at_ms: u64,
}

/// The audit record of a terminal consensus round.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AgreementProof {
    /// The proposal this proof covers.
    pub proposal: ProposalId,
    /// The logical key the round decided.
    pub logical_key: String,
    /// Terminal state reached.
    pub state: ProposalState,
    /// Everyone who was invited.
    pub participants: BTreeSet<WorkerId>,
    /// Every vote cast, in voter order.
    pub votes: Vec<VoteRecord>,
    /// blake3 hash of the agreed value (shape + data bytes), when the
    /// round accepted.
    pub value_hash: Option<[u8; 32]>,
    /// When the terminal state was reached (unix millis).
    pub timestamp_ms: u64,
}

impl AgreementProof {
    /// Build a proof from a terminal proposal.
    ///
    /// Callers guarantee the proposal is terminal; an open proposal would
    /// yield a proof with `state == Open`, which downstream code treats
    /// as invalid.
    pub fn from_proposal(proposal: &ConsensusProposal) -> Self {
        let mut votes: Vec<VoteRecord> = proposal
            .votes
            .values()
            .map(|v| VoteRecord {
                voter: v.voter.clone(),
                decision: v.decision,
                confidence: v.confidence,
                cast_at_ms: v.cast_at_ms,
            })
            .collect();
        votes.sort_by(|a, b| a.voter.cmp(&b.voter));

        let value_hash = proposal
            .agreed_value
            .as_ref()
            .map(|data| hash_value(&proposal.shape, data));

        Self {
            proposal: proposal.id,
            logical_key: proposal.logical_key.clone(),
            state: proposal.state,
            participants: proposal.participants.clone(),
            votes,
            value_hash,
            timestamp_ms: proposal.decided_at_ms.unwrap_or(proposal.opened_at_ms),
        }
    }

    /// Agreed-value hash as hex, for logs.
    pub fn value_hash_hex(&self) -> Option<String> {
        self.value_hash.map(hex::encode)
    }

    /// Whether a given value matches the hash this proof committed to.
    pub fn matches_value(&self, shape: &[usize], data: &[f32]) -> bool {
        self.value_hash == Some(hash_value(shape, data))
    }
}

/// blake3 over the canonical encoding of a value: dimension count and
/// dimensions as u64 LE, then the f32 data LE. Matches the tensor
/// integrity encoding so an agreed value hashes identically to the
/// tensor later built from it.
pub(crate) fn hash_value(shape: &[usize], data: &[f32]) -> [u8; 32] {
    let mut hasher = blake3::Hasher::new();
    hasher.update(&(shape.len() as u64).to_le_bytes());
    for dim in shape {
        hasher.update(&(*dim as u64).to_le_bytes());
    }
    for x in data {
        hasher.update(&x.to_le_bytes());
    }
    *hasher.finalize().as_bytes()
}
