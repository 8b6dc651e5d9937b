//! The per-proposal state machine: `Open -> {Accepted | Rejected | Expired}`.

use std::collections::{BTreeSet, HashMap};

use serde::{Deserialize, Serialize};
use tracing::debug;

use lattice_tensor::Tensor;
use lattice_topology::WorkerId;

use crate::error::{Error, Result};
use crate::median::weighted_elementwise_median;
use crate::quorum::{accept_quorum, reject_quorum};

/// Unique proposal identifier, assigned by the engine.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ProposalId(pub u64);

impl std::fmt::Display for ProposalId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "proposal-{}", self.0)
    }
}

/// A participant's stance on a proposal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum VoteDecision {
    /// Endorse the update; must carry a proposed value.
    Accept,
    /// Oppose the update.
    Reject,
    /// Decline to take a position. Counts toward neither quorum.
    Abstain,
}

impl std::fmt::Display for VoteDecision {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Accept => write!(f, "accept"),
            Self::Reject => write!(f, "reject"),
            Self::Abstain => write!(f, "abstain"),
        }
    }
}

/// A single vote in a consensus round.
#[derive(Debug, Clone)]
pub struct Vote {
    /// The voting worker.
    pub voter: WorkerId,
    /// Accept, reject, or abstain.
    pub decision: VoteDecision,
    /// How sure the voter is, in [0, 1].
    pub confidence: f64,
    /// The voter's proposed value; required for accept votes.
    pub value: Option<Tensor>,
    /// When the vote was cast (unix millis).
    pub cast_at_ms: u64,
}

impl Vote {
    /// Create a validated vote.
    pub fn new(
        voter: WorkerId,
        decision: VoteDecision,
        confidence: f64,
        value: Option<Tensor>,
        cast_at_ms: u64,
    ) -> Result<Self> {
        if !(0.0..=1.0).contains(&confidence) || confidence.is_nan() {
            return Err(Error::InvalidConfidence(confidence));
        }
        if decision == VoteDecision::Accept && value.is_none() {
            return Err(Error::MissingValue(voter));
        }
        Ok(Self {
            voter,
            decision,
            confidence,
            value,
            cast_at_ms,
        })
    }

    /// Convenience constructor for an accept vote.
    pub fn accept(voter: WorkerId, confidence: f64, value: Tensor, now_ms: u64) -> Result<Self> {
        Self::new(voter, VoteDecision::Accept, confidence, Some(value), now_ms)
    }

    /// Convenience constructor for a reject vote.
    pub fn reject(voter: WorkerId, confidence: f64, now_ms: u64) -> Result<Self> {
        Self::new(voter, VoteDecision::Reject, confidence, None, now_ms)
    }

    /// Convenience constructor for an abstention.
    pub fn abstain(voter: WorkerId, now_ms: u64) -> Result<Self> {
        Self::new(voter, VoteDecision::Abstain, 0.0, None, now_ms)
    }
}

/// Proposal lifecycle state. Terminal states are final: a proposal
/// transitions out of `Open` exactly once.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ProposalState {
    /// Accepting votes until the deadline.
    Open,
    /// Accept quorum reached; an agreed value exists.
    Accepted,
    /// Reject quorum reached first.
    Rejected,
    /// Deadline passed without either quorum.
    Expired,
}

impl ProposalState {
    /// Whether this state is final.
    pub fn is_terminal(&self) -> bool {
        !matches!(self, Self::Open)
    }
}

impl std::fmt::Display for ProposalState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Open => write!(f, "open"),
            Self::Accepted => write!(f, "accepted"),
            Self::Rejected => write!(f, "rejected"),
            Self::Expired => write!(f, "expired"),
        }
    }
}

/// A candidate tensor update under vote by a set of invited workers.
#[derive(Debug, Clone)]
pub struct ConsensusProposal {
    /// Unique id.
    pub id: ProposalId,
    /// The logical key this update targets.
    pub logical_key: String,
    /// Expected value shape; accept votes must match it.
    pub shape: Vec<usize>,
    /// Invited participants. Only they may vote.
    pub participants: BTreeSet<WorkerId>,
    /// Voting deadline (unix millis).
    pub deadline_ms: u64,
    /// Votes recorded so far, one per participant.
    pub votes: HashMap<WorkerId, Vote>,
    /// Current lifecycle state.
    pub state: ProposalState,
    /// When the proposal opened (unix millis).
    pub opened_at_ms: u64,
    /// When a terminal state was reached.
    pub decided_at_ms: Option<u64>,
    /// The agreed value, present once accepted.
    pub agreed_value: Option<Vec<f32>>,
}

impl ConsensusProposal {
    /// Open a new proposal.
    pub fn new(
        id: ProposalId,
        logical_key: impl Into<String>,
        shape: Vec<usize>,
        participants: BTreeSet<WorkerId>,
        opened_at_ms: u64,
        deadline_ms: u64,
    ) -> Result<Self> {
        if participants.is_empty() {
            return Err(Error::NoParticipants);
        }
        Ok(Self {
            id,
            logical_key: logical_key.into(),
            shape,
            participants,
            deadline_ms,
            votes: HashMap::new(),
            state: ProposalState::Open,
            opened_at_ms,
            decided_at_ms: None,
            agreed_value: None,
        })
    }

    /// Number of invited participants.
    pub fn invited(&self) -> usize {
        self.participants.len()
    }

    /// Summed accept confidence.
    pub fn accept_confidence(&self) -> f64 {
        self.confidence_for(VoteDecision::Accept)
    }

    /// Summed reject confidence.
    pub fn reject_confidence(&self) -> f64 {
        self.confidence_for(VoteDecision::Reject)
    }

    fn confidence_for(&self, decision: VoteDecision) -> f64 {
        self.votes
            .values()
            .filter(|v| v.decision == decision)
            .map(|v| v.confidence)
            .sum()
    }

    /// Record a vote and evaluate the quorum predicates.
    ///
    /// Returns the (possibly new) state. Votes after a terminal state or
    /// the deadline are refused; a late vote first drives the proposal to
    /// `Expired` so the terminal-once invariant holds.
    pub fn record_vote(&mut self, vote: Vote, now_ms: u64) -> Result<ProposalState> {
        if self.state.is_terminal() {
            return Err(Error::Terminal(self.state));
        }
        if now_ms > self.deadline_ms {
            self.expire(now_ms);
            return Err(Error::Terminal(self.state));
        }
        if !self.participants.contains(&vote.voter) {
            return Err(Error::NotInvited(vote.voter));
        }
        if self.votes.contains_key(&vote.voter) {
            return Err(Error::DuplicateVote(vote.voter));
        }
        if let Some(value) = &vote.value {
            if value.shape != self.shape {
                return Err(Error::ShapeMismatch {
                    expected: self.shape.clone(),
                    got: value.shape.clone(),
                });
            }
        }

        debug!(proposal = %self.id, voter = %vote.voter, decision = %vote.decision,
            confidence = vote.confidence, "vote recorded");
        self.votes.insert(vote.voter.clone(), vote);
        self.evaluate(now_ms);
        Ok(self.state)
    }

    /// Check the quorum predicates and transition if one is satisfied.
    fn evaluate(&mut self, now_ms: u64) {
        let n = self.invited();

        if accept_quorum(self.accept_confidence(), n) {
            self.agreed_value = Some(self.compute_agreed_value());
            self.state = ProposalState::Accepted;
            self.decided_at_ms = Some(now_ms);
            debug!(proposal = %self.id, "accept quorum reached");
        } else if reject_quorum(self.reject_confidence(), n) {
            self.state = ProposalState::Rejected;
            self.decided_at_ms = Some(now_ms);
            debug!(proposal = %self.id, "reject quorum reached");
        }
    }

    /// Expire the proposal if it is open and past its deadline.
    /// Returns true if a transition happened.
    pub fn check_deadline(&mut self, now_ms: u64) -> bool {
        if self.state == ProposalState::Open && now_ms > self.deadline_ms {
            self.expire(now_ms);
            true
        } else {
            false
        }
    }

    fn expire(&mut self, now_ms: u64) {
        self.state = ProposalState::Expired;
        self.decided_at_ms = Some(now_ms);
        debug!(proposal = %self.id, "proposal expired");
    }

    /// Confidence-weighted element-wise median over accepting voters'
    /// submitted values.
    fn compute_agreed_value(&self) -> Vec<f32> {
        let contributions: Vec<(f64, &[f32])> = self
            .votes
            .values()
            .filter(|v| v.decision == VoteDecision::Accept)
            .filter_map(|v| v.value.as_ref().map(|t| (v.confidence, t.data.as_slice())))
            .collect();
        weighted_elementwise_median(&contributions)
    }

    /// Per-voter reliability deltas for a terminal proposal.
    ///
    /// Voters who matched the outcome gain `reward`; voters who dissented
    /// from an accepted/rejected outcome lose `penalty`. Abstainers,
    /// non-voters, and expired proposals adjust nothing.
    pub fn reliability_deltas(&self, reward: f64, penalty: f64) -> Vec<(WorkerId, f64)> {
        let winning = match self.state {
            ProposalState::Accepted => VoteDecision::Accept,
            ProposalState::Rejected => VoteDecision::Reject,
            ProposalState::Open | ProposalState::Expired => return Vec::new(),
        };

        self.votes
            .values()
            .filter_map(|v| match v.decision {
                VoteDecision::Abstain => None,
                d if d == winning => Some((v.voter.clone(), reward)),
                _ => Some((v.voter.clone(), -penalty)),
            })
            .collect()
    }
}
