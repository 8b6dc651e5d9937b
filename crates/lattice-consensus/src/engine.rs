//! The consensus engine: opens rounds, routes votes, finalizes.

use std::collections::{BTreeSet, HashMap};
use std::time::Duration;

use tracing::{debug, info, warn};

use lattice_topology::WorkerId;

use crate::error::{Error, Result};
use crate::proof::AgreementProof;
use crate::proposal::{ConsensusProposal, ProposalId, ProposalState, Vote};

/// Tunables for consensus rounds.
#[derive(Debug, Clone)]
pub struct ConsensusConfig {
    /// How long a proposal stays open without a quorum.
    pub default_deadline: Duration,
    /// Reliability credit for voting with the outcome.
    pub reliability_reward: f64,
    /// Reliability debit for dissenting from the outcome.
    pub reliability_penalty: f64,
}

impl Default for ConsensusConfig {
    fn default() -> Self {
        Self {
            default_deadline: Duration::from_secs(5),
            reliability_reward: 0.02,
            reliability_penalty: 0.05,
        }
    }
}

impl ConsensusConfig {
    #[must_use]
    pub fn with_default_deadline(mut self, deadline: Duration) -> Self {
        self.default_deadline = deadline;
        self
    }

    #[must_use]
    pub fn with_reliability_reward(mut self, reward: f64) -> Self {
        self.reliability_reward = reward;
        self
    }

    #[must_use]
    pub fn with_reliability_penalty(mut self, penalty: f64) -> Self {
        self.reliability_penalty = penalty;
        self
    }
}

/// A snapshot of one proposal's progress, open or terminal.
#[derive(Debug, Clone)]
pub struct ConsensusStatus {
    pub proposal: ProposalId,
    pub logical_key: String,
    pub state: ProposalState,
    pub invited: usize,
    pub votes_cast: usize,
    pub accept_confidence: f64,
    pub reject_confidence: f64,
    pub deadline_ms: u64,
    pub agreed_value: Option<Vec<f32>>,
}

impl ConsensusStatus {
    fn from_proposal(p: &ConsensusProposal) -> Self {
        Self {
            proposal: p.id,
            logical_key: p.logical_key.clone(),
            state: p.state,
            invited: p.invited(),
            votes_cast: p.votes.len(),
            accept_confidence: p.accept_confidence(),
            reject_confidence: p.reject_confidence(),
            deadline_ms: p.deadline_ms,
            agreed_value: p.agreed_value.clone(),
        }
    }
}

/// A finished round: the proof plus the value it committed, if any.
#[derive(Debug, Clone)]
pub struct TerminalRecord {
    pub proof: AgreementProof,
    pub shape: Vec<usize>,
    pub agreed_value: Option<Vec<f32>>,
}

/// Runs consensus rounds over proposed tensor updates.
///
/// The engine is single-owner state; callers drive it with explicit
/// `now_ms` timestamps and poll [`ConsensusEngine::tick`] to expire
/// stale rounds. Reliability adjustments accumulate here and are drained
/// by whoever owns the topology registry.
#[derive(Debug, Default)]
pub struct ConsensusEngine {
    config: ConsensusConfig,
    next_id: u64,
    open: HashMap<ProposalId, ConsensusProposal>,
    history: Vec<TerminalRecord>,
    pending_deltas: Vec<(WorkerId, f64)>,
}

impl ConsensusEngine {
    pub fn new(config: ConsensusConfig) -> Self {
        Self {
            config,
            next_id: 0,
            open: HashMap::new(),
            history: Vec::new(),
            pending_deltas: Vec::new(),
        }
    }

    /// Open a proposal over `participants` for `logical_key`.
    pub fn open_proposal(
        &mut self,
        logical_key: impl Into<String>,
        shape: Vec<usize>,
        participants: BTreeSet<WorkerId>,
        now_ms: u64,
    ) -> Result<ProposalId> {
        let id = ProposalId(self.next_id);
        self.next_id += 1;

        let deadline_ms = now_ms + self.config.default_deadline.as_millis() as u64;
        let proposal =
            ConsensusProposal::new(id, logical_key, shape, participants, now_ms, deadline_ms)?;

        info!(proposal = %id, key = %proposal.logical_key,
            invited = proposal.invited(), deadline_ms, "proposal opened");
        self.open.insert(id, proposal);
        Ok(id)
    }

    /// Route a vote to its proposal.
    ///
    /// Terminal transitions finalize the round immediately: the proof is
    /// appended to history and reliability deltas are queued.
    pub fn vote(&mut self, id: ProposalId, vote: Vote, now_ms: u64) -> Result<ProposalState> {
        let proposal = self.open.get_mut(&id).ok_or(Error::UnknownProposal(id))?;

        let outcome = proposal.record_vote(vote, now_ms);
        // A late vote may have expired the proposal even though the vote
        // itself was refused.
        if proposal.state.is_terminal() {
            self.finalize(id);
        }
        outcome
    }

    /// Expire open proposals past their deadline. Returns the ids that
    /// transitioned this tick.
    pub fn tick(&mut self, now_ms: u64) -> Vec<ProposalId> {
        let expired: Vec<ProposalId> = self
            .open
            .iter_mut()
            .filter_map(|(id, p)| p.check_deadline(now_ms).then_some(*id))
            .collect();

        for id in &expired {
            warn!(proposal = %id, "proposal expired without quorum");
            self.finalize(*id);
        }
        expired
    }

    fn finalize(&mut self, id: ProposalId) {
        let Some(proposal) = self.open.remove(&id) else {
            return;
        };

        self.pending_deltas.extend(proposal.reliability_deltas(
            self.config.reliability_reward,
            self.config.reliability_penalty,
        ));

        let proof = AgreementProof::from_proposal(&proposal);
        debug!(proposal = %id, state = %proposal.state,
            value_hash = ?proof.value_hash_hex(), "round finalized");
        self.history.push(TerminalRecord {
            proof,
            shape: proposal.shape,
            agreed_value: proposal.agreed_value,
        });
    }

    /// Progress snapshot for a proposal, open or finished.
    pub fn status(&self, id: ProposalId) -> Option<ConsensusStatus> {
        if let Some(p) = self.open.get(&id) {
            return Some(ConsensusStatus::from_proposal(p));
        }
        self.history
            .iter()
            .find(|r| r.proof.proposal == id)
            .map(|r| ConsensusStatus {
                proposal: r.proof.proposal,
                logical_key: r.proof.logical_key.clone(),
                state: r.proof.state,
                invited: r.proof.participants.len(),
                votes_cast: r.proof.votes.len(),
                accept_confidence: 0.0,
                reject_confidence: 0.0,
                deadline_ms: r.proof.timestamp_ms,
                agreed_value: r.agreed_value.clone(),
            })
    }

    /// Ids of currently open proposals.
    pub fn open_proposals(&self) -> Vec<ProposalId> {
        self.open.keys().copied().collect()
    }

    /// Open proposals targeting a logical key.
    pub fn open_for_key(&self, logical_key: &str) -> Option<ProposalId> {
        self.open
            .values()
            .find(|p| p.logical_key == logical_key)
            .map(|p| p.id)
    }

    /// All finished rounds, oldest first.
    pub fn history(&self) -> &[TerminalRecord] {
        &self.history
    }

    /// Take the queued reliability adjustments.
    pub fn drain_reliability_deltas(&mut self) -> Vec<(WorkerId, f64)> {
        std::mem::take(&mut self.pending_deltas)
    }

    /// Fraction of finished rounds that accepted. 0.0 with no history.
    pub fn success_rate(&self) -> f64 {
        if self.history.is_empty() {
            return 0.0;
        }
        let accepted = self
            .history
            .iter()
            .filter(|r| r.proof.state == ProposalState::Accepted)
            .count();
        accepted as f64 / self.history.len() as f64
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use lattice_tensor::Tensor;

    fn worker(id: &str) -> WorkerId {
        WorkerId::from(id)
    }

    fn participants(ids: &[&str]) -> BTreeSet<WorkerId> {
        ids.iter().map(|id| worker(id)).collect()
    }

    fn value(data: Vec<f32>, origin: &str) -> Tensor {
        let shape = vec![data.len()];
        Tensor::from_data("v", shape, data, worker(origin), 0)
            .unwrap()
            .publish()
    }

    fn engine() -> ConsensusEngine {
        ConsensusEngine::new(ConsensusConfig::default())
    }

    #[test]
    fn accepted_round_lands_in_history_with_proof() {
        let mut eng = engine();
        let id = eng
            .open_proposal("k", vec![2], participants(&["a", "b", "c"]), 0)
            .unwrap();

        for w in ["a", "b", "c"] {
            let v = Vote::accept(worker(w), 1.0, value(vec![1.0, 2.0], w), 10).unwrap();
            let _ = eng.vote(id, v, 10);
        }

        assert!(eng.open_proposals().is_empty());
        assert_eq!(eng.history().len(), 1);
        let record = &eng.history()[0];
        assert_eq!(record.proof.state, ProposalState::Accepted);
        assert_eq!(record.agreed_value, Some(vec![1.0, 2.0]));
        assert!((eng.success_rate() - 1.0).abs() < 1e-12);
    }

    #[test]
    fn vote_on_unknown_proposal_errors() {
        let mut eng = engine();
        let v = Vote::reject(worker("a"), 1.0, 0).unwrap();
        assert!(matches!(
            eng.vote(ProposalId(99), v, 0),
            Err(Error::UnknownProposal(_))
        ));
    }

    #[test]
    fn tick_expires_stale_rounds() {
        let mut eng = ConsensusEngine::new(
            ConsensusConfig::default().with_default_deadline(Duration::from_millis(100)),
        );
        let id = eng
            .open_proposal("k", vec![1], participants(&["a", "b", "c"]), 0)
            .unwrap();

        assert!(eng.tick(100).is_empty()); // at the deadline, still open
        let expired = eng.tick(101);
        assert_eq!(expired, vec![id]);

        let status = eng.status(id).unwrap();
        assert_eq!(status.state, ProposalState::Expired);
    }

    #[test]
    fn reliability_deltas_are_drained_once() {
        let mut eng = engine();
        let id = eng
            .open_proposal("k", vec![1], participants(&["a", "b", "c", "d"]), 0)
            .unwrap();

        let v = Vote::reject(worker("d"), 1.0, 1).unwrap();
        eng.vote(id, v, 1).unwrap();
        for w in ["a", "b", "c"] {
            let v = Vote::accept(worker(w), 1.0, value(vec![0.5], w), 2).unwrap();
            let _ = eng.vote(id, v, 2);
        }

        let deltas = eng.drain_reliability_deltas();
        assert_eq!(deltas.len(), 4);
        let d = deltas.iter().find(|(w, _)| w == &worker("d")).unwrap();
        assert!(d.1 < 0.0);

        assert!(eng.drain_reliability_deltas().is_empty());
    }

    #[test]
    fn status_tracks_open_progress() {
        let mut eng = engine();
        let id = eng
            .open_proposal("k", vec![1], participants(&["a", "b", "c", "d", "e"]), 0)
            .unwrap();

        let v = Vote::accept(worker("a"), 0.9, value(vec![1.0], "a"), 1).unwrap();
        eng.vote(id, v, 1).unwrap();

        let status = eng.status(id).unwrap();
        assert_eq!(status.state, ProposalState::Open);
        assert_eq!(status.invited, 5);
        assert_eq!(status.votes_cast, 1);
        assert!((status.accept_confidence - 0.9).abs() < 1e-12);
    }

    #[test]
    fn open_for_key_finds_the_round() {
        let mut eng = engine();
        let id = eng
            .open_proposal("weights/l0", vec![1], participants(&["a", "b", "c"]), 0)
            .unwrap();

        assert_eq!(eng.open_for_key("weights/l0"), Some(id));
        assert_eq!(eng.open_for_key("weights/l1"), None);
    }

    #[test]
    fn proposal_ids_are_unique() {
        let mut eng = engine();
        let a = eng
            .open_proposal("k1", vec![1], participants(&["a", "b", "c"]), 0)
            .unwrap();
        let b = eng
            .open_proposal("k2", vec![1], participants(&["a", "b", "c"]), 0)
            .unwrap();
        assert_ne!(a, b);
    }

    #[test]
    fn honest_majority_wins_under_random_faults() {
        use rand::rngs::StdRng;
        use rand::{Rng, SeedableRng};

        let mut rng = StdRng::seed_from_u64(0x1a77);
        let honest_data = vec![10.0f32, -5.0, 0.25];

        for round in 0..50u64 {
            let n = rng.gen_range(4..12usize);
            let f = crate::quorum::max_faulty(n);
            let ids: Vec<WorkerId> = (0..n).map(|i| worker(&format!("w{i}"))).collect();
            let mut eng = engine();
            let id = eng
                .open_proposal(
                    format!("k{round}"),
                    vec![3],
                    ids.iter().cloned().collect(),
                    0,
                )
                .unwrap();

            // faulty voters go first with arbitrary values and stances
            for w in ids.iter().take(f) {
                let confidence: f64 = rng.gen_range(0.0..=1.0);
                let vote = if rng.gen_bool(0.5) {
                    let poison: Vec<f32> =
                        (0..3).map(|_| rng.gen_range(-1e6..1e6)).collect();
                    let t = Tensor::from_data("poison", vec![3], poison, w.clone(), 1)
                        .unwrap()
                        .publish();
                    Vote::accept(w.clone(), confidence, t, 1).unwrap()
                } else {
                    Vote::reject(w.clone(), confidence, 1).unwrap()
                };
                eng.vote(id, vote, 1).unwrap();
            }
            for w in ids.iter().skip(f) {
                let t = Tensor::from_data("honest", vec![3], honest_data.clone(), w.clone(), 2)
                    .unwrap()
                    .publish();
                let vote = Vote::accept(w.clone(), 1.0, t, 2).unwrap();
                let _ = eng.vote(id, vote, 2);
            }

            let record = eng
                .history()
                .iter()
                .find(|r| r.proof.proposal == id)
                .expect("round should terminate");
            assert_eq!(record.proof.state, ProposalState::Accepted);
            assert_eq!(record.agreed_value.as_deref(), Some(honest_data.as_slice()));
        }
    }

    #[test]
    fn empty_participants_refused() {
        let mut eng = engine();
        assert!(matches!(
            eng.open_proposal("k", vec![1], BTreeSet::new(), 0),
            Err(Error::NoParticipants)
        ));
    }
}
