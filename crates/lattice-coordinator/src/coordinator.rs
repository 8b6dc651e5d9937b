//! The coordinator proper: owns one instance of every component and
//! drives the submission → consensus → memory flow.

use std::collections::{BTreeSet, HashMap};
use std::time::Duration;

use serde::Serialize;
use tokio::sync::{Mutex, RwLock};
use tracing::{debug, info, warn};

use lattice_attention::{AttentionAggregator, AttentionConfig};
use lattice_consensus::{
    ConsensusConfig, ConsensusEngine, ConsensusStatus, ProposalId, ProposalState, TerminalRecord,
    Vote, VoteDecision,
};
use lattice_memory::{
    default_importance, MemoryConfig, MemoryConsolidator, MemoryMatch, MemoryStats, PassReport,
};
use lattice_replication::{ReplicationConfig, ReplicationManager};
use lattice_tensor::{Tensor, TensorId, TensorStore};
use lattice_topology::{TopologyConfig, TopologyRegistry, WorkerDescriptor, WorkerId};

use crate::backoff::Backoff;
use crate::batch::BatchWindow;
use crate::error::{Error, Result};
use crate::health::{HealthMonitor, WorkerHealth};

/// Origin assigned to tensors the coordinator materializes itself when
/// no suitable worker remains registered.
pub const COORDINATOR_ID: &str = "lattice-coordinator";

/// Coordinator-level tunables plus the component configs it constructs
/// with. One config tree, no globals.
#[derive(Debug, Clone)]
pub struct CoordinatorConfig {
    pub topology: TopologyConfig,
    pub replication: ReplicationConfig,
    pub attention: AttentionConfig,
    pub consensus: ConsensusConfig,
    pub memory: MemoryConfig,
    /// How long submissions to one logical key are batched before a
    /// contended key opens a consensus round.
    pub batch_window: Duration,
    /// Interval between memory consolidation passes.
    pub consolidation_interval: Duration,
    /// Replication factor for committed (agreed) tensors.
    pub commit_replication_factor: usize,
    /// Retry schedule for consensus rounds that expire without quorum.
    pub backoff: Backoff,
}

impl Default for CoordinatorConfig {
    fn default() -> Self {
        Self {
            topology: TopologyConfig::default(),
            replication: ReplicationConfig::default(),
            attention: AttentionConfig::default(),
            consensus: ConsensusConfig::default(),
            memory: MemoryConfig::default(),
            batch_window: Duration::from_millis(500),
            consolidation_interval: Duration::from_secs(10),
            commit_replication_factor: 3,
            backoff: Backoff::default(),
        }
    }
}

impl CoordinatorConfig {
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn with_batch_window(mut self, window: Duration) -> Self {
        self.batch_window = window;
        self
    }

    #[must_use]
    pub fn with_consolidation_interval(mut self, interval: Duration) -> Self {
        self.consolidation_interval = interval;
        self
    }

    #[must_use]
    pub fn with_commit_replication_factor(mut self, factor: usize) -> Self {
        self.commit_replication_factor = factor;
        self
    }

    #[must_use]
    pub fn with_backoff(mut self, backoff: Backoff) -> Self {
        self.backoff = backoff;
        self
    }

    #[must_use]
    pub fn with_consensus(mut self, consensus: ConsensusConfig) -> Self {
        self.consensus = consensus;
        self
    }

    #[must_use]
    pub fn with_memory(mut self, memory: MemoryConfig) -> Self {
        self.memory = memory;
        self
    }

    #[must_use]
    pub fn with_topology(mut self, topology: TopologyConfig) -> Self {
        self.topology = topology;
        self
    }
}

/// Acknowledgement for a submitted tensor.
#[derive(Debug, Clone, Serialize)]
pub struct SubmitAck {
    pub tensor_id: TensorId,
    pub version: u64,
    pub requested_factor: usize,
    pub effective_factor: usize,
}

impl SubmitAck {
    pub fn is_degraded(&self) -> bool {
        self.effective_factor < self.requested_factor
    }
}

/// Answer to an aggregate query: the combined tensor plus its quality
/// indicators.
#[derive(Debug, Clone)]
pub struct AggregateView {
    pub tensor: Tensor,
    pub contributing_workers: Vec<WorkerId>,
    /// Fraction of recorded contributions that made it into the result.
    pub confidence: f64,
    pub fallback: bool,
}

/// A registered worker, summarized for external callers.
#[derive(Debug, Clone, Serialize)]
pub struct WorkerSummary {
    pub id: WorkerId,
    pub active: bool,
    pub capacity: f64,
    pub load: f64,
    pub reliability: f64,
    pub specializations: Vec<String>,
}

/// Read-only view of aggregate network state. Serializable; the
/// embedding HTTP layer owns the wire format.
#[derive(Debug, Clone, Serialize)]
pub struct NetworkSnapshot {
    pub worker_count: usize,
    pub active_worker_count: usize,
    pub tensor_count: usize,
    pub total_replicas: usize,
    /// Last agreed tensor per logical key.
    pub committed: HashMap<String, TensorId>,
    pub consensus_success_rate: f64,
    pub open_proposals: usize,
    pub memory: MemoryStats,
}

/// What one `tick` did.
#[derive(Debug, Clone, Default)]
pub struct TickReport {
    pub expired_workers: Vec<WorkerId>,
    pub opened_proposals: Vec<ProposalId>,
    pub expired_proposals: Vec<ProposalId>,
    pub committed_keys: Vec<String>,
    pub reliability_adjustments: usize,
    pub consolidation: Option<PassReport>,
}

#[derive(Debug)]
struct RetryState {
    attempt: u32,
    due_at_ms: u64,
    shape: Vec<usize>,
    participants: BTreeSet<WorkerId>,
}

/// Bookkeeping that only `tick` touches.
#[derive(Debug, Default)]
struct DriveState {
    history_seen: usize,
    retries: HashMap<String, RetryState>,
    last_consolidation_ms: u64,
    committed: HashMap<String, TensorId>,
    commit_seq: u64,
}

/// Owns the component instances and wires them together. See the crate
/// docs for the flow.
pub struct Coordinator {
    config: CoordinatorConfig,
    registry: RwLock<TopologyRegistry>,
    store: RwLock<TensorStore>,
    replication: Mutex<ReplicationManager>,
    aggregator: AttentionAggregator,
    consensus: Mutex<ConsensusEngine>,
    memory: Mutex<MemoryConsolidator>,
    batches: Mutex<BatchWindow>,
    /// Latest contribution per worker per logical key.
    contributions: RwLock<HashMap<String, HashMap<WorkerId, TensorId>>>,
    health: Mutex<HealthMonitor>,
    drive: Mutex<DriveState>,
}

impl Coordinator {
    pub fn new(config: CoordinatorConfig) -> Self {
        let batch_window_ms = config.batch_window.as_millis() as u64;
        Self {
            registry: RwLock::new(TopologyRegistry::new(config.topology.clone())),
            store: RwLock::new(TensorStore::new()),
            replication: Mutex::new(ReplicationManager::new(config.replication.clone())),
            aggregator: AttentionAggregator::new(config.attention.clone()),
            consensus: Mutex::new(ConsensusEngine::new(config.consensus.clone())),
            memory: Mutex::new(MemoryConsolidator::new(config.memory.clone())),
            batches: Mutex::new(BatchWindow::new(batch_window_ms)),
            contributions: RwLock::new(HashMap::new()),
            health: Mutex::new(HealthMonitor::new()),
            drive: Mutex::new(DriveState::default()),
            config,
        }
    }

    // --- admin -----------------------------------------------------------

    /// Register a worker. Returns true when the worker is new.
    pub async fn register_worker(&self, desc: WorkerDescriptor, now_ms: u64) -> Result<bool> {
        let new = self.registry.write().await.register(desc, now_ms)?;
        Ok(new)
    }

    /// Remove a worker entirely.
    pub async fn deregister_worker(&self, id: &WorkerId) -> Result<()> {
        self.registry.write().await.deregister(id)?;
        self.health.lock().await.forget(id);
        Ok(())
    }

    /// Record a liveness signal from a worker.
    pub async fn heartbeat(&self, id: &WorkerId, now_ms: u64) -> Result<()> {
        self.registry.write().await.heartbeat(id, now_ms)?;
        Ok(())
    }

    pub async fn list_workers(&self) -> Vec<WorkerSummary> {
        let registry = self.registry.read().await;
        let mut summaries: Vec<WorkerSummary> = registry
            .workers()
            .map(|w| {
                let mut specializations: Vec<String> =
                    w.specializations.iter().cloned().collect();
                specializations.sort();
                WorkerSummary {
                    id: w.id.clone(),
                    active: w.active,
                    capacity: w.capacity,
                    load: w.load,
                    reliability: w.reliability,
                    specializations,
                }
            })
            .collect();
        summaries.sort_by(|a, b| a.id.cmp(&b.id));
        summaries
    }

    /// Consensus-derived health view per worker.
    pub async fn worker_health(&self) -> Vec<WorkerHealth> {
        self.health.lock().await.report()
    }

    // --- ingress ---------------------------------------------------------

    /// Accept a locally computed tensor for a logical key.
    ///
    /// The tensor is published (if the worker did not), stored,
    /// replicated toward its requested factor, and noted in the key's
    /// batching window. The ack reports the assigned version and the
    /// achieved replication factor; a degraded factor is visible, not an
    /// error.
    pub async fn submit_local_tensor(
        &self,
        worker: &WorkerId,
        logical_key: &str,
        tensor: Tensor,
        now_ms: u64,
    ) -> Result<SubmitAck> {
        if &tensor.origin != worker {
            return Err(Error::OriginMismatch {
                claimed: worker.clone(),
                actual: tensor.origin,
            });
        }

        // unknown workers fail fast before anything is stored
        self.registry.read().await.get(worker)?;

        let tensor = if tensor.is_published() {
            tensor
        } else {
            tensor.publish()
        };
        let requested_factor = tensor.replication_factor.max(1);

        self.store.write().await.insert(tensor.clone())?;

        let outcome = {
            let registry = self.registry.read().await;
            // fails fast on an unknown worker before any copies move
            let mut replication = self.replication.lock().await;
            replication
                .replicate(&tensor, requested_factor, &registry, now_ms)
                .await?
        };

        self.batches
            .lock()
            .await
            .note(logical_key, worker.clone(), tensor.id.clone(), now_ms);
        self.contributions
            .write()
            .await
            .entry(logical_key.to_owned())
            .or_default()
            .insert(worker.clone(), tensor.id.clone());

        debug!(worker = %worker, key = logical_key, tensor = %tensor.id,
            effective = outcome.effective_factor, "tensor submitted");
        Ok(SubmitAck {
            tensor_id: tensor.id,
            version: tensor.version,
            requested_factor,
            effective_factor: outcome.effective_factor,
        })
    }

    // --- egress ----------------------------------------------------------

    /// Attention-weighted aggregate over the recorded contributions for
    /// a logical key, optionally restricted to workers carrying a
    /// specialization tag.
    pub async fn get_aggregate(
        &self,
        logical_key: &str,
        tag: Option<&str>,
        now_ms: u64,
    ) -> Result<AggregateView> {
        let contributions = self.contributions.read().await;
        let recorded = contributions
            .get(logical_key)
            .ok_or_else(|| Error::NoCandidates(logical_key.to_owned()))?;

        let registry = self.registry.read().await;
        let store = self.store.read().await;

        let mut candidates: Vec<Tensor> = Vec::new();
        for (worker, tensor_id) in recorded {
            let Ok(node) = registry.get(worker) else {
                continue; // deregistered since contributing
            };
            if !node.active {
                continue;
            }
            if let Some(tag) = tag {
                if !node.has_tag(tag) {
                    continue;
                }
            }
            if let Ok(tensor) = store.get(tensor_id) {
                candidates.push(tensor.clone());
            }
        }
        let total = recorded.len();
        drop(contributions);

        let query = candidates
            .iter()
            .max_by_key(|t| t.created_at_ms)
            .cloned()
            .ok_or_else(|| Error::NoCandidates(logical_key.to_owned()))?;
        drop(store);

        let result_id = format!("{logical_key}@{now_ms}");
        let outcome = self
            .aggregator
            .aggregate(&query, &candidates, &registry, result_id, now_ms)?;

        let contributing_workers: Vec<WorkerId> = outcome
            .weights
            .entries()
            .iter()
            .map(|w| w.worker.clone())
            .collect();
        let confidence = if total == 0 {
            0.0
        } else {
            outcome.contributing as f64 / total as f64
        };

        Ok(AggregateView {
            tensor: outcome.tensor.publish(),
            contributing_workers,
            confidence,
            fallback: outcome.fallback,
        })
    }

    /// Cast a vote in an open consensus round.
    pub async fn cast_vote(
        &self,
        proposal: ProposalId,
        vote: Vote,
        now_ms: u64,
    ) -> Result<ProposalState> {
        let state = self.consensus.lock().await.vote(proposal, vote, now_ms)?;
        Ok(state)
    }

    pub async fn get_consensus_status(&self, proposal: ProposalId) -> Option<ConsensusStatus> {
        self.consensus.lock().await.status(proposal)
    }

    /// The memory graph's nearest remembered tensors to `probe`.
    pub async fn query_memory(
        &self,
        probe: &Tensor,
        top_k: usize,
        now_ms: u64,
    ) -> Vec<MemoryMatch> {
        self.memory.lock().await.query(probe, top_k, now_ms)
    }

    /// Read-only aggregate network state.
    pub async fn snapshot(&self) -> NetworkSnapshot {
        let registry = self.registry.read().await;
        let consensus = self.consensus.lock().await;
        let drive = self.drive.lock().await;
        NetworkSnapshot {
            worker_count: registry.len(),
            active_worker_count: registry.active_workers().count(),
            tensor_count: self.store.read().await.len(),
            total_replicas: self.replication.lock().await.total_replicas(),
            committed: drive.committed.clone(),
            consensus_success_rate: consensus.success_rate(),
            open_proposals: consensus.open_proposals().len(),
            memory: self.memory.lock().await.stats(),
        }
    }

    // --- periodic driving ------------------------------------------------

    /// Advance all time-based machinery to `now_ms`.
    ///
    /// One call drives: worker silence expiry, batch-window flushing
    /// (opening consensus rounds for contended keys), consensus deadline
    /// expiry, committing accepted rounds, applying reliability deltas,
    /// bounded retry of expired rounds, and scheduled consolidation.
    pub async fn tick(&self, now_ms: u64) -> TickReport {
        let mut report = TickReport::default();

        report.expired_workers = self.registry.write().await.expire_silent(now_ms);

        self.flush_batches(now_ms, &mut report).await;

        {
            let mut consensus = self.consensus.lock().await;
            report.expired_proposals = consensus.tick(now_ms);
        }

        self.process_terminal_rounds(now_ms, &mut report).await;
        self.apply_reliability_deltas(&mut report).await;
        self.retry_due_rounds(now_ms, &mut report).await;
        self.maybe_consolidate(now_ms, &mut report).await;

        report
    }

    /// Close elapsed batch windows; contended keys open consensus rounds
    /// over their proposers.
    async fn flush_batches(&self, now_ms: u64, report: &mut TickReport) {
        let flushed = self.batches.lock().await.flush(now_ms);
        if flushed.is_empty() {
            return;
        }

        let registry = self.registry.read().await;
        let store = self.store.read().await;
        let mut consensus = self.consensus.lock().await;

        for batch in flushed {
            if !batch.is_contended() {
                continue; // a lone submission stands as-is
            }
            let participants: BTreeSet<WorkerId> = batch
                .proposers
                .iter()
                .filter(|(w, _)| registry.get(w).map(|n| n.active).unwrap_or(false))
                .map(|(w, _)| w.clone())
                .collect();
            if participants.len() < 2 {
                debug!(key = %batch.logical_key, "contention evaporated, no round opened");
                continue;
            }
            let Some(shape) = batch
                .proposers
                .iter()
                .find_map(|(_, id)| store.get(id).ok().map(|t| t.shape.clone()))
            else {
                continue;
            };

            match consensus.open_proposal(&batch.logical_key, shape, participants, now_ms) {
                Ok(id) => report.opened_proposals.push(id),
                Err(err) => warn!(key = %batch.logical_key, %err, "failed to open round"),
            }
        }
    }

    /// Fold newly finished rounds into the rest of the system: health
    /// marks, committed tensors, memory submissions, retry scheduling.
    async fn process_terminal_rounds(&self, now_ms: u64, report: &mut TickReport) {
        let records: Vec<TerminalRecord> = {
            let consensus = self.consensus.lock().await;
            let mut drive = self.drive.lock().await;
            let fresh = consensus.history()[drive.history_seen..].to_vec();
            drive.history_seen = consensus.history().len();
            fresh
        };

        for record in records {
            self.mark_health(&record, now_ms).await;
            match record.proof.state {
                ProposalState::Accepted => {
                    self.commit_round(&record, now_ms, report).await;
                    self.clear_retry(&record.proof.logical_key).await;
                }
                ProposalState::Rejected => {
                    self.clear_retry(&record.proof.logical_key).await;
                }
                ProposalState::Expired => {
                    self.schedule_retry(&record, now_ms).await;
                }
                ProposalState::Open => {}
            }
        }
    }

    async fn mark_health(&self, record: &TerminalRecord, now_ms: u64) {
        let winning = match record.proof.state {
            ProposalState::Accepted => VoteDecision::Accept,
            ProposalState::Rejected => VoteDecision::Reject,
            // no blame for a round nobody could finish
            ProposalState::Open | ProposalState::Expired => return,
        };
        let mut health = self.health.lock().await;
        for vote in &record.proof.votes {
            match vote.decision {
                VoteDecision::Abstain => {}
                d if d == winning => health.mark_success(&vote.voter, now_ms),
                _ => health.mark_failure(&vote.voter),
            }
        }
    }

    /// Materialize an accepted round's agreed value: store it, replicate
    /// it, and hand it to the memory consolidator.
    async fn commit_round(&self, record: &TerminalRecord, now_ms: u64, report: &mut TickReport) {
        let Some(data) = record.agreed_value.clone() else {
            return;
        };
        let key = record.proof.logical_key.clone();

        // the agreed tensor is attributed to the most confident accepting
        // voter still registered, falling back to the coordinator itself
        let registry = self.registry.read().await;
        let origin = record
            .proof
            .votes
            .iter()
            .filter(|v| v.decision == VoteDecision::Accept)
            .filter(|v| registry.get(&v.voter).map(|n| n.active).unwrap_or(false))
            .max_by(|a, b| {
                a.confidence
                    .partial_cmp(&b.confidence)
                    .unwrap_or(std::cmp::Ordering::Equal)
            })
            .map(|v| v.voter.clone())
            .unwrap_or_else(|| WorkerId::from(COORDINATOR_ID));

        let commit_id = {
            let mut drive = self.drive.lock().await;
            drive.commit_seq += 1;
            format!("{key}#agreed-{}", drive.commit_seq)
        };
        let tensor = match Tensor::from_data(
            commit_id.as_str(),
            record.shape.clone(),
            data,
            origin.clone(),
            now_ms,
        ) {
            Ok(t) => t
                .with_replication_factor(self.config.commit_replication_factor.max(1))
                .publish(),
            Err(err) => {
                warn!(key = %key, %err, "agreed value could not be materialized");
                return;
            }
        };

        if let Err(err) = self.store.write().await.insert(tensor.clone()) {
            warn!(key = %key, %err, "committed tensor not stored");
            return;
        }

        // best-effort replication; a coordinator-attributed tensor has no
        // registered origin and simply stays unreplicated
        let locations = if registry.contains(&origin) {
            let mut replication = self.replication.lock().await;
            match replication
                .replicate(&tensor, tensor.replication_factor, &registry, now_ms)
                .await
            {
                Ok(outcome) => outcome.locations,
                Err(err) => {
                    warn!(key = %key, %err, "committed tensor not replicated");
                    Vec::new()
                }
            }
        } else {
            Vec::new()
        };
        drop(registry);

        let importance = default_importance(record.proof.votes.len() as u64);
        if let Err(err) = self
            .memory
            .lock()
            .await
            .submit(tensor.clone(), importance, locations)
        {
            warn!(key = %key, %err, "committed tensor not remembered");
        }

        info!(key = %key, tensor = %tensor.id, proposal = %record.proof.proposal,
            "agreed value committed");
        self.drive
            .lock()
            .await
            .committed
            .insert(key.clone(), tensor.id);
        report.committed_keys.push(key);
    }

    async fn clear_retry(&self, logical_key: &str) {
        self.drive.lock().await.retries.remove(logical_key);
    }

    /// Queue a bounded-backoff retry for a round that expired.
    async fn schedule_retry(&self, record: &TerminalRecord, now_ms: u64) {
        let key = record.proof.logical_key.clone();
        let mut drive = self.drive.lock().await;
        let attempt = drive.retries.get(&key).map(|r| r.attempt).unwrap_or(0);

        match self.config.backoff.delay(attempt) {
            Some(delay) => {
                let due_at_ms = now_ms + delay.as_millis() as u64;
                debug!(key = %key, attempt, due_at_ms, "retry scheduled");
                drive.retries.insert(
                    key,
                    RetryState {
                        attempt: attempt + 1,
                        due_at_ms,
                        shape: record.shape.clone(),
                        participants: record.proof.participants.clone(),
                    },
                );
            }
            None => {
                warn!(key = %key, attempt, "retry budget exhausted, giving up");
                drive.retries.remove(&key);
            }
        }
    }

    async fn retry_due_rounds(&self, now_ms: u64, report: &mut TickReport) {
        let due: Vec<(String, Vec<usize>, BTreeSet<WorkerId>)> = {
            let drive = self.drive.lock().await;
            drive
                .retries
                .iter()
                .filter(|(_, r)| r.due_at_ms <= now_ms)
                .map(|(key, r)| (key.clone(), r.shape.clone(), r.participants.clone()))
                .collect()
        };
        if due.is_empty() {
            return;
        }

        let registry = self.registry.read().await;
        let mut consensus = self.consensus.lock().await;
        for (key, shape, participants) in due {
            if consensus.open_for_key(&key).is_some() {
                continue;
            }
            let alive: BTreeSet<WorkerId> = participants
                .into_iter()
                .filter(|w| registry.get(w).map(|n| n.active).unwrap_or(false))
                .collect();
            if alive.len() < 2 {
                debug!(key = %key, "retry dropped, too few live participants");
                self.drive.lock().await.retries.remove(&key);
                continue;
            }
            match consensus.open_proposal(&key, shape, alive, now_ms) {
                Ok(id) => {
                    info!(key = %key, proposal = %id, "round reopened after expiry");
                    report.opened_proposals.push(id);
                    // leave the retry entry; it is cleared on a terminal
                    // accept/reject or rescheduled on another expiry
                }
                Err(err) => warn!(key = %key, %err, "retry failed to open round"),
            }
        }
    }

    async fn apply_reliability_deltas(&self, report: &mut TickReport) {
        let deltas = self.consensus.lock().await.drain_reliability_deltas();
        if deltas.is_empty() {
            return;
        }
        let mut registry = self.registry.write().await;
        for (worker, delta) in deltas {
            match registry.adjust_reliability(&worker, delta) {
                Ok(()) => report.reliability_adjustments += 1,
                // the worker may have deregistered mid-round
                Err(err) => debug!(worker = %worker, %err, "reliability delta dropped"),
            }
        }
    }

    async fn maybe_consolidate(&self, now_ms: u64, report: &mut TickReport) {
        let interval_ms = self.config.consolidation_interval.as_millis() as u64;
        {
            let mut drive = self.drive.lock().await;
            if now_ms < drive.last_consolidation_ms + interval_ms {
                return;
            }
            drive.last_consolidation_ms = now_ms;
        }

        let pass = self.memory.lock().await.run_pass(now_ms);
        if !pass.evicted.is_empty() {
            let mut replication = self.replication.lock().await;
            for eviction in &pass.evicted {
                let released = replication.release(&eviction.id);
                debug!(node = %eviction.id, released, "evicted node replicas released");
            }
        }
        report.consolidation = Some(pass);
    }
}
