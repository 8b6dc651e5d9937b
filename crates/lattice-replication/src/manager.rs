//! The replication manager: placement, copy fan-out, replica bookkeeping.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use tokio::task::JoinSet;
use tokio::time::timeout;
use tracing::{debug, warn};

use lattice_tensor::{Tensor, TensorId};
use lattice_topology::{TopologyRegistry, WorkerId, CAPACITY_HEADROOM};

use crate::error::{Error, Result};
use crate::proof::{FailureReason, IntegrityProof, ReplicaFailure};
use crate::transport::{LocalTransport, ReplicaTransport};

/// Configuration for the replication manager.
#[derive(Debug, Clone)]
pub struct ReplicationConfig {
    /// Deadline for each per-target copy. Mandatory; a copy that misses
    /// it is recorded as a failure.
    pub per_target_timeout: Duration,

    /// Workers at or above this fraction of declared capacity are not
    /// eligible replica targets.
    pub capacity_headroom: f64,
}

impl Default for ReplicationConfig {
    fn default() -> Self {
        Self {
            per_target_timeout: Duration::from_millis(500),
            capacity_headroom: CAPACITY_HEADROOM,
        }
    }
}

impl ReplicationConfig {
    /// Set the per-target copy deadline.
    #[must_use]
    pub fn with_timeout(mut self, deadline: Duration) -> Self {
        self.per_target_timeout = deadline;
        self
    }

    /// Set the capacity headroom fraction.
    #[must_use]
    pub fn with_headroom(mut self, fraction: f64) -> Self {
        self.capacity_headroom = fraction;
        self
    }
}

/// Result of a replication fan-out.
///
/// Replication is best-effort: the outcome always reports what was
/// achieved, and `effective_factor` (origin + successful copies) is the
/// caller's quality indicator.
#[derive(Debug, Clone)]
pub struct ReplicationOutcome {
    /// The replicated tensor.
    pub tensor_id: TensorId,
    /// Workers now holding verified copies (excluding the origin).
    pub locations: Vec<WorkerId>,
    /// Copies requested, including the original.
    pub requested_factor: usize,
    /// Copies achieved, including the original.
    pub effective_factor: usize,
    /// One proof per verified copy.
    pub proofs: Vec<IntegrityProof>,
    /// Targets that failed, with reasons.
    pub failures: Vec<ReplicaFailure>,
}

impl ReplicationOutcome {
    /// Whether fewer copies exist than requested.
    pub fn is_degraded(&self) -> bool {
        self.effective_factor < self.requested_factor
    }
}

/// A replica held at a worker, with its proof.
#[derive(Debug, Clone)]
struct StoredReplica {
    location: WorkerId,
    tensor: Tensor,
    proof: IntegrityProof,
}

/// Places and tracks tensor replicas across the mesh.
///
/// Owns the replica copies themselves (conceptually the remote storage);
/// eviction from the memory graph releases them through [`release`].
///
/// [`release`]: ReplicationManager::release
#[derive(Debug)]
pub struct ReplicationManager<T = LocalTransport> {
    config: ReplicationConfig,
    transport: Arc<T>,
    replicas: HashMap<TensorId, Vec<StoredReplica>>,
}

impl ReplicationManager<LocalTransport> {
    /// Create a manager with the in-process transport.
    pub fn new(config: ReplicationConfig) -> Self {
        Self::with_transport(config, LocalTransport)
    }
}

impl<T: ReplicaTransport + 'static> ReplicationManager<T> {
    /// Create a manager over a custom transport.
    pub fn with_transport(config: ReplicationConfig, transport: T) -> Self {
        Self {
            config,
            transport: Arc::new(transport),
            replicas: HashMap::new(),
        }
    }

    /// Replicate `tensor` toward its requested factor.
    ///
    /// Targets are active, non-origin workers with capacity headroom,
    /// ranked by ascending estimated latency to the origin; the first
    /// `factor - 1` are attempted concurrently, each under the
    /// per-target deadline, so a round of copies costs one deadline at
    /// worst, not one per target.
    pub async fn replicate(
        &mut self,
        tensor: &Tensor,
        factor: usize,
        registry: &TopologyRegistry,
        now_ms: u64,
    ) -> Result<ReplicationOutcome> {
        if factor == 0 {
            return Err(Error::ZeroFactor);
        }
        if !tensor.is_published() {
            return Err(Error::NotPublished(tensor.id.clone()));
        }
        // Unknown origin fails fast before any copies are attempted.
        registry.get(&tensor.origin)?;

        let ranked = registry.nearest(&tensor.origin, usize::MAX)?;
        let targets: Vec<WorkerId> = ranked
            .into_iter()
            .map(|(id, _)| id)
            .filter(|id| {
                registry
                    .get(id)
                    .map(|w| w.has_headroom(self.config.capacity_headroom))
                    .unwrap_or(false)
            })
            .take(factor.saturating_sub(1))
            .collect();

        let source_hash = tensor.integrity;
        let mut locations = Vec::new();
        let mut proofs = Vec::new();
        let mut failures = Vec::new();

        // Fan out one task per target and join them; results are folded
        // back in latency-rank order regardless of completion order.
        let deadline = self.config.per_target_timeout;
        let mut tasks = JoinSet::new();
        for (slot, target) in targets.iter().cloned().enumerate() {
            let transport = Arc::clone(&self.transport);
            let tensor = tensor.clone();
            tasks.spawn(async move {
                let copied = timeout(deadline, transport.copy(&tensor, &target)).await;
                (slot, copied)
            });
        }

        let mut copies: Vec<Option<_>> = targets.iter().map(|_| None).collect();
        while let Some(joined) = tasks.join_next().await {
            if let Ok((slot, copied)) = joined {
                copies[slot] = Some(copied);
            }
        }

        for (target, copied) in targets.into_iter().zip(copies) {
            let Some(copied) = copied else {
                // copy task aborted before producing a result
                failures.push(ReplicaFailure {
                    target,
                    reason: FailureReason::Unreachable,
                });
                continue;
            };
            match copied {
                Err(_) => {
                    warn!(tensor = %tensor.id, target = %target, "replica copy timed out");
                    failures.push(ReplicaFailure {
                        target,
                        reason: FailureReason::Timeout,
                    });
                }
                Ok(None) => {
                    warn!(tensor = %tensor.id, target = %target, "replica target unreachable");
                    failures.push(ReplicaFailure {
                        target,
                        reason: FailureReason::Unreachable,
                    });
                }
                Ok(Some(copy)) => {
                    // Successful only if the copy's recomputed hash matches
                    // the source hash.
                    if copy.verify() && copy.integrity == source_hash {
                        let proof = IntegrityProof {
                            tensor_id: tensor.id.clone(),
                            hash: copy.integrity.unwrap_or_default(),
                            witness: target.clone(),
                            timestamp_ms: now_ms,
                        };
                        debug!(tensor = %tensor.id, target = %target,
                            hash = %proof.hash_hex(), "replica verified");
                        self.replicas
                            .entry(tensor.id.clone())
                            .or_default()
                            .push(StoredReplica {
                                location: target.clone(),
                                tensor: copy,
                                proof: proof.clone(),
                            });
                        locations.push(target);
                        proofs.push(proof);
                    } else {
                        warn!(tensor = %tensor.id, target = %target,
                            "replica discarded: integrity mismatch");
                        failures.push(ReplicaFailure {
                            target,
                            reason: FailureReason::IntegrityMismatch,
                        });
                    }
                }
            }
        }

        let outcome = ReplicationOutcome {
            tensor_id: tensor.id.clone(),
            effective_factor: 1 + locations.len(),
            requested_factor: factor,
            locations,
            proofs,
            failures,
        };

        if outcome.is_degraded() {
            debug!(tensor = %tensor.id, requested = factor,
                effective = outcome.effective_factor, "replication degraded");
        }
        Ok(outcome)
    }

    /// Workers currently holding a replica of `id`.
    pub fn locations_of(&self, id: &TensorId) -> Vec<WorkerId> {
        self.replicas
            .get(id)
            .map(|rs| rs.iter().map(|r| r.location.clone()).collect())
            .unwrap_or_default()
    }

    /// Fetch a replica copy held at a specific worker.
    pub fn replica_at(&self, id: &TensorId, location: &WorkerId) -> Option<&Tensor> {
        self.replicas
            .get(id)?
            .iter()
            .find(|r| &r.location == location)
            .map(|r| &r.tensor)
    }

    /// Proofs recorded for a tensor's replicas.
    pub fn proofs_of(&self, id: &TensorId) -> Vec<IntegrityProof> {
        self.replicas
            .get(id)
            .map(|rs| rs.iter().map(|r| r.proof.clone()).collect())
            .unwrap_or_default()
    }

    /// Release all replica storage for a tensor. Returns how many copies
    /// were freed. The deletion path used by memory eviction.
    pub fn release(&mut self, id: &TensorId) -> usize {
        let freed = self.replicas.remove(id).map(|rs| rs.len()).unwrap_or(0);
        if freed > 0 {
            debug!(tensor = %id, copies = freed, "released replica storage");
        }
        freed
    }

    /// Total replica copies held across all tensors.
    pub fn total_replicas(&self) -> usize {
        self.replicas.values().map(Vec::len).sum()
    }
}
