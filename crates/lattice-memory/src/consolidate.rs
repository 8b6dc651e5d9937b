//! Periodic consolidation passes over the memory graph.

use std::collections::HashSet;

use tracing::{debug, info};

use lattice_tensor::{cosine_similarity, Tensor, TensorId};
use lattice_topology::WorkerId;

use crate::error::{Error, Result};
use crate::graph::{MemoryGraph, MemoryNode, MemoryStats, RelationKind};

/// Default importance from consensus participation: saturating in the
/// number of rounds a tensor took part in, 1 − e^(−count).
pub fn default_importance(consensus_rounds: u64) -> f64 {
    1.0 - (-(consensus_rounds as f64)).exp()
}

/// Thresholds and pass tunables.
#[derive(Debug, Clone)]
pub struct MemoryConfig {
    /// Minimum importance for a submitted tensor to enter the graph.
    pub remember_threshold: f64,
    /// Minimum similarity to create an edge.
    pub connect_threshold: f64,
    /// Importance below which an unread node is evicted.
    pub forget_threshold: f64,
    /// Multiplicative importance decay applied to untouched nodes.
    pub decay_factor: f64,
    /// Pre-filter cap on pairwise comparisons per new node.
    pub max_comparisons: usize,
}

impl Default for MemoryConfig {
    fn default() -> Self {
        Self {
            remember_threshold: 0.3,
            connect_threshold: 0.5,
            forget_threshold: 0.05,
            decay_factor: 0.9,
            max_comparisons: 16,
        }
    }
}

impl MemoryConfig {
    #[must_use]
    pub fn with_remember_threshold(mut self, threshold: f64) -> Self {
        self.remember_threshold = threshold;
        self
    }

    #[must_use]
    pub fn with_connect_threshold(mut self, threshold: f64) -> Self {
        self.connect_threshold = threshold;
        self
    }

    #[must_use]
    pub fn with_forget_threshold(mut self, threshold: f64) -> Self {
        self.forget_threshold = threshold;
        self
    }

    #[must_use]
    pub fn with_decay_factor(mut self, factor: f64) -> Self {
        self.decay_factor = factor;
        self
    }

    #[must_use]
    pub fn with_max_comparisons(mut self, max: usize) -> Self {
        self.max_comparisons = max;
        self
    }
}

/// A node evicted by a pass, with the replica locations to release.
#[derive(Debug, Clone)]
pub struct Eviction {
    pub id: TensorId,
    pub replicas: Vec<WorkerId>,
}

/// What one consolidation pass did.
#[derive(Debug, Clone, Default)]
pub struct PassReport {
    pub remembered: usize,
    pub below_remember_threshold: usize,
    pub edges_formed: usize,
    pub edges_updated: usize,
    pub decayed: usize,
    pub evicted: Vec<Eviction>,
}

/// A query hit.
#[derive(Debug, Clone)]
pub struct MemoryMatch {
    pub node_id: TensorId,
    pub importance: f64,
    pub similarity: f64,
}

struct Submission {
    tensor: Tensor,
    importance: f64,
    replicas: Vec<WorkerId>,
}

/// Sole writer of the memory graph. Tensors are submitted between
/// passes and folded in by [`MemoryConsolidator::run_pass`].
pub struct MemoryConsolidator {
    config: MemoryConfig,
    graph: MemoryGraph,
    incoming: Vec<Submission>,
    last_pass_at_ms: u64,
}

impl MemoryConsolidator {
    pub fn new(config: MemoryConfig) -> Self {
        Self {
            config,
            graph: MemoryGraph::new(),
            incoming: Vec::new(),
            last_pass_at_ms: 0,
        }
    }

    /// Queue a tensor for the next pass.
    ///
    /// The importance must be in [0, 1] and the tensor published; the
    /// remember threshold is applied by the pass, not here.
    pub fn submit(
        &mut self,
        tensor: Tensor,
        importance: f64,
        replicas: Vec<WorkerId>,
    ) -> Result<()> {
        if !(0.0..=1.0).contains(&importance) || importance.is_nan() {
            return Err(Error::InvalidImportance(importance));
        }
        if !tensor.is_published() {
            return Err(Error::NotPublished(tensor.id.clone()));
        }
        self.incoming.push(Submission {
            tensor,
            importance,
            replicas,
        });
        Ok(())
    }

    /// Run one consolidation pass.
    pub fn run_pass(&mut self, now_ms: u64) -> PassReport {
        let mut report = PassReport::default();
        let mut touched: HashSet<TensorId> = HashSet::new();

        // 1-2: fold submitted tensors into nodes
        let submissions = std::mem::take(&mut self.incoming);
        for sub in submissions {
            if sub.importance <= self.config.remember_threshold {
                report.below_remember_threshold += 1;
                continue;
            }
            let id = sub.tensor.id.clone();
            if let Some(existing) = self.graph.get_mut(&id) {
                // refresh: importance never decreases on re-submission
                existing.importance = existing.importance.max(sub.importance);
                existing.touch(now_ms);
            } else {
                self.graph.insert(MemoryNode {
                    id: id.clone(),
                    tensor: sub.tensor,
                    importance: sub.importance,
                    access_count: 0,
                    last_accessed_ms: now_ms,
                    replicas: sub.replicas,
                });
            }
            report.remembered += 1;

            // 3-4: connect to nearby existing nodes
            self.connect(&id, now_ms, &mut report);
            touched.insert(id);
        }

        // 5: decay untouched nodes
        for node in self.graph.nodes_mut() {
            if !touched.contains(&node.id) && node.last_accessed_ms <= self.last_pass_at_ms {
                node.importance *= self.config.decay_factor;
                report.decayed += 1;
            }
        }

        // 6: evict forgotten, unread nodes. Nodes touched by this pass
        // are shielded, same as in the decay step: when now equals the
        // last pass time a fresh admission would otherwise look unread.
        let forget = self.config.forget_threshold;
        let last_pass = self.last_pass_at_ms;
        let doomed: Vec<TensorId> = self
            .graph
            .nodes()
            .filter(|n| {
                n.importance < forget
                    && !touched.contains(&n.id)
                    && n.last_accessed_ms <= last_pass
            })
            .map(|n| n.id.clone())
            .collect();
        for id in doomed {
            if let Some(node) = self.graph.remove(&id) {
                debug!(node = %id, importance = node.importance, "node evicted");
                report.evicted.push(Eviction {
                    id,
                    replicas: node.replicas,
                });
            }
        }

        self.last_pass_at_ms = now_ms;
        info!(
            remembered = report.remembered,
            edges_formed = report.edges_formed,
            decayed = report.decayed,
            evicted = report.evicted.len(),
            "consolidation pass complete"
        );
        report
    }

    /// Pairwise similarity against a bounded candidate set.
    ///
    /// Pre-filter: same shape (different shapes cannot be similar in the
    /// element-wise sense), most recently accessed first, capped at
    /// `max_comparisons`. Version lineage gets a `Lineage` edge at full
    /// strength regardless of the similarity threshold.
    fn connect(&mut self, id: &TensorId, now_ms: u64, report: &mut PassReport) {
        let Some(node) = self.graph.get(id) else {
            return;
        };
        let shape = node.tensor.shape.clone();
        let data = node.tensor.data.clone();
        let prev = node.tensor.prev.clone();

        let mut candidates: Vec<(TensorId, u64)> = self
            .graph
            .nodes()
            .filter(|n| &n.id != id && n.tensor.shape == shape)
            .map(|n| (n.id.clone(), n.last_accessed_ms))
            .collect();
        candidates.sort_by(|a, b| b.1.cmp(&a.1));
        candidates.truncate(self.config.max_comparisons);

        for (other_id, _) in candidates {
            let Some(other) = self.graph.get(&other_id) else {
                continue;
            };
            let relation = if prev.as_ref() == Some(&other_id) {
                RelationKind::Lineage
            } else {
                RelationKind::Similar
            };
            let strength = match relation {
                RelationKind::Lineage => 1.0,
                RelationKind::Similar => cosine_similarity(&data, &other.tensor.data).max(0.0),
            };
            if relation == RelationKind::Similar && strength < self.config.connect_threshold {
                continue;
            }
            let created =
                self.graph
                    .upsert_edge(id.clone(), other_id, strength, relation, now_ms);
            if created {
                report.edges_formed += 1;
            } else {
                report.edges_updated += 1;
            }
        }
    }

    /// Find the `top_k` remembered tensors most similar to `probe`,
    /// refreshing access on every returned node.
    pub fn query(&mut self, probe: &Tensor, top_k: usize, now_ms: u64) -> Vec<MemoryMatch> {
        let mut matches: Vec<MemoryMatch> = self
            .graph
            .nodes()
            .filter(|n| n.tensor.shape == probe.shape)
            .map(|n| MemoryMatch {
                node_id: n.id.clone(),
                importance: n.importance,
                similarity: cosine_similarity(&probe.data, &n.tensor.data),
            })
            .collect();
        matches.sort_by(|a, b| {
            b.similarity
                .partial_cmp(&a.similarity)
                .unwrap_or(std::cmp::Ordering::Equal)
        });
        matches.truncate(top_k);

        for m in &matches {
            if let Some(node) = self.graph.get_mut(&m.node_id) {
                node.touch(now_ms);
            }
        }
        matches
    }

    pub fn graph(&self) -> &MemoryGraph {
        &self.graph
    }

    pub fn stats(&self) -> MemoryStats {
        self.graph.stats()
    }
}
