//! The memory graph: remembered tensors and the similarity edges
//! between them.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};

use lattice_tensor::{Tensor, TensorId};
use lattice_topology::WorkerId;

/// What an edge between two remembered tensors expresses.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum RelationKind {
    /// Content similarity measured during a consolidation pass.
    Similar,
    /// One tensor is a later version of the other.
    Lineage,
}

/// Canonical undirected edge key. An edge between A and B is one
/// measured similarity, stored once: the key orders the two ids so
/// (A, B) and (B, A) collide.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct EdgeKey {
    pub lo: TensorId,
    pub hi: TensorId,
}

impl EdgeKey {
    pub fn new(a: TensorId, b: TensorId) -> Self {
        if a <= b {
            Self { lo: a, hi: b }
        } else {
            Self { lo: b, hi: a }
        }
    }

    /// Whether this edge touches the given node.
    pub fn touches(&self, id: &TensorId) -> bool {
        &self.lo == id || &self.hi == id
    }

    /// The endpoint that is not `id`, if `id` is an endpoint at all.
    pub fn other(&self, id: &TensorId) -> Option<&TensorId> {
        if &self.lo == id {
            Some(&self.hi)
        } else if &self.hi == id {
            Some(&self.lo)
        } else {
            None
        }
    }
}

/// A similarity-weighted relation between two remembered tensors.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MemoryEdge {
    /// Strength in [0, 1].
    pub strength: f64,
    pub relation: RelationKind,
    /// Last pass that created or re-measured this edge (unix millis).
    pub updated_at_ms: u64,
}

/// A remembered tensor with its retention bookkeeping.
#[derive(Debug, Clone)]
pub struct MemoryNode {
    pub id: TensorId,
    pub tensor: Tensor,
    /// Decaying retention priority in [0, 1].
    pub importance: f64,
    pub access_count: u64,
    /// Last read or refresh (unix millis).
    pub last_accessed_ms: u64,
    /// Where replicas of this tensor live, for release on eviction.
    pub replicas: Vec<WorkerId>,
}

impl MemoryNode {
    /// Record a read.
    pub fn touch(&mut self, now_ms: u64) {
        self.access_count += 1;
        self.last_accessed_ms = now_ms;
    }
}

/// Aggregate counters for the stats view.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct MemoryStats {
    pub nodes: usize,
    pub edges: usize,
    pub mean_importance: f64,
}

impl std::fmt::Display for MemoryStats {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "{} nodes, {} edges, mean importance {:.3}",
            self.nodes, self.edges, self.mean_importance
        )
    }
}

/// Nodes plus canonical undirected edges. Mutated only by the
/// consolidator; see the crate docs.
#[derive(Debug, Default)]
pub struct MemoryGraph {
    nodes: HashMap<TensorId, MemoryNode>,
    edges: HashMap<EdgeKey, MemoryEdge>,
}

impl MemoryGraph {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    pub fn edge_count(&self) -> usize {
        self.edges.len()
    }

    pub fn get(&self, id: &TensorId) -> Option<&MemoryNode> {
        self.nodes.get(id)
    }

    pub fn get_mut(&mut self, id: &TensorId) -> Option<&mut MemoryNode> {
        self.nodes.get_mut(id)
    }

    pub fn contains(&self, id: &TensorId) -> bool {
        self.nodes.contains_key(id)
    }

    pub fn nodes(&self) -> impl Iterator<Item = &MemoryNode> {
        self.nodes.values()
    }

    pub fn nodes_mut(&mut self) -> impl Iterator<Item = &mut MemoryNode> {
        self.nodes.values_mut()
    }

    /// Insert or replace a node.
    pub fn insert(&mut self, node: MemoryNode) {
        self.nodes.insert(node.id.clone(), node);
    }

    /// Remove a node and every edge that touches it.
    pub fn remove(&mut self, id: &TensorId) -> Option<MemoryNode> {
        let node = self.nodes.remove(id)?;
        self.edges.retain(|key, _| !key.touches(id));
        Some(node)
    }

    pub fn edge(&self, a: &TensorId, b: &TensorId) -> Option<&MemoryEdge> {
        self.edges.get(&EdgeKey::new(a.clone(), b.clone()))
    }

    /// Create or re-measure an edge. Returns true when the edge is new.
    pub fn upsert_edge(
        &mut self,
        a: TensorId,
        b: TensorId,
        strength: f64,
        relation: RelationKind,
        now_ms: u64,
    ) -> bool {
        let key = EdgeKey::new(a, b);
        let edge = MemoryEdge {
            strength: strength.clamp(0.0, 1.0),
            relation,
            updated_at_ms: now_ms,
        };
        self.edges.insert(key, edge).is_none()
    }

    /// Ids of nodes sharing an edge with `id`, with edge strengths.
    pub fn neighbors(&self, id: &TensorId) -> Vec<(TensorId, f64)> {
        self.edges
            .iter()
            .filter_map(|(key, edge)| key.other(id).map(|o| (o.clone(), edge.strength)))
            .collect()
    }

    pub fn stats(&self) -> MemoryStats {
        let mean_importance = if self.nodes.is_empty() {
            0.0
        } else {
            self.nodes.values().map(|n| n.importance).sum::<f64>() / self.nodes.len() as f64
        };
        MemoryStats {
            nodes: self.nodes.len(),
            edges: self.edges.len(),
            mean_importance,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn tensor(id: &str, data: Vec<f32>) -> Tensor {
        let shape = vec![data.len()];
        Tensor::from_data(id, shape, data, WorkerId::from("w"), 0)
            .unwrap()
            .publish()
    }

    fn node(id: &str, importance: f64) -> MemoryNode {
        let t = tensor(id, vec![1.0, 2.0]);
        MemoryNode {
            id: t.id.clone(),
            tensor: t,
            importance,
            access_count: 0,
            last_accessed_ms: 0,
            replicas: Vec::new(),
        }
    }

    #[test]
    fn edge_key_is_order_independent() {
        let a = TensorId::from("a");
        let b = TensorId::from("b");
        assert_eq!(EdgeKey::new(a.clone(), b.clone()), EdgeKey::new(b, a));
    }

    #[test]
    fn edge_stored_once_regardless_of_direction() {
        let mut g = MemoryGraph::new();
        g.insert(node("a", 0.5));
        g.insert(node("b", 0.5));

        let a = TensorId::from("a");
        let b = TensorId::from("b");
        assert!(g.upsert_edge(a.clone(), b.clone(), 0.8, RelationKind::Similar, 1));
        // reverse direction re-measures the same edge
        assert!(!g.upsert_edge(b.clone(), a.clone(), 0.9, RelationKind::Similar, 2));

        assert_eq!(g.edge_count(), 1);
        let edge = g.edge(&a, &b).unwrap();
        assert!((edge.strength - 0.9).abs() < 1e-12);
        assert_eq!(edge.updated_at_ms, 2);
    }

    #[test]
    fn removing_a_node_drops_its_edges() {
        let mut g = MemoryGraph::new();
        for id in ["a", "b", "c"] {
            g.insert(node(id, 0.5));
        }
        let a = TensorId::from("a");
        let b = TensorId::from("b");
        let c = TensorId::from("c");
        g.upsert_edge(a.clone(), b.clone(), 0.7, RelationKind::Similar, 1);
        g.upsert_edge(b.clone(), c.clone(), 0.6, RelationKind::Similar, 1);

        g.remove(&b);
        assert_eq!(g.edge_count(), 0);
        assert_eq!(g.len(), 2);
    }

    #[test]
    fn neighbors_lists_both_directions() {
        let mut g = MemoryGraph::new();
        for id in ["a", "b", "c"] {
            g.insert(node(id, 0.5));
        }
        let a = TensorId::from("a");
        g.upsert_edge(a.clone(), TensorId::from("b"), 0.7, RelationKind::Similar, 1);
        g.upsert_edge(TensorId::from("c"), a.clone(), 0.6, RelationKind::Similar, 1);

        let mut neighbors = g.neighbors(&a);
        neighbors.sort_by(|x, y| x.0.cmp(&y.0));
        assert_eq!(neighbors.len(), 2);
        assert_eq!(neighbors[0].0, TensorId::from("b"));
        assert_eq!(neighbors[1].0, TensorId::from("c"));
    }

    #[test]
    fn touch_updates_access_bookkeeping() {
        let mut n = node("a", 0.5);
        n.touch(42);
        n.touch(99);
        assert_eq!(n.access_count, 2);
        assert_eq!(n.last_accessed_ms, 99);
    }

    #[test]
    fn strength_is_clamped() {
        let mut g = MemoryGraph::new();
        g.insert(node("a", 0.5));
        g.insert(node("b", 0.5));
        let a = TensorId::from("a");
        let b = TensorId::from("b");
        g.upsert_edge(a.clone(), b.clone(), 1.7, RelationKind::Similar, 1);
        assert!((g.edge(&a, &b).unwrap().strength - 1.0).abs() < 1e-12);
    }

    #[test]
    fn stats_mean_importance() {
        let mut g = MemoryGraph::new();
        g.insert(node("a", 0.2));
        g.insert(node("b", 0.8));
        let stats = g.stats();
        assert_eq!(stats.nodes, 2);
        assert!((stats.mean_importance - 0.5).abs() < 1e-12);
    }
}

#[cfg(test)]
mod prop_tests {
    use super::*;
    use proptest::prelude::*;

    proptest! {
        #[test]
        fn edge_key_canonical_for_any_ids(a in "[a-z0-9]{1,12}", b in "[a-z0-9]{1,12}") {
            let fwd = EdgeKey::new(TensorId::from(a.clone()), TensorId::from(b.clone()));
            let bwd = EdgeKey::new(TensorId::from(b.clone()), TensorId::from(a.clone()));
            prop_assert_eq!(&fwd, &bwd);
            prop_assert!(fwd.lo <= fwd.hi);
            prop_assert!(fwd.touches(&TensorId::from(a.clone())));
            if a != b {
                let other = fwd.other(&TensorId::from(a)).map(TensorId::as_str);
                prop_assert_eq!(other, Some(b.as_str()));
            }
        }
    }
}
