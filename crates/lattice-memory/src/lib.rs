//! Lattice Memory Consolidator
//!
//! The mesh remembers. Tensors that prove important — by consensus
//! participation, by caller assertion — are folded into a shared graph:
//! nodes are remembered tensors, edges are measured similarity between
//! them. Consolidation runs as a periodic pass rather than on every
//! write, so the cost of edge computation stays bounded.
//!
//! Importance decays multiplicatively between passes unless a read
//! refreshes it. Nodes that decay below the forgetting threshold and go
//! unread are evicted, and their replica locations are handed back to
//! the caller so storage can be released.
//!
//! The graph has a single writer: the consolidator. Everything else
//! reads through [`MemoryConsolidator::query`] or the stats view.

mod consolidate;
mod error;
mod graph;

pub use consolidate::{
    default_importance, Eviction, MemoryConfig, MemoryConsolidator, MemoryMatch, PassReport,
};
pub use error::{Error, Result};
pub use graph::{EdgeKey, MemoryEdge, MemoryGraph, MemoryNode, MemoryStats, RelationKind};
