//! Lattice Tensor Store
//!
//! A tensor here is a named, shaped, versioned numeric array: the unit of
//! state that workers compute locally and the mesh replicates, aggregates,
//! and agrees on.
//!
//! # Immutability
//!
//! Tensors are copy-on-write. Once published (integrity hash attached),
//! the contents are frozen: every transform allocates a new tensor, and an
//! update to a lineage produces a new version with a back-reference to the
//! one it supersedes. This is what lets the rest of the mesh share tensors
//! freely without locks.
//!
//! # Integrity
//!
//! `publish` computes a blake3 hash over the canonical byte encoding of
//! shape and data. `verify` recomputes it and fails closed: any mismatch,
//! missing hash, or malformed buffer yields `false`, never a panic.

mod error;
mod similarity;
mod store;
mod tensor;

pub use error::{Error, Result};
pub use similarity::cosine_similarity;
pub use store::TensorStore;
pub use tensor::{ConsistencyLevel, Tensor, TensorId};
