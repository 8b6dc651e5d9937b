//! Lattice Attention Aggregator
//!
//! Combines many workers' tensors into a single global view, weighting
//! each contribution by how much it deserves to be heard:
//!
//! - **content**: cosine similarity between the query and the candidate
//!   (negative similarity clamps to zero — anti-correlated data should
//!   not contribute, and must never produce a negative weight),
//! - **proximity**: exponential decay in estimated network latency
//!   between the query's origin and the candidate's origin,
//! - **recency**: exponential decay in the candidate's age.
//!
//! The three factors multiply per candidate and the products renormalize
//! to sum to one. Candidates with the wrong shape, or from workers the
//! topology no longer knows, are excluded and counted — degraded, never
//! fatal. If nothing survives, the query itself is returned with zero
//! contributors, so callers always get a result plus an honest quality
//! indicator.

mod aggregate;
mod error;
mod weights;

pub use aggregate::{AggregateOutcome, AttentionAggregator, AttentionConfig};
pub use error::{Error, Result};
pub use weights::{AttentionWeight, AttentionWeightSet};

/// Tolerance for the "weights sum to one" invariant.
pub const WEIGHT_SUM_TOLERANCE: f64 = 1e-6;
