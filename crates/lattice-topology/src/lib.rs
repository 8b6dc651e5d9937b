//! Lattice Mesh Topology
//!
//! Tracks the worker nodes that make up a Lattice network: where they are,
//! how far apart they are, what data they specialize in, and how reliable
//! they have proven to be in consensus rounds.
//!
//! # Latency Model
//!
//! Pairwise latency is *estimated*, not measured: great-circle distance
//! between registered coordinates divided by a configured propagation
//! constant, floored to avoid zero-latency pathologies between co-located
//! workers. The estimate only needs to be good enough to rank placement
//! and attention candidates consistently.
//!
//! # Liveness
//!
//! Workers that stay silent past the configured silence period are marked
//! inactive rather than removed. Inactive workers are excluded from
//! `nearest` and placement queries but keep their reliability history, so
//! a returning worker does not start from a blank slate.

mod error;
mod latency;
mod registry;
mod worker;

pub use error::{Error, Result};
pub use latency::{great_circle_km, EARTH_RADIUS_KM};
pub use registry::{TopologyConfig, TopologyRegistry, TopologyStats};
pub use worker::{GeoCoord, WorkerDescriptor, WorkerId, WorkerNode};

/// Reliability score assigned to a freshly registered worker.
pub const INITIAL_RELIABILITY: f64 = 0.5;

/// Fraction of declared capacity above which a worker is considered
/// too loaded to accept replicas.
pub const CAPACITY_HEADROOM: f64 = 0.8;
