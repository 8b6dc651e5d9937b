//! Worker node identity and state.

use std::collections::HashSet;

use serde::{Deserialize, Serialize};

use crate::INITIAL_RELIABILITY;

/// Unique worker identifier (opaque string, assigned by the operator).
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct WorkerId(pub String);

impl WorkerId {
    /// Create a new worker id.
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// The id as a string slice.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for WorkerId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<&str> for WorkerId {
    fn from(s: &str) -> Self {
        Self(s.to_owned())
    }
}

impl From<String> for WorkerId {
    fn from(s: String) -> Self {
        Self(s)
    }
}

/// Geographic position of a worker, in decimal degrees.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct GeoCoord {
    /// Latitude, -90..=90.
    pub lat_deg: f64,
    /// Longitude, -180..=180.
    pub lon_deg: f64,
}

impl GeoCoord {
    /// Create a coordinate pair.
    pub const fn new(lat_deg: f64, lon_deg: f64) -> Self {
        Self { lat_deg, lon_deg }
    }
}

/// Registration-time description of a worker.
///
/// Everything the admin boundary needs to supply; runtime state
/// (load, reliability, liveness) is tracked by the registry.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WorkerDescriptor {
    /// Unique identifier.
    pub id: WorkerId,
    /// Geographic position, used for latency estimation.
    pub coord: GeoCoord,
    /// Declared capacity in abstract units (> 0).
    pub capacity: f64,
    /// Tags describing what kinds of data this worker is tuned for.
    pub specializations: HashSet<String>,
}

impl WorkerDescriptor {
    /// Create a descriptor with no specializations.
    pub fn new(id: impl Into<WorkerId>, coord: GeoCoord, capacity: f64) -> Self {
        Self {
            id: id.into(),
            coord,
            capacity,
            specializations: HashSet::new(),
        }
    }

    /// Add a specialization tag.
    #[must_use]
    pub fn with_tag(mut self, tag: impl Into<String>) -> Self {
        self.specializations.insert(tag.into());
        self
    }
}

/// A registered compute location.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WorkerNode {
    /// Unique identifier.
    pub id: WorkerId,

    /// Geographic position.
    pub coord: GeoCoord,

    /// Declared capacity in abstract units.
    pub capacity: f64,

    /// Current load in the same units as capacity.
    pub load: f64,

    /// Specialization tags.
    pub specializations: HashSet<String>,

    /// Reliability score in [0, 1], adjusted by consensus outcomes.
    pub reliability: f64,

    /// Whether the worker is considered live.
    pub active: bool,

    /// Registration time (unix millis).
    pub registered_at_ms: u64,

    /// Last heartbeat or successful participation (unix millis).
    pub last_seen_ms: u64,
}

impl WorkerNode {
    /// Create a node from a descriptor at registration time.
    pub fn from_descriptor(desc: WorkerDescriptor, now_ms: u64) -> Self {
        Self {
            id: desc.id,
            coord: desc.coord,
            capacity: desc.capacity,
            load: 0.0,
            specializations: desc.specializations,
            reliability: INITIAL_RELIABILITY,
            active: true,
            registered_at_ms: now_ms,
            last_seen_ms: now_ms,
        }
    }

    /// Fraction of capacity currently in use.
    pub fn utilization(&self) -> f64 {
        if self.capacity <= 0.0 {
            1.0
        } else {
            self.load / self.capacity
        }
    }

    /// Whether the worker's load is below `fraction` of its capacity.
    pub fn has_headroom(&self, fraction: f64) -> bool {
        self.utilization() < fraction
    }

    /// Whether the worker carries the given specialization tag.
    pub fn has_tag(&self, tag: &str) -> bool {
        self.specializations.contains(tag)
    }

    /// Nudge reliability by `delta`, clamped to [0, 1].
    ///
    /// Positive deltas reward agreement with terminal consensus outcomes,
    /// negative deltas penalize dissent. The clamp keeps the invariant
    /// that reliability never leaves the unit interval.
    pub fn adjust_reliability(&mut self, delta: f64) {
        self.reliability = (self.reliability + delta).clamp(0.0, 1.0);
    }

    /// Record a liveness signal.
    pub fn touch(&mut self, now_ms: u64) {
        self.last_seen_ms = now_ms;
        self.active = true;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn descriptor(id: &str) -> WorkerDescriptor {
        WorkerDescriptor {
            id: WorkerId::from(id),
            coord: GeoCoord::new(0.0, 0.0),
            capacity: 100.0,
            specializations: HashSet::new(),
        }
    }

    #[test]
    fn new_worker_starts_active_and_unloaded() {
        let node = WorkerNode::from_descriptor(descriptor("w1"), 1_000);
        assert!(node.active);
        assert_eq!(node.load, 0.0);
        assert_eq!(node.reliability, INITIAL_RELIABILITY);
        assert_eq!(node.registered_at_ms, 1_000);
    }

    #[test]
    fn reliability_clamps_at_bounds() {
        let mut node = WorkerNode::from_descriptor(descriptor("w1"), 0);

        node.adjust_reliability(10.0);
        assert_eq!(node.reliability, 1.0);

        node.adjust_reliability(-10.0);
        assert_eq!(node.reliability, 0.0);

        node.adjust_reliability(0.25);
        assert_eq!(node.reliability, 0.25);
    }

    #[test]
    fn headroom_checks_utilization() {
        let mut node = WorkerNode::from_descriptor(descriptor("w1"), 0);
        assert!(node.has_headroom(0.8));

        node.load = 79.9;
        assert!(node.has_headroom(0.8));

        node.load = 80.0;
        assert!(!node.has_headroom(0.8));
    }

    #[test]
    fn zero_capacity_never_has_headroom() {
        let mut node = WorkerNode::from_descriptor(descriptor("w1"), 0);
        node.capacity = 0.0;
        assert!(!node.has_headroom(0.8));
    }

    #[test]
    fn tags_are_matched_exactly() {
        let desc = descriptor("w1").with_tag("equities");
        let node = WorkerNode::from_descriptor(desc, 0);
        assert!(node.has_tag("equities"));
        assert!(!node.has_tag("fx"));
    }
}
