//! The topology registry: all known workers and the routing policy
//! derived from them.

use std::collections::HashMap;
use std::time::Duration;

use tracing::{debug, warn};

use crate::error::{Error, Result};
use crate::latency::great_circle_km;
use crate::worker::{WorkerDescriptor, WorkerId, WorkerNode};

/// Configuration for the topology registry.
#[derive(Debug, Clone)]
pub struct TopologyConfig {
    /// Signal propagation speed used to turn distance into latency,
    /// in kilometers per millisecond. Default 200 km/ms, roughly the
    /// speed of light in fiber.
    pub propagation_km_per_ms: f64,

    /// Minimum latency estimate between distinct workers. Co-located
    /// workers would otherwise estimate to zero and break ranking.
    pub latency_floor: Duration,

    /// Workers silent for longer than this are marked inactive.
    pub silence_period: Duration,
}

impl Default for TopologyConfig {
    fn default() -> Self {
        Self {
            propagation_km_per_ms: 200.0,
            latency_floor: Duration::from_millis(1),
            silence_period: Duration::from_secs(30),
        }
    }
}

impl TopologyConfig {
    /// Set the propagation constant.
    #[must_use]
    pub fn with_propagation(mut self, km_per_ms: f64) -> Self {
        self.propagation_km_per_ms = km_per_ms;
        self
    }

    /// Set the latency floor.
    #[must_use]
    pub fn with_latency_floor(mut self, floor: Duration) -> Self {
        self.latency_floor = floor;
        self
    }

    /// Set the silence period after which workers go inactive.
    #[must_use]
    pub fn with_silence_period(mut self, period: Duration) -> Self {
        self.silence_period = period;
        self
    }
}

/// Registry of known workers with latency-aware lookups.
///
/// One instance per network; constructed by the coordinator and shared
/// behind a read/write lock. All methods take `now_ms` explicitly so
/// tests control the clock.
#[derive(Debug, Default)]
pub struct TopologyRegistry {
    config: TopologyConfig,
    workers: HashMap<WorkerId, WorkerNode>,
}

impl TopologyRegistry {
    /// Create an empty registry.
    pub fn new(config: TopologyConfig) -> Self {
        Self {
            config,
            workers: HashMap::new(),
        }
    }

    /// The registry configuration.
    pub fn config(&self) -> &TopologyConfig {
        &self.config
    }

    /// Register a worker, or refresh an existing registration.
    ///
    /// Re-registration updates coordinates, capacity, and tags but keeps
    /// the reliability history. Returns true if the worker was new.
    pub fn register(&mut self, desc: WorkerDescriptor, now_ms: u64) -> Result<bool> {
        if desc.capacity <= 0.0 {
            return Err(Error::InvalidDescriptor(format!(
                "capacity must be positive, got {}",
                desc.capacity
            )));
        }
        if !(-90.0..=90.0).contains(&desc.coord.lat_deg)
            || !(-180.0..=180.0).contains(&desc.coord.lon_deg)
        {
            return Err(Error::InvalidDescriptor(format!(
                "coordinates out of range: ({}, {})",
                desc.coord.lat_deg, desc.coord.lon_deg
            )));
        }

        match self.workers.get_mut(&desc.id) {
            Some(existing) => {
                existing.coord = desc.coord;
                existing.capacity = desc.capacity;
                existing.specializations = desc.specializations;
                existing.touch(now_ms);
                debug!(worker = %existing.id, "refreshed worker registration");
                Ok(false)
            }
            None => {
                let node = WorkerNode::from_descriptor(desc, now_ms);
                debug!(worker = %node.id, lat = node.coord.lat_deg, lon = node.coord.lon_deg,
                    "registered new worker");
                self.workers.insert(node.id.clone(), node);
                Ok(true)
            }
        }
    }

    /// Remove a worker entirely.
    pub fn deregister(&mut self, id: &WorkerId) -> Result<WorkerNode> {
        self.workers
            .remove(id)
            .ok_or_else(|| Error::UnknownWorker(id.clone()))
    }

    /// Record a liveness signal for a worker.
    pub fn heartbeat(&mut self, id: &WorkerId, now_ms: u64) -> Result<()> {
        let node = self.get_mut(id)?;
        node.touch(now_ms);
        Ok(())
    }

    /// Mark workers silent past the silence period as inactive.
    ///
    /// Returns the ids that transitioned. Inactive workers stay in the
    /// registry and reactivate on their next heartbeat.
    pub fn expire_silent(&mut self, now_ms: u64) -> Vec<WorkerId> {
        let cutoff = self.config.silence_period.as_millis() as u64;
        let mut expired = Vec::new();

        for node in self.workers.values_mut() {
            if node.active && now_ms.saturating_sub(node.last_seen_ms) > cutoff {
                node.active = false;
                expired.push(node.id.clone());
            }
        }

        if !expired.is_empty() {
            warn!(count = expired.len(), "marked silent workers inactive");
        }
        expired
    }

    /// Look up a worker.
    pub fn get(&self, id: &WorkerId) -> Result<&WorkerNode> {
        self.workers
            .get(id)
            .ok_or_else(|| Error::UnknownWorker(id.clone()))
    }

    fn get_mut(&mut self, id: &WorkerId) -> Result<&mut WorkerNode> {
        self.workers
            .get_mut(id)
            .ok_or_else(|| Error::UnknownWorker(id.clone()))
    }

    /// Whether a worker is registered (active or not).
    pub fn contains(&self, id: &WorkerId) -> bool {
        self.workers.contains_key(id)
    }

    /// All registered workers.
    pub fn workers(&self) -> impl Iterator<Item = &WorkerNode> {
        self.workers.values()
    }

    /// All active workers.
    pub fn active_workers(&self) -> impl Iterator<Item = &WorkerNode> {
        self.workers.values().filter(|w| w.active)
    }

    /// Number of registered workers.
    pub fn len(&self) -> usize {
        self.workers.len()
    }

    /// Whether the registry is empty.
    pub fn is_empty(&self) -> bool {
        self.workers.is_empty()
    }

    /// Update a worker's current load.
    pub fn set_load(&mut self, id: &WorkerId, load: f64) -> Result<()> {
        let node = self.get_mut(id)?;
        node.load = load.max(0.0);
        Ok(())
    }

    /// Apply a reliability delta from a consensus outcome.
    pub fn adjust_reliability(&mut self, id: &WorkerId, delta: f64) -> Result<()> {
        let node = self.get_mut(id)?;
        node.adjust_reliability(delta);
        Ok(())
    }

    /// Estimate one-way latency between two registered workers.
    ///
    /// Great-circle distance over the propagation constant, never below
    /// the configured floor.
    pub fn estimate_latency(&self, a: &WorkerId, b: &WorkerId) -> Result<Duration> {
        let wa = self.get(a)?;
        let wb = self.get(b)?;

        let km = great_circle_km(wa.coord, wb.coord);
        let ms = km / self.config.propagation_km_per_ms;
        let estimate = Duration::from_secs_f64(ms / 1_000.0);

        Ok(estimate.max(self.config.latency_floor))
    }

    /// The `k` nearest active workers to `id` by estimated latency,
    /// excluding `id` itself and anything inactive.
    ///
    /// An empty (or singleton) registry yields an empty vec, never an
    /// error; only an unknown origin fails.
    pub fn nearest(&self, id: &WorkerId, k: usize) -> Result<Vec<(WorkerId, Duration)>> {
        let origin = self.get(id)?;

        let mut ranked: Vec<(WorkerId, Duration)> = self
            .active_workers()
            .filter(|w| w.id != origin.id)
            .map(|w| {
                let km = great_circle_km(origin.coord, w.coord);
                let ms = km / self.config.propagation_km_per_ms;
                let latency =
                    Duration::from_secs_f64(ms / 1_000.0).max(self.config.latency_floor);
                (w.id.clone(), latency)
            })
            .collect();

        ranked.sort_by(|a, b| a.1.cmp(&b.1).then_with(|| a.0.cmp(&b.0)));
        ranked.truncate(k);
        Ok(ranked)
    }

    /// Active workers carrying the given specialization tag.
    pub fn workers_with_tag(&self, tag: &str) -> Vec<&WorkerNode> {
        self.active_workers().filter(|w| w.has_tag(tag)).collect()
    }

    /// Summary statistics over the registry.
    pub fn stats(&self) -> TopologyStats {
        let total = self.workers.len();
        let active = self.active_workers().count();
        let mean_reliability = if total == 0 {
            0.0
        } else {
            self.workers.values().map(|w| w.reliability).sum::<f64>() / total as f64
        };

        TopologyStats {
            total_workers: total,
            active_workers: active,
            mean_reliability,
        }
    }
}

/// Summary statistics about the topology.
#[derive(Debug, Clone)]
pub struct TopologyStats {
    pub total_workers: usize,
    pub active_workers: usize,
    pub mean_reliability: f64,
}

impl std::fmt::Display for TopologyStats {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "Topology: {} workers ({} active), mean reliability {:.2}",
            self.total_workers, self.active_workers, self.mean_reliability
        )
    }
}


#[cfg(test)]
mod prop_tests {
    use super::*;
    use crate::worker::GeoCoord;
    use proptest::prelude::*;

    proptest! {
        #[test]
        fn latency_symmetric_and_floored(
            lat_a in -90.0f64..90.0, lon_a in -180.0f64..180.0,
            lat_b in -90.0f64..90.0, lon_b in -180.0f64..180.0,
        ) {
            let mut reg = TopologyRegistry::new(TopologyConfig::default());
            reg.register(
                WorkerDescriptor::new("a", GeoCoord::new(lat_a, lon_a), 1.0), 0,
            ).unwrap();
            reg.register(
                WorkerDescriptor::new("b", GeoCoord::new(lat_b, lon_b), 1.0), 0,
            ).unwrap();

            let a = WorkerId::from("a");
            let b = WorkerId::from("b");
            let fwd = reg.estimate_latency(&a, &b).unwrap();
            let bwd = reg.estimate_latency(&b, &a).unwrap();

            prop_assert_eq!(fwd, bwd);
            prop_assert!(fwd >= Duration::from_millis(1));
        }
    }
}
