//! The aggregation kernel: factor computation and weighted combination.

use std::time::Duration;

use tracing::{debug, warn};

use lattice_tensor::{cosine_similarity, Tensor, TensorId};
use lattice_topology::TopologyRegistry;

use crate::error::Result;
use crate::weights::AttentionWeightSet;

/// Configuration for attention weighting.
#[derive(Debug, Clone)]
pub struct AttentionConfig {
    /// Latency scale constant: a candidate one scale away from the query
    /// origin keeps 1/e of its proximity factor.
    pub latency_scale: Duration,

    /// Recency scale constant: a candidate one scale old keeps 1/e of
    /// its recency factor.
    pub half_life: Duration,
}

impl Default for AttentionConfig {
    fn default() -> Self {
        Self {
            latency_scale: Duration::from_millis(50),
            half_life: Duration::from_secs(60),
        }
    }
}

impl AttentionConfig {
    /// Set the latency scale constant.
    #[must_use]
    pub fn with_latency_scale(mut self, scale: Duration) -> Self {
        self.latency_scale = scale;
        self
    }

    /// Set the recency scale constant.
    #[must_use]
    pub fn with_half_life(mut self, half_life: Duration) -> Self {
        self.half_life = half_life;
        self
    }
}

/// Result of an aggregation call.
#[derive(Debug, Clone)]
pub struct AggregateOutcome {
    /// The combined tensor (unpublished; the caller versions and
    /// publishes it).
    pub tensor: Tensor,
    /// Normalized per-candidate weights.
    pub weights: AttentionWeightSet,
    /// Candidates that contributed weight.
    pub contributing: usize,
    /// Candidates excluded for shape mismatch.
    pub excluded_shape: usize,
    /// Candidates excluded because their origin is unknown.
    pub excluded_unknown_origin: usize,
    /// Candidates excluded because their weight collapsed to zero.
    pub excluded_zero_weight: usize,
    /// True when no candidate survived and the query was returned as-is.
    pub fallback: bool,
}

/// Computes attention-weighted combinations of candidate tensors.
#[derive(Debug, Clone, Default)]
pub struct AttentionAggregator {
    config: AttentionConfig,
}

impl AttentionAggregator {
    /// Create an aggregator.
    pub fn new(config: AttentionConfig) -> Self {
        Self { config }
    }

    /// Combine `candidates` into one tensor shaped like the query.
    ///
    /// Candidates whose shape differs from the query's are excluded, not
    /// fatal; so are candidates from unregistered origins. If every
    /// candidate is excluded or all weights collapse to zero, the query
    /// tensor itself is returned with `contributing == 0`.
    pub fn aggregate(
        &self,
        query: &Tensor,
        candidates: &[Tensor],
        registry: &TopologyRegistry,
        result_id: impl Into<TensorId>,
        now_ms: u64,
    ) -> Result<AggregateOutcome> {
        // A malformed query (unknown origin) is the caller's bug.
        registry.get(&query.origin)?;

        let mut excluded_shape = 0usize;
        let mut excluded_unknown = 0usize;
        let mut excluded_zero = 0usize;
        let mut raw = Vec::new();
        let mut surviving: Vec<&Tensor> = Vec::new();

        for candidate in candidates {
            if candidate.shape != query.shape {
                warn!(candidate = %candidate.id, expected = ?query.shape,
                    got = ?candidate.shape, "candidate excluded: shape mismatch");
                excluded_shape += 1;
                continue;
            }

            let latency = match registry.estimate_latency(&query.origin, &candidate.origin) {
                Ok(latency) => latency,
                Err(_) => {
                    warn!(candidate = %candidate.id, origin = %candidate.origin,
                        "candidate excluded: unknown origin");
                    excluded_unknown += 1;
                    continue;
                }
            };

            let content = cosine_similarity(&query.data, &candidate.data).max(0.0);
            let proximity =
                (-latency.as_secs_f64() / self.config.latency_scale.as_secs_f64()).exp();
            let age_ms = now_ms.saturating_sub(candidate.created_at_ms) as f64;
            let recency = (-age_ms / self.config.half_life.as_millis() as f64).exp();

            let score = content * proximity * recency;
            if score <= 0.0 || !score.is_finite() {
                // zero-mass candidates are not contributors
                debug!(candidate = %candidate.id, "candidate excluded: zero weight");
                excluded_zero += 1;
                continue;
            }

            raw.push((candidate.origin.clone(), candidate.id.clone(), score));
            surviving.push(candidate);
        }

        let weights = AttentionWeightSet::normalize(raw);

        if weights.is_empty() {
            debug!(query = %query.id, excluded_shape, excluded_unknown, excluded_zero,
                "no contributing candidates, falling back to query");
            return Ok(AggregateOutcome {
                tensor: query.clone(),
                weights,
                contributing: 0,
                excluded_shape,
                excluded_unknown_origin: excluded_unknown,
                excluded_zero_weight: excluded_zero,
                fallback: true,
            });
        }

        let mut data = vec![0.0f32; query.len()];
        for (entry, candidate) in weights.entries().iter().zip(&surviving) {
            let w = entry.weight as f32;
            for (acc, &v) in data.iter_mut().zip(&candidate.data) {
                *acc += w * v;
            }
        }

        let tensor = Tensor::from_data(
            result_id,
            query.shape.clone(),
            data,
            query.origin.clone(),
            now_ms,
        )?;

        debug!(query = %query.id, contributing = weights.len(),
            excluded_shape, excluded_unknown, "aggregated candidates");

        Ok(AggregateOutcome {
            tensor,
            contributing: weights.len(),
            weights,
            excluded_shape,
            excluded_unknown_origin: excluded_unknown,
            excluded_zero_weight: excluded_zero,
            fallback: false,
        })
    }
}
