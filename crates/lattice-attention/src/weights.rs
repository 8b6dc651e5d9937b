//! Attention weight sets and their normalization invariant.

use lattice_tensor::TensorId;
use lattice_topology::WorkerId;
use serde::{Deserialize, Serialize};

/// One candidate's share of the aggregate.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AttentionWeight {
    /// Worker that contributed the candidate.
    pub worker: WorkerId,
    /// The candidate tensor.
    pub tensor_id: TensorId,
    /// Normalized weight, non-negative.
    pub weight: f64,
}

/// Ephemeral per-aggregation weight assignment.
///
/// Invariant: weights are non-negative and sum to 1.0 (within floating
/// point tolerance), or the set is empty when nothing resembled the query.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct AttentionWeightSet {
    entries: Vec<AttentionWeight>,
}

impl AttentionWeightSet {
    /// Build a weight set from raw (unnormalized) scores, dropping the
    /// whole set if the total mass is not positive.
    pub(crate) fn normalize(raw: Vec<(WorkerId, TensorId, f64)>) -> Self {
        let total: f64 = raw.iter().map(|(_, _, w)| w).sum();
        if total <= 0.0 || !total.is_finite() {
            return Self::default();
        }

        Self {
            entries: raw
                .into_iter()
                .map(|(worker, tensor_id, w)| AttentionWeight {
                    worker,
                    tensor_id,
                    weight: w / total,
                })
                .collect(),
        }
    }

    /// The weights, in candidate order.
    pub fn entries(&self) -> &[AttentionWeight] {
        &self.entries
    }

    /// Sum of all weights (1.0 or 0.0 for an empty set).
    pub fn sum(&self) -> f64 {
        self.entries.iter().map(|e| e.weight).sum()
    }

    /// Number of weighted candidates.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Whether no candidate received weight.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Weight assigned to a specific worker, if any.
    pub fn weight_of(&self, worker: &WorkerId) -> Option<f64> {
        self.entries
            .iter()
            .find(|e| &e.worker == worker)
            .map(|e| e.weight)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn raw(entries: &[(&str, f64)]) -> Vec<(WorkerId, TensorId, f64)> {
        entries
            .iter()
            .map(|(w, score)| (WorkerId::from(*w), TensorId::from(*w), *score))
            .collect()
    }

    #[test]
    fn normalization_sums_to_one() {
        let set = AttentionWeightSet::normalize(raw(&[("a", 3.0), ("b", 1.0)]));
        assert!((set.sum() - 1.0).abs() < crate::WEIGHT_SUM_TOLERANCE);
        assert!((set.weight_of(&WorkerId::from("a")).unwrap() - 0.75).abs() < 1e-12);
        assert!((set.weight_of(&WorkerId::from("b")).unwrap() - 0.25).abs() < 1e-12);
    }

    #[test]
    fn zero_mass_yields_empty_set() {
        let set = AttentionWeightSet::normalize(raw(&[("a", 0.0), ("b", 0.0)]));
        assert!(set.is_empty());
        assert_eq!(set.sum(), 0.0);
    }

    #[test]
    fn nan_mass_yields_empty_set() {
        let set = AttentionWeightSet::normalize(raw(&[("a", f64::NAN)]));
        assert!(set.is_empty());
    }
}
