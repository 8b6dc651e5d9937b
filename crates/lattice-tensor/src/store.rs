//! Versioned tensor storage with causal prefix ordering.

use std::collections::HashMap;

use crate::error::{Error, Result};
use crate::tensor::{Tensor, TensorId};

/// In-memory store of published tensors.
///
/// Inserts enforce the causal prefix guarantee: a version carrying a
/// back-reference can only be stored after its predecessor, so no reader
/// ever observes version N+1 without N having been available.
#[derive(Debug, Default)]
pub struct TensorStore {
    tensors: HashMap<TensorId, Tensor>,
}

impl TensorStore {
    /// Create an empty store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert a published tensor.
    ///
    /// Rejects unpublished tensors, failed verification, duplicate ids,
    /// and causal gaps (a `prev` reference that is absent or whose version
    /// is not exactly one less).
    pub fn insert(&mut self, tensor: Tensor) -> Result<()> {
        if !tensor.is_published() {
            return Err(Error::NotPublished(tensor.id.clone()));
        }
        if !tensor.verify() {
            return Err(Error::IntegrityFailure(tensor.id.clone()));
        }
        if self.tensors.contains_key(&tensor.id) {
            return Err(Error::Duplicate(tensor.id.clone()));
        }

        if let Some(prev_id) = &tensor.prev {
            let prev = self
                .tensors
                .get(prev_id)
                .ok_or_else(|| Error::UnknownTensor(prev_id.clone()))?;
            if prev.version + 1 != tensor.version {
                return Err(Error::CausalGap {
                    id: tensor.id.clone(),
                    prev: prev.version,
                    got: tensor.version,
                });
            }
        }

        self.tensors.insert(tensor.id.clone(), tensor);
        Ok(())
    }

    /// Look up a tensor by id.
    pub fn get(&self, id: &TensorId) -> Result<&Tensor> {
        self.tensors
            .get(id)
            .ok_or_else(|| Error::UnknownTensor(id.clone()))
    }

    /// Whether a tensor is stored.
    pub fn contains(&self, id: &TensorId) -> bool {
        self.tensors.contains_key(id)
    }

    /// Remove a tensor, returning it if present.
    pub fn remove(&mut self, id: &TensorId) -> Option<Tensor> {
        self.tensors.remove(id)
    }

    /// Walk a lineage from `id` back to its first version.
    ///
    /// Returned newest-first. The causal insert rule guarantees the chain
    /// is complete whenever the head is present.
    pub fn history(&self, id: &TensorId) -> Result<Vec<&Tensor>> {
        let mut chain = Vec::new();
        let mut cursor = Some(self.get(id)?);
        while let Some(tensor) = cursor {
            chain.push(tensor);
            cursor = match &tensor.prev {
                Some(prev_id) => Some(self.get(prev_id)?),
                None => None,
            };
        }
        Ok(chain)
    }

    /// Number of stored tensors.
    pub fn len(&self) -> usize {
        self.tensors.len()
    }

    /// Whether the store is empty.
    pub fn is_empty(&self) -> bool {
        self.tensors.is_empty()
    }
}
