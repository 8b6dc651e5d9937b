//! The tensor data model: shaped, versioned, integrity-hashed arrays.

use lattice_topology::WorkerId;
use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

/// Unique tensor identifier (opaque string, assigned by the creator).
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct TensorId(pub String);

impl TensorId {
    /// Create a new tensor id.
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// The id as a string slice.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for TensorId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<&str> for TensorId {
    fn from(s: &str) -> Self {
        Self(s.to_owned())
    }
}

impl From<String> for TensorId {
    fn from(s: String) -> Self {
        Self(s)
    }
}

/// How strongly readers of this tensor's lineage must be ordered.
///
/// The mesh defaults to eventual consistency; causal ordering within a
/// single lineage is enforced by the store regardless.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum ConsistencyLevel {
    /// Replicas may lag; the default.
    #[default]
    Eventual,
    /// Readers observe versions in causal order.
    Causal,
    /// Reads see the latest agreed version.
    Strong,
}

/// A named, shaped, versioned numeric array.
///
/// `data.len()` always equals the product of `shape`; construction
/// enforces it. Once `publish` has attached an integrity hash the tensor
/// is frozen and all transforms return new tensors.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Tensor {
    /// Unique identifier for this version of the tensor.
    pub id: TensorId,

    /// Ordered dimensions, all positive.
    pub shape: Vec<usize>,

    /// Flat row-major data buffer.
    pub data: Vec<f32>,

    /// Worker that originated this tensor.
    pub origin: WorkerId,

    /// Creation time (unix millis).
    pub created_at_ms: u64,

    /// Version within the lineage, starting at 1.
    pub version: u64,

    /// Id of the version this one supersedes, if any.
    pub prev: Option<TensorId>,

    /// blake3 hash over shape and data; present once published.
    pub integrity: Option<[u8; 32]>,

    /// Target number of copies across the network, including the original.
    pub replication_factor: usize,

    /// Consistency level for this lineage.
    pub consistency: ConsistencyLevel,
}

fn validate_shape(shape: &[usize]) -> Result<usize> {
    if shape.is_empty() {
        return Err(Error::InvalidShape("shape must not be empty".into()));
    }
    if shape.iter().any(|&d| d == 0) {
        return Err(Error::InvalidShape(format!(
            "all dimensions must be positive, got {shape:?}"
        )));
    }
    Ok(shape.iter().product())
}

impl Tensor {
    /// Create a zero-filled tensor. All shape dimensions must be positive.
    pub fn zeros(
        id: impl Into<TensorId>,
        shape: Vec<usize>,
        origin: WorkerId,
        now_ms: u64,
    ) -> Result<Self> {
        let len = validate_shape(&shape)?;
        Ok(Self {
            id: id.into(),
            shape,
            data: vec![0.0; len],
            origin,
            created_at_ms: now_ms,
            version: 1,
            prev: None,
            integrity: None,
            replication_factor: 1,
            consistency: ConsistencyLevel::default(),
        })
    }

    /// Create a tensor from an existing buffer.
    pub fn from_data(
        id: impl Into<TensorId>,
        shape: Vec<usize>,
        data: Vec<f32>,
        origin: WorkerId,
        now_ms: u64,
    ) -> Result<Self> {
        let len = validate_shape(&shape)?;
        if data.len() != len {
            return Err(Error::ShapeMismatch {
                expected: shape,
                got: vec![data.len()],
            });
        }
        Ok(Self {
            id: id.into(),
            shape,
            data,
            origin,
            created_at_ms: now_ms,
            version: 1,
            prev: None,
            integrity: None,
            replication_factor: 1,
            consistency: ConsistencyLevel::default(),
        })
    }

    /// Set the target replication factor.
    #[must_use]
    pub fn with_replication_factor(mut self, factor: usize) -> Self {
        self.replication_factor = factor;
        self
    }

    /// Set the consistency level.
    #[must_use]
    pub fn with_consistency(mut self, level: ConsistencyLevel) -> Self {
        self.consistency = level;
        self
    }

    /// Number of elements.
    pub fn len(&self) -> usize {
        self.data.len()
    }

    /// Whether the tensor holds no elements. Always false for a valid
    /// tensor, but kept for clippy's sake alongside `len`.
    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    /// Whether an integrity hash has been attached.
    pub fn is_published(&self) -> bool {
        self.integrity.is_some()
    }

    /// Canonical byte encoding of shape and data, the hashing pre-image.
    fn canonical_bytes(&self) -> Vec<u8> {
        let mut bytes = Vec::with_capacity(8 + self.shape.len() * 8 + self.data.len() * 4);
        bytes.extend_from_slice(&(self.shape.len() as u64).to_le_bytes());
        for &dim in &self.shape {
            bytes.extend_from_slice(&(dim as u64).to_le_bytes());
        }
        for &v in &self.data {
            bytes.extend_from_slice(&v.to_le_bytes());
        }
        bytes
    }

    /// Compute the blake3 content hash of this tensor.
    pub fn content_hash(&self) -> [u8; 32] {
        *blake3::hash(&self.canonical_bytes()).as_bytes()
    }

    /// Attach the integrity hash, freezing the contents.
    ///
    /// Idempotent: publishing a published tensor recomputes the same hash.
    #[must_use]
    pub fn publish(mut self) -> Self {
        self.integrity = Some(self.content_hash());
        self
    }

    /// Recompute the integrity hash and compare.
    ///
    /// Fails closed: an unpublished tensor or any mismatch returns false.
    pub fn verify(&self) -> bool {
        match self.integrity {
            Some(expected) => self.content_hash() == expected,
            None => false,
        }
    }

    /// Integrity hash as a hex string, for logs and proofs.
    pub fn integrity_hex(&self) -> Option<String> {
        self.integrity.map(hex::encode)
    }

    /// Elementwise sum with another tensor of the same shape.
    ///
    /// Returns a new, unpublished tensor under the given id.
    pub fn add(&self, other: &Tensor, id: impl Into<TensorId>, now_ms: u64) -> Result<Tensor> {
        if self.shape != other.shape {
            return Err(Error::ShapeMismatch {
                expected: self.shape.clone(),
                got: other.shape.clone(),
            });
        }
        let data = self
            .data
            .iter()
            .zip(&other.data)
            .map(|(a, b)| a + b)
            .collect();
        Tensor::from_data(id, self.shape.clone(), data, self.origin.clone(), now_ms)
    }

    /// Elementwise scaling. Returns a new, unpublished tensor.
    pub fn scale(&self, factor: f32, id: impl Into<TensorId>, now_ms: u64) -> Tensor {
        Tensor {
            id: id.into(),
            shape: self.shape.clone(),
            data: self.data.iter().map(|v| v * factor).collect(),
            origin: self.origin.clone(),
            created_at_ms: now_ms,
            version: 1,
            prev: None,
            integrity: None,
            replication_factor: self.replication_factor,
            consistency: self.consistency,
        }
    }

    /// Produce the next version of this lineage with new contents.
    ///
    /// The new tensor carries `version + 1` and a back-reference to this
    /// tensor's id. Requires this tensor to be published, since only
    /// published tensors are part of a lineage.
    pub fn next_version(
        &self,
        id: impl Into<TensorId>,
        data: Vec<f32>,
        now_ms: u64,
    ) -> Result<Tensor> {
        if !self.is_published() {
            return Err(Error::NotPublished(self.id.clone()));
        }
        let expected: usize = self.shape.iter().product();
        if data.len() != expected {
            return Err(Error::ShapeMismatch {
                expected: self.shape.clone(),
                got: vec![data.len()],
            });
        }
        Ok(Tensor {
            id: id.into(),
            shape: self.shape.clone(),
            data,
            origin: self.origin.clone(),
            created_at_ms: now_ms,
            version: self.version + 1,
            prev: Some(self.id.clone()),
            integrity: None,
            replication_factor: self.replication_factor,
            consistency: self.consistency,
        })
    }

    /// Serialize to bytes. Round-trips byte-exact through `from_bytes`.
    pub fn to_bytes(&self) -> Result<Vec<u8>> {
        Ok(bincode::serialize(self)?)
    }

    /// Deserialize from bytes.
    pub fn from_bytes(bytes: &[u8]) -> Result<Self> {
        Ok(bincode::deserialize(bytes)?)
    }
}
