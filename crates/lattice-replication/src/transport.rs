//! Transport seam for replica copies.
//!
//! Production deployments put a wire protocol behind this trait; the
//! in-process [`LocalTransport`] clones the tensor, which is exactly what
//! a faithful copy looks like from the manager's point of view. Tests
//! substitute slow or corrupting transports to exercise the deadline and
//! integrity paths.

use lattice_tensor::Tensor;
use lattice_topology::WorkerId;

/// Delivers a tensor copy to a target worker.
pub trait ReplicaTransport: Send + Sync {
    /// Copy `tensor` to `target`, returning the bytes as received there.
    ///
    /// Returns `None` if the target is unreachable. May suspend; the
    /// replication manager applies the per-target deadline around it.
    fn copy(
        &self,
        tensor: &Tensor,
        target: &WorkerId,
    ) -> impl std::future::Future<Output = Option<Tensor>> + Send;
}

/// In-process transport: a copy is a clone.
#[derive(Debug, Clone, Copy, Default)]
pub struct LocalTransport;

impl ReplicaTransport for LocalTransport {
    async fn copy(&self, tensor: &Tensor, _target: &WorkerId) -> Option<Tensor> {
        Some(tensor.clone())
    }
}
