//! Lattice Coordinator
//!
//! The orchestration layer. Every other crate in the workspace is a
//! component with explicit inputs; the coordinator owns one instance of
//! each and wires the flow together:
//!
//! 1. workers register (topology registry);
//! 2. workers submit local tensors per logical key — each submission is
//!    stored, replicated, and noted in a batching window;
//! 3. when more than one worker proposes the same key inside the window,
//!    a consensus round opens over the proposers;
//! 4. accepted rounds commit the agreed value, fold it into the memory
//!    graph, and adjust voter reliability;
//! 5. `tick` drives everything time-based: silence expiry, batch
//!    flushing, consensus deadlines, bounded retry of expired rounds,
//!    and scheduled consolidation.
//!
//! Callers always get a result plus an explicit quality indicator
//! (contributing workers, effective replication factor, consensus
//! state); degraded results are reported, never silently upgraded.
//!
//! Shared state is behind `tokio::sync` locks: readers run concurrently,
//! writers serialize per component. The coordinator itself can be shared
//! behind an `Arc` by an embedding server.

mod backoff;
mod batch;
mod coordinator;
mod error;
mod health;

pub use backoff::Backoff;
pub use batch::{BatchWindow, FlushedBatch};
pub use coordinator::{
    AggregateView, Coordinator, CoordinatorConfig, NetworkSnapshot, SubmitAck, TickReport,
    WorkerSummary, COORDINATOR_ID,
};
pub use error::{Error, Result};
pub use health::{HealthMonitor, HealthStatus, WorkerHealth};
