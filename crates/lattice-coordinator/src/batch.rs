//! The batching window for concurrent updates to a logical key.
//!
//! Submissions to the same key are collected for a short window. If the
//! window closes with more than one distinct proposer, the coordinator
//! opens a consensus round over them instead of picking a winner.

use std::collections::HashMap;

use lattice_tensor::TensorId;
use lattice_topology::WorkerId;

/// One closed window's worth of proposals for a key.
#[derive(Debug, Clone)]
pub struct FlushedBatch {
    pub logical_key: String,
    /// Latest tensor per proposer within the window.
    pub proposers: Vec<(WorkerId, TensorId)>,
}

impl FlushedBatch {
    /// Whether the batch needs a consensus round.
    pub fn is_contended(&self) -> bool {
        self.proposers.len() > 1
    }
}

#[derive(Debug)]
struct OpenBatch {
    opened_at_ms: u64,
    // latest proposal per worker wins within the window
    proposers: HashMap<WorkerId, TensorId>,
}

/// Collects per-key submissions until their window elapses.
#[derive(Debug)]
pub struct BatchWindow {
    window_ms: u64,
    pending: HashMap<String, OpenBatch>,
}

impl BatchWindow {
    pub fn new(window_ms: u64) -> Self {
        Self {
            window_ms,
            pending: HashMap::new(),
        }
    }

    /// Note a submission. The window for a key opens at its first
    /// submission; later submissions join it without extending it.
    pub fn note(&mut self, logical_key: &str, worker: WorkerId, tensor: TensorId, now_ms: u64) {
        let batch = self
            .pending
            .entry(logical_key.to_owned())
            .or_insert_with(|| OpenBatch {
                opened_at_ms: now_ms,
                proposers: HashMap::new(),
            });
        batch.proposers.insert(worker, tensor);
    }

    /// Close and return every batch whose window has elapsed.
    pub fn flush(&mut self, now_ms: u64) -> Vec<FlushedBatch> {
        let window_ms = self.window_ms;
        let due: Vec<String> = self
            .pending
            .iter()
            .filter(|(_, b)| now_ms >= b.opened_at_ms + window_ms)
            .map(|(key, _)| key.clone())
            .collect();

        due.into_iter()
            .filter_map(|key| {
                self.pending.remove(&key).map(|batch| FlushedBatch {
                    logical_key: key,
                    proposers: batch.proposers.into_iter().collect(),
                })
            })
            .collect()
    }

    /// Keys with an open window.
    pub fn pending_keys(&self) -> Vec<&str> {
        self.pending.keys().map(String::as_str).collect()
    }

    pub fn is_empty(&self) -> bool {
        self.pending.is_empty()
    }
}
