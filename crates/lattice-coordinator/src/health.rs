//! Per-worker health tracking from consensus participation.

use std::collections::HashMap;

use lattice_topology::WorkerId;

/// Consecutive dissents/failures before a worker is flagged.
const SUSPECT_THRESHOLD: u32 = 3;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HealthStatus {
    Healthy,
    /// Repeatedly on the losing side of consensus rounds.
    Suspect,
}

impl std::fmt::Display for HealthStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Healthy => write!(f, "healthy"),
            Self::Suspect => write!(f, "suspect"),
        }
    }
}

/// One worker's consensus track record.
#[derive(Debug, Clone)]
pub struct WorkerHealth {
    pub worker: WorkerId,
    pub consecutive_failures: u32,
    pub last_success_ms: Option<u64>,
    pub status: HealthStatus,
}

#[derive(Debug, Default)]
struct Record {
    consecutive_failures: u32,
    last_success_ms: Option<u64>,
}

/// Tracks agreement/dissent streaks per worker.
#[derive(Debug, Default)]
pub struct HealthMonitor {
    records: HashMap<WorkerId, Record>,
}

impl HealthMonitor {
    pub fn new() -> Self {
        Self::default()
    }

    /// The worker voted with the terminal outcome.
    pub fn mark_success(&mut self, worker: &WorkerId, now_ms: u64) {
        let record = self.records.entry(worker.clone()).or_default();
        record.consecutive_failures = 0;
        record.last_success_ms = Some(now_ms);
    }

    /// The worker dissented from the terminal outcome.
    pub fn mark_failure(&mut self, worker: &WorkerId) {
        let record = self.records.entry(worker.clone()).or_default();
        record.consecutive_failures += 1;
    }

    pub fn forget(&mut self, worker: &WorkerId) {
        self.records.remove(worker);
    }

    pub fn status_of(&self, worker: &WorkerId) -> HealthStatus {
        match self.records.get(worker) {
            Some(r) if r.consecutive_failures >= SUSPECT_THRESHOLD => HealthStatus::Suspect,
            _ => HealthStatus::Healthy,
        }
    }

    /// Full report, one entry per tracked worker.
    pub fn report(&self) -> Vec<WorkerHealth> {
        let mut entries: Vec<WorkerHealth> = self
            .records
            .iter()
            .map(|(worker, r)| WorkerHealth {
                worker: worker.clone(),
                consecutive_failures: r.consecutive_failures,
                last_success_ms: r.last_success_ms,
                status: if r.consecutive_failures >= SUSPECT_THRESHOLD {
                    HealthStatus::Suspect
                } else {
                    HealthStatus::Healthy
                },
            })
            .collect();
        entries.sort_by(|a, b| a.worker.cmp(&b.worker));
        entries
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn worker(id: &str) -> WorkerId {
        WorkerId::from(id)
    }

    #[test]
    fn untracked_workers_read_healthy() {
        let m = HealthMonitor::new();
        assert_eq!(m.status_of(&worker("w")), HealthStatus::Healthy);
    }

    #[test]
    fn failures_accumulate_to_suspect() {
        let mut m = HealthMonitor::new();
        let w = worker("w");
        m.mark_failure(&w);
        m.mark_failure(&w);
        assert_eq!(m.status_of(&w), HealthStatus::Healthy);
        m.mark_failure(&w);
        assert_eq!(m.status_of(&w), HealthStatus::Suspect);
    }

    #[test]
    fn success_resets_the_streak() {
        let mut m = HealthMonitor::new();
        let w = worker("w");
        for _ in 0..5 {
            m.mark_failure(&w);
        }
        m.mark_success(&w, 1_000);
        assert_eq!(m.status_of(&w), HealthStatus::Healthy);

        let report = m.report();
        assert_eq!(report.len(), 1);
        assert_eq!(report[0].last_success_ms, Some(1_000));
        assert_eq!(report[0].consecutive_failures, 0);
    }

    #[test]
    fn forget_drops_the_record() {
        let mut m = HealthMonitor::new();
        let w = worker("w");
        m.mark_failure(&w);
        m.forget(&w);
        assert!(m.report().is_empty());
    }
}
