//! End-to-end scenarios across the mesh: submission, replication,
//! aggregation, consensus, and memory, driven through the coordinator
//! or through the components wired together by hand.

use std::collections::BTreeSet;
use std::time::Duration;

use lattice_attention::{AttentionAggregator, AttentionConfig};
use lattice_consensus::{
    max_faulty, ConsensusConfig, ConsensusEngine, ProposalState, Vote,
};
use lattice_coordinator::{Backoff, Coordinator, CoordinatorConfig};
use lattice_replication::{ReplicationConfig, ReplicationManager};
use lattice_tensor::{Tensor, TensorId};
use lattice_topology::{GeoCoord, TopologyConfig, TopologyRegistry, WorkerDescriptor, WorkerId};

fn worker(id: &str) -> WorkerId {
    WorkerId::from(id)
}

fn descriptor(id: &str, lat: f64, lon: f64) -> WorkerDescriptor {
    WorkerDescriptor::new(id, GeoCoord::new(lat, lon), 100.0)
}

fn published(id: &str, origin: &str, data: Vec<f32>, now_ms: u64) -> Tensor {
    let shape = vec![data.len()];
    Tensor::from_data(id, shape, data, worker(origin), now_ms)
        .unwrap()
        .publish()
}

/// Published tensors verify after publish and after any number of hops.
#[tokio::test]
async fn replicas_verify_everywhere() {
    let mut registry = TopologyRegistry::new(TopologyConfig::default());
    for (i, id) in ["origin", "near", "far", "farther"].iter().enumerate() {
        registry
            .register(descriptor(id, 5.0 * i as f64, 0.0), 0)
            .unwrap();
    }

    let tensor = published("t", "origin", vec![1.0, 2.0, 3.0], 0);
    assert!(tensor.verify());

    let mut manager = ReplicationManager::new(ReplicationConfig::default());
    let outcome = manager.replicate(&tensor, 4, &registry, 10).await.unwrap();
    assert_eq!(outcome.effective_factor, 4);

    for location in &outcome.locations {
        let replica = manager.replica_at(&tensor.id, location).unwrap();
        assert!(replica.verify());
        assert_eq!(replica.integrity, tensor.integrity);
    }
    assert_eq!(outcome.proofs.len(), 3);
}

/// Factor 5 with only 2 eligible targets: 2 locations, effective 3.
#[tokio::test]
async fn oversized_factor_degrades_gracefully() {
    let mut registry = TopologyRegistry::new(TopologyConfig::default());
    registry.register(descriptor("origin", 0.0, 0.0), 0).unwrap();
    registry.register(descriptor("w1", 1.0, 0.0), 0).unwrap();
    registry.register(descriptor("w2", 2.0, 0.0), 0).unwrap();

    let tensor = published("t", "origin", vec![1.0], 0);
    let mut manager = ReplicationManager::new(ReplicationConfig::default());
    let outcome = manager.replicate(&tensor, 5, &registry, 10).await.unwrap();

    assert_eq!(outcome.locations.len(), 2);
    assert_eq!(outcome.effective_factor, 3);
    assert_eq!(outcome.requested_factor, 5);
    assert!(outcome.is_degraded());
}

/// Two equally near, equally fresh candidates pull the aggregate to the
/// middle: query [1,1,0] over [1,0,0] and [0,1,0] lands at [0.5,0.5,0].
#[tokio::test]
async fn balanced_candidates_split_the_aggregate() {
    let mut registry = TopologyRegistry::new(TopologyConfig::default());
    // co-located: identical latency from the query's origin
    registry.register(descriptor("q", 0.0, 0.0), 0).unwrap();
    registry.register(descriptor("a", 3.0, 3.0), 0).unwrap();
    registry.register(descriptor("b", 3.0, 3.0), 0).unwrap();

    let query = published("query", "q", vec![1.0, 1.0, 0.0], 1_000);
    let cand_a = published("ta", "a", vec![1.0, 0.0, 0.0], 1_000);
    let cand_b = published("tb", "b", vec![0.0, 1.0, 0.0], 1_000);

    let aggregator = AttentionAggregator::new(AttentionConfig::default());
    let outcome = aggregator
        .aggregate(&query, &[cand_a, cand_b], &registry, "agg", 1_000)
        .unwrap();

    assert_eq!(outcome.contributing, 2);
    assert!((outcome.weights.sum() - 1.0).abs() < 1e-6);
    assert!((outcome.tensor.data[0] - 0.5).abs() < 1e-6);
    assert!((outcome.tensor.data[1] - 0.5).abs() < 1e-6);
    assert!(outcome.tensor.data[2].abs() < 1e-6);
}

/// BFT property: with f = max_faulty(n) participants submitting
/// arbitrary values, the agreed value is the honest majority's.
#[test]
fn faulty_minority_cannot_move_the_agreed_value() {
    let n = 4;
    assert_eq!(max_faulty(n), 1);

    let mut engine = ConsensusEngine::new(ConsensusConfig::default());
    let participants: BTreeSet<WorkerId> =
        ["h1", "h2", "h3", "evil"].iter().map(|id| worker(id)).collect();
    let id = engine
        .open_proposal("key", vec![3], participants, 0)
        .unwrap();

    // the faulty participant votes first, with maximal confidence
    let poison = published("poison", "evil", vec![9e8, -9e8, 9e8], 1);
    let vote = Vote::accept(worker("evil"), 1.0, poison, 1).unwrap();
    engine.vote(id, vote, 1).unwrap();

    for h in ["h1", "h2", "h3"] {
        let value = published(&format!("v-{h}"), h, vec![10.0, 20.0, 30.0], 2);
        let vote = Vote::accept(worker(h), 1.0, value, 2).unwrap();
        let _ = engine.vote(id, vote, 2);
    }

    let record = &engine.history()[0];
    assert_eq!(record.proof.state, ProposalState::Accepted);
    assert_eq!(record.agreed_value, Some(vec![10.0, 20.0, 30.0]));
}

/// A round with no votes expires at its deadline, never accepts.
#[test]
fn silent_round_expires() {
    let mut engine = ConsensusEngine::new(
        ConsensusConfig::default().with_default_deadline(Duration::from_secs(1)),
    );
    let participants: BTreeSet<WorkerId> =
        ["a", "b", "c"].iter().map(|id| worker(id)).collect();
    let id = engine
        .open_proposal("key", vec![1], participants, 0)
        .unwrap();

    assert!(engine.tick(1_000).is_empty());
    assert_eq!(engine.tick(1_001), vec![id]);
    assert_eq!(
        engine.status(id).unwrap().state,
        ProposalState::Expired
    );
    assert!((engine.success_rate()).abs() < 1e-12);
}

/// Persisted tensor bytes round-trip byte-exact and still verify.
#[test]
fn tensor_bytes_round_trip() {
    let tensor = published("t", "w", vec![0.5, -1.5, 3.25], 42);
    let bytes = tensor.to_bytes().unwrap();
    let back = Tensor::from_bytes(&bytes).unwrap();

    assert_eq!(back.id, tensor.id);
    assert_eq!(back.data, tensor.data);
    assert_eq!(back.integrity, tensor.integrity);
    assert!(back.verify());
    assert_eq!(back.to_bytes().unwrap(), bytes);
}

/// The full mesh flow: registration, contended submission, consensus,
/// commit, aggregation, memory.
#[tokio::test]
async fn contended_key_reaches_agreement_end_to_end() {
    let coordinator = Coordinator::new(
        CoordinatorConfig::new()
            .with_batch_window(Duration::from_millis(500))
            .with_consolidation_interval(Duration::from_secs(5))
            .with_backoff(Backoff::new(
                Duration::from_millis(250),
                Duration::from_secs(5),
                2,
            )),
    );
    let sites = [("tokyo", 35.7, 139.7), ("paris", 48.9, 2.3), ("lima", -12.0, -77.0)];
    for (id, lat, lon) in sites {
        coordinator
            .register_worker(descriptor(id, lat, lon), 0)
            .await
            .unwrap();
    }

    // three workers disagree about the same logical key
    let locals = [
        ("tokyo", vec![1.0f32, 2.0]),
        ("paris", vec![1.1, 2.1]),
        ("lima", vec![0.9, 1.9]),
    ];
    for (w, data) in &locals {
        let tensor = Tensor::from_data(
            format!("{w}-risk"),
            vec![2],
            data.clone(),
            worker(w),
            100,
        )
        .unwrap()
        .with_replication_factor(2);
        let ack = coordinator
            .submit_local_tensor(&worker(w), "risk-model", tensor, 100)
            .await
            .unwrap();
        assert_eq!(ack.effective_factor, 2);
    }

    // window closes: one round over the three proposers
    let report = coordinator.tick(700).await;
    assert_eq!(report.opened_proposals.len(), 1);
    let proposal = report.opened_proposals[0];

    // everyone endorses their own local value
    for (w, data) in &locals {
        let value = Tensor::from_data(format!("{w}-vote"), vec![2], data.clone(), worker(w), 800)
            .unwrap()
            .publish();
        let vote = Vote::accept(worker(w), 0.9, value, 800).unwrap();
        let _ = coordinator.cast_vote(proposal, vote, 800).await;
    }

    let status = coordinator.get_consensus_status(proposal).await.unwrap();
    assert_eq!(status.state, ProposalState::Accepted);
    // element-wise median of the three proposals
    assert_eq!(status.agreed_value, Some(vec![1.0, 2.0]));

    let report = coordinator.tick(900).await;
    assert_eq!(report.committed_keys, vec!["risk-model".to_string()]);
    assert_eq!(report.reliability_adjustments, 3);

    // the agreed tensor is the committed value for the key
    let snapshot = coordinator.snapshot().await;
    let committed: &TensorId = snapshot.committed.get("risk-model").unwrap();
    assert!(committed.0.starts_with("risk-model#"));
    assert!((snapshot.consensus_success_rate - 1.0).abs() < 1e-12);

    // aggregation still answers with explicit quality indicators
    let view = coordinator
        .get_aggregate("risk-model", None, 1_000)
        .await
        .unwrap();
    assert!(!view.fallback);
    assert_eq!(view.contributing_workers.len(), 3);
    assert!((view.confidence - 1.0).abs() < 1e-12);

    // after a consolidation pass the agreed value is queryable memory
    let report = coordinator.tick(6_000).await;
    assert_eq!(report.consolidation.unwrap().remembered, 1);
    let probe = published("probe", "tokyo", vec![1.0, 2.0], 6_000);
    let matches = coordinator.query_memory(&probe, 5, 6_100).await;
    assert_eq!(matches.len(), 1);
    assert!(matches[0].similarity > 0.999);
}
