//! Admin Action Gateway integration tests: cluster review, bulk blocking,
//! the lifecycle state machine, the append-only audit trail, and
//! retention of resolved clusters.

use riskgraph_core::engine::RiskGraphEngine;
use riskgraph_core::signal::{
    RecordingSanctionSink, StaticSignalProvider, StaticTrustProvider, UserSignals,
};
use riskgraph_core::weigher::RawObservation;
use riskgraph_core::{
    CancelToken, ClusterStatus, ConnectionType, EngineConfig, GraphError, GraphStore,
};

/// Build an engine with one detected three-member device ring.
fn engine_with_cluster() -> (RiskGraphEngine, riskgraph_core::engine::TestFixtures, String) {
    let (engine, fixtures) = RiskGraphEngine::build_test().unwrap();
    let users = ["u-a", "u-b", "u-c"];
    for (i, a) in users.iter().enumerate() {
        for b in users.iter().skip(i + 1) {
            engine
                .record_observation(&RawObservation {
                    user_a: a.to_string(),
                    user_b: b.to_string(),
                    kind: ConnectionType::DeviceMatch,
                    signal_value: Some("dev-x".to_string()),
                })
                .unwrap();
        }
    }
    let clusters = engine.detect_clusters(&CancelToken::new()).unwrap();
    let id = clusters[0].cluster_id.clone();
    (engine, fixtures, id)
}

/// The review view returns the cluster plus every member's full node.
#[test]
fn cluster_members_returns_full_nodes() {
    let (engine, _, id) = engine_with_cluster();
    let (cluster, nodes) = engine.cluster_members(&id).unwrap();
    assert_eq!(cluster.members.len(), 3);
    assert_eq!(nodes.len(), 3);
    for (member, node) in cluster.members.iter().zip(nodes.iter()) {
        assert_eq!(member, &node.user_id);
        assert!(node.metadata.device_fingerprints.contains("dev-x"));
    }
}

/// An unknown cluster id is a NotFound, not a panic or an empty result.
#[test]
fn unknown_cluster_is_not_found() {
    let (engine, _, _) = engine_with_cluster();
    let err = engine.cluster_members("cluster-nope").unwrap_err();
    assert!(matches!(err, GraphError::NotFound { .. }));
    let err = engine
        .block_cluster("cluster-nope", "admin-1", "test")
        .unwrap_err();
    assert!(matches!(err, GraphError::NotFound { .. }));
}

/// Blocking resolves the cluster, signals every member to the sanction
/// sink, and logs the decision.
#[test]
fn block_resolves_and_sanctions_members() {
    let (engine, fixtures, id) = engine_with_cluster();
    engine.block_cluster(&id, "admin-1", "confirmed ring").unwrap();

    let cluster = engine.store().require_cluster(&id).unwrap();
    assert_eq!(cluster.status, ClusterStatus::Resolved);

    let emissions = fixtures.sanctions.emissions();
    assert_eq!(emissions.len(), 1);
    let (emitted_id, members, reason) = &emissions[0];
    assert_eq!(emitted_id, &id);
    assert_eq!(members.len(), 3);
    assert_eq!(reason, "confirmed ring");

    let trail = engine.audit_trail(&id).unwrap();
    assert_eq!(trail.len(), 1);
    assert_eq!(trail[0].action, "block_cluster");
    assert_eq!(trail[0].admin_id, "admin-1");
    assert_eq!(engine.store().event_count("cluster_blocked").unwrap(), 1);
}

/// Blocking twice is safe: the repeat is logged and re-signalled, but the
/// cluster stays resolved and nothing errors.
#[test]
fn repeated_block_is_safe() {
    let (engine, fixtures, id) = engine_with_cluster();
    engine.block_cluster(&id, "admin-1", "first pass").unwrap();
    engine.block_cluster(&id, "admin-2", "replayed request").unwrap();

    let cluster = engine.store().require_cluster(&id).unwrap();
    assert_eq!(cluster.status, ClusterStatus::Resolved);
    assert_eq!(fixtures.sanctions.emissions().len(), 2);

    let trail = engine.audit_trail(&id).unwrap();
    assert_eq!(trail.len(), 2, "every decision is logged, including replays");
}

/// The lifecycle only moves forward: investigating clusters can be
/// confirmed and resolved; a confirm after resolution is rejected and
/// leaves no audit entry.
#[test]
fn lifecycle_moves_forward_only() {
    let (engine, fixtures) = RiskGraphEngine::build_test().unwrap();
    // Evidence-heavy ring so detection lands directly in INVESTIGATING.
    for user in ["u-a", "u-b", "u-c"] {
        fixtures.signals.set_signals(
            user,
            UserSignals {
                account_age_days: 2,
                device_fingerprints: ["f-1", "f-2", "f-3"].map(String::from).into(),
                ip_addresses: ["i-1", "i-2", "i-3"].map(String::from).into(),
                behavioral_signature: Some("sig-x".to_string()),
                ..Default::default()
            },
        );
    }
    let users = ["u-a", "u-b", "u-c"];
    for (i, a) in users.iter().enumerate() {
        for b in users.iter().skip(i + 1) {
            engine
                .record_observation(&RawObservation {
                    user_a: a.to_string(),
                    user_b: b.to_string(),
                    kind: ConnectionType::DeviceMatch,
                    signal_value: Some("f-1".to_string()),
                })
                .unwrap();
        }
    }
    let clusters = engine.detect_clusters(&CancelToken::new()).unwrap();
    let id = clusters[0].cluster_id.clone();
    assert_eq!(clusters[0].status, ClusterStatus::Investigating);

    engine.confirm_cluster(&id, "admin-1", "manual review").unwrap();
    assert_eq!(
        engine.store().require_cluster(&id).unwrap().status,
        ClusterStatus::Confirmed
    );

    engine.block_cluster(&id, "admin-1", "ban the ring").unwrap();
    let err = engine
        .confirm_cluster(&id, "admin-2", "too late")
        .unwrap_err();
    assert!(matches!(err, GraphError::InvalidTransition { .. }));

    // The rejected transition left no trace in the audit log.
    let trail = engine.audit_trail(&id).unwrap();
    assert_eq!(trail.len(), 2);
}

/// Confirmation is the admin step out of an investigation; a fresh
/// ACTIVE cluster cannot jump straight to CONFIRMED.
#[test]
fn confirm_requires_investigation() {
    let (engine, _, id) = engine_with_cluster();
    assert_eq!(
        engine.store().require_cluster(&id).unwrap().status,
        ClusterStatus::Active
    );
    let err = engine
        .confirm_cluster(&id, "admin-1", "premature")
        .unwrap_err();
    assert!(matches!(err, GraphError::InvalidTransition { .. }));
}

/// Dismissing a false positive resolves the cluster without touching the
/// sanction sink.
#[test]
fn dismissal_resolves_without_sanctions() {
    let (engine, fixtures, id) = engine_with_cluster();
    engine
        .dismiss_cluster(&id, "admin-1", "shared household device")
        .unwrap();

    assert_eq!(
        engine.store().require_cluster(&id).unwrap().status,
        ClusterStatus::Resolved
    );
    assert!(fixtures.sanctions.emissions().is_empty());
}

/// With no retention configured, resolved clusters are kept forever.
#[test]
fn no_retention_keeps_resolved_clusters() {
    let (engine, _, id) = engine_with_cluster();
    engine.block_cluster(&id, "admin-1", "done").unwrap();
    assert_eq!(engine.purge_resolved_clusters().unwrap(), 0);
    assert!(engine.store().get_cluster(&id).unwrap().is_some());
}

/// With a retention window, resolved clusters past it are purged; the
/// audit actions survive the cluster row.
#[test]
fn retention_purges_resolved_but_keeps_audit() {
    let trust = StaticTrustProvider::new();
    let signals = StaticSignalProvider::new();
    let sanctions = RecordingSanctionSink::new();
    let config = EngineConfig {
        resolved_retention_days: Some(0),
        ..EngineConfig::default()
    };
    let engine = RiskGraphEngine::new(
        GraphStore::in_memory().unwrap(),
        config,
        Box::new(trust),
        Box::new(signals),
        Box::new(sanctions),
    )
    .unwrap();

    let users = ["u-a", "u-b", "u-c"];
    for (i, a) in users.iter().enumerate() {
        for b in users.iter().skip(i + 1) {
            engine
                .record_observation(&RawObservation {
                    user_a: a.to_string(),
                    user_b: b.to_string(),
                    kind: ConnectionType::DeviceMatch,
                    signal_value: Some("dev-x".to_string()),
                })
                .unwrap();
        }
    }
    let id = engine.detect_clusters(&CancelToken::new()).unwrap()[0]
        .cluster_id
        .clone();
    engine.block_cluster(&id, "admin-1", "done").unwrap();

    assert_eq!(engine.purge_resolved_clusters().unwrap(), 1);
    assert!(engine.store().get_cluster(&id).unwrap().is_none());
    assert_eq!(engine.audit_trail(&id).unwrap().len(), 1);
}

/// Active clusters are untouched by retention, whatever their age.
#[test]
fn retention_never_touches_active_clusters() {
    let (engine, _, id) = engine_with_cluster();
    assert_eq!(
        engine.store().require_cluster(&id).unwrap().status,
        ClusterStatus::Active
    );
    assert_eq!(engine.store().purge_resolved_before(0).unwrap(), 0);
    assert!(engine.store().get_cluster(&id).unwrap().is_some());
}
