//! Local Risk Scorer integration tests: score range, level mapping,
//! metadata penalties, 1-hop propagation, and provider degradation.

use riskgraph_core::engine::RiskGraphEngine;
use riskgraph_core::signal::UserSignals;
use riskgraph_core::weigher::RawObservation;
use riskgraph_core::{ConnectionType, RiskLevel};

fn device_obs(a: &str, b: &str, fingerprint: &str) -> RawObservation {
    RawObservation {
        user_a: a.to_string(),
        user_b: b.to_string(),
        kind: ConnectionType::DeviceMatch,
        signal_value: Some(fingerprint.to_string()),
    }
}

/// The score is always in [0, 100] and the level always matches the
/// fixed threshold bands.
#[test]
fn score_range_and_level_mapping_hold() {
    let (engine, fixtures) = RiskGraphEngine::build_test().unwrap();
    fixtures.trust.set_score("u-a", 500);
    fixtures.signals.set_signals(
        "u-a",
        UserSignals {
            account_age_days: 0,
            report_count: 100,
            block_count: 100,
            ..Default::default()
        },
    );
    engine
        .record_observation(&device_obs("u-a", "u-b", "dev-1"))
        .unwrap();

    let analysis = engine.analyze_user("u-a").unwrap();
    let score = analysis.node.risk_score;
    assert!((0..=100).contains(&score), "score out of range: {score}");
    assert_eq!(analysis.node.risk_level, RiskLevel::from_score(score));
}

/// More negative evidence never lowers the score: a heavily reported new
/// account scores above a clean established one.
#[test]
fn negative_evidence_raises_score() {
    let (engine, fixtures) = RiskGraphEngine::build_test().unwrap();
    fixtures.trust.set_score("u-clean", 900);
    fixtures.trust.set_score("u-bad", 100);
    fixtures.signals.set_signals(
        "u-clean",
        UserSignals {
            account_age_days: 900,
            ..Default::default()
        },
    );
    fixtures.signals.set_signals(
        "u-bad",
        UserSignals {
            account_age_days: 1,
            report_count: 5,
            block_count: 3,
            ..Default::default()
        },
    );
    engine
        .record_observation(&device_obs("u-clean", "u-bad", "dev-1"))
        .unwrap();

    let clean = engine.analyze_user("u-clean").unwrap();
    let bad = engine.analyze_user("u-bad").unwrap();
    assert!(
        bad.node.risk_score > clean.node.risk_score,
        "bad {} vs clean {}",
        bad.node.risk_score,
        clean.node.risk_score
    );
}

/// A high-risk neighbor on a strong edge raises the score through 1-hop
/// propagation; before the neighbor is scored high it contributes nothing.
#[test]
fn high_risk_neighbor_propagates_one_hop() {
    let (engine, fixtures) = RiskGraphEngine::build_test().unwrap();
    fixtures.trust.set_score("n-mid", 500);
    fixtures.trust.set_score("n-bad", 0);
    fixtures.signals.set_signals(
        "n-mid",
        UserSignals {
            account_age_days: 400,
            ..Default::default()
        },
    );
    fixtures.signals.set_signals(
        "n-bad",
        UserSignals {
            account_age_days: 0,
            report_count: 5,
            block_count: 3,
            ..Default::default()
        },
    );
    engine
        .record_observation(&device_obs("n-mid", "n-bad", "dev-1"))
        .unwrap();

    // Neighbor still unscored: no propagation yet.
    let before = engine.analyze_user("n-mid").unwrap().node.risk_score;

    let bad = engine.analyze_user("n-bad").unwrap();
    assert!(
        bad.node.risk_level >= RiskLevel::High,
        "fixture neighbor must land high, got {}",
        bad.node.risk_score
    );

    let after = engine.analyze_user("n-mid").unwrap().node.risk_score;
    assert!(
        after > before,
        "propagation must raise the score: {before} -> {after}"
    );
}

/// A device shared across 3+ accounts forces review regardless of the
/// aggregate score.
#[test]
fn shared_device_forces_review_at_low_score() {
    let (engine, fixtures) = RiskGraphEngine::build_test().unwrap();
    fixtures.trust.set_score("hub", 500);
    fixtures.signals.set_signals(
        "hub",
        UserSignals {
            account_age_days: 400,
            ..Default::default()
        },
    );
    for other in ["s-1", "s-2", "s-3"] {
        engine
            .record_observation(&device_obs("hub", other, "dev-hub"))
            .unwrap();
    }

    let analysis = engine.analyze_user("hub").unwrap();
    assert!(
        analysis.node.risk_level < RiskLevel::High,
        "fixture is meant to stay below the score-based review line, got {}",
        analysis.node.risk_score
    );
    assert!(analysis.requires_review, "sharing flag must force review");
    assert!(analysis.node.flags.contains("shared_device_3plus"));
    assert!(analysis
        .recommendations
        .iter()
        .any(|r| r.contains("multi-accounting")));
}

/// Trust provider unavailability degrades the analysis (neutral default,
/// degraded flag) instead of failing it.
#[test]
fn trust_outage_degrades_not_fails() {
    let (engine, fixtures) = RiskGraphEngine::build_test().unwrap();
    engine
        .record_observation(&device_obs("u-a", "u-b", "dev-1"))
        .unwrap();
    fixtures.trust.set_available(false);

    let analysis = engine.analyze_user("u-a").unwrap();
    assert!(analysis.degraded);
    assert_eq!(analysis.node.trust_score, 500, "neutral default stands in");
    assert!(analysis
        .recommendations
        .iter()
        .any(|r| r.contains("provisional")));
}

/// Strong edges show up as suspicious connections; weak ones do not.
#[test]
fn suspicious_connections_respect_weight_threshold() {
    let (engine, fixtures) = RiskGraphEngine::build_test().unwrap();
    fixtures.trust.set_score("u-a", 500);
    engine
        .record_observation(&device_obs("u-a", "u-strong", "dev-1"))
        .unwrap();
    engine
        .record_observation(&RawObservation {
            user_a: "u-a".to_string(),
            user_b: "u-weak".to_string(),
            kind: ConnectionType::Chat,
            signal_value: None,
        })
        .unwrap();

    let analysis = engine.analyze_user("u-a").unwrap();
    let ids: Vec<&str> = analysis
        .suspicious_connections
        .iter()
        .map(|s| s.neighbor_id.as_str())
        .collect();
    assert_eq!(ids, vec!["u-strong"]);
}

/// A sharing flag backed by the provider's device reverse lookup (one
/// local neighbor, but the device links 3+ other accounts) survives
/// re-scoring for as long as the provider still reports the sharing,
/// and clears once it lapses.
#[test]
fn provider_backed_flag_survives_rescoring() {
    let (engine, fixtures) = RiskGraphEngine::build_test().unwrap();
    fixtures.trust.set_score("h-a", 500);
    for user in ["h-a", "h-b", "h-c", "h-d"] {
        fixtures.signals.set_signals(
            user,
            UserSignals {
                account_age_days: 400,
                device_fingerprints: ["dev-h"].map(String::from).into(),
                ..Default::default()
            },
        );
    }
    engine
        .record_observation(&device_obs("h-a", "h-b", "dev-h"))
        .unwrap();
    assert!(
        engine
            .store()
            .require_node("h-a")
            .unwrap()
            .flags
            .contains("shared_device_3plus"),
        "reverse lookup must flag the hub despite a single local neighbor"
    );

    let analysis = engine.analyze_user("h-a").unwrap();
    assert!(
        analysis.node.flags.contains("shared_device_3plus"),
        "dev-h still links 3+ other accounts; re-scoring must not clear the flag"
    );
    assert!(analysis.requires_review);

    // The other accounts drop off the device: the condition has lapsed
    // and the next recompute may clear the flag.
    for user in ["h-b", "h-c", "h-d"] {
        fixtures.signals.set_signals(
            user,
            UserSignals {
                account_age_days: 400,
                ..Default::default()
            },
        );
    }
    let analysis = engine.analyze_user("h-a").unwrap();
    assert!(!analysis.node.flags.contains("shared_device_3plus"));
}

/// With the signal provider down, re-scoring cannot verify a sharing
/// flag has lapsed, so it stays set.
#[test]
fn degraded_provider_never_clears_sharing_flags() {
    let (engine, fixtures) = RiskGraphEngine::build_test().unwrap();
    fixtures.trust.set_score("h-a", 500);
    for user in ["h-a", "h-b", "h-c", "h-d"] {
        fixtures.signals.set_signals(
            user,
            UserSignals {
                account_age_days: 400,
                device_fingerprints: ["dev-h"].map(String::from).into(),
                ..Default::default()
            },
        );
    }
    engine
        .record_observation(&device_obs("h-a", "h-b", "dev-h"))
        .unwrap();

    fixtures.signals.set_available(false);
    let analysis = engine.analyze_user("h-a").unwrap();
    assert!(analysis.node.flags.contains("shared_device_3plus"));
    assert!(analysis.requires_review);
}

/// Scoring clears the dirty flag and appends a node_scored audit event.
#[test]
fn scoring_clears_dirty_and_audits() {
    let (engine, fixtures) = RiskGraphEngine::build_test().unwrap();
    fixtures.trust.set_score("u-a", 500);
    engine
        .record_observation(&device_obs("u-a", "u-b", "dev-1"))
        .unwrap();
    assert!(engine.store().require_node("u-a").unwrap().dirty);

    engine.analyze_user("u-a").unwrap();
    assert!(!engine.store().require_node("u-a").unwrap().dirty);
    assert_eq!(engine.store().event_count("node_scored").unwrap(), 1);
}
