//! graph-runner: headless exerciser for the risk graph engine.
//!
//! Seeds a synthetic population containing a device-sharing fraud ring,
//! an IP-sharing bot farm, and benign background chatter, then runs the
//! full pipeline: observations, per-user analysis, cluster detection,
//! and a bulk block of the highest-confidence cluster.
//!
//! Usage:
//!   graph-runner --seed 12345 --accounts 40 --db run.db

use anyhow::Result;
use rand::{Rng, SeedableRng};
use rand_pcg::Pcg64Mcg;
use riskgraph_core::{
    signal::{RecordingSanctionSink, StaticSignalProvider, StaticTrustProvider, UserSignals},
    CancelToken, ConnectionType, EngineConfig, GraphStore, RawObservation, RiskGraphEngine,
    RiskLevel,
};
use std::env;

const RING_SIZE: usize = 4;
const BOT_FARM_SIZE: usize = 6;

fn main() -> Result<()> {
    env_logger::init();

    let args: Vec<String> = env::args().collect();
    let seed = parse_arg(&args, "--seed", 42u64);
    let accounts = parse_arg(&args, "--accounts", 40usize);
    let db = args
        .windows(2)
        .find(|w| w[0] == "--db")
        .map(|w| w[1].as_str())
        .unwrap_or(":memory:");

    println!("risk graph — graph-runner");
    println!("  seed:     {seed}");
    println!("  accounts: {accounts}");
    println!("  db:       {db}");
    println!();

    let store = if db == ":memory:" {
        GraphStore::in_memory()?
    } else {
        GraphStore::open(db)?
    };

    let trust = StaticTrustProvider::new();
    let signals = StaticSignalProvider::new();
    let sanctions = RecordingSanctionSink::new();
    let engine = RiskGraphEngine::new(
        store,
        EngineConfig::default(),
        Box::new(trust.clone()),
        Box::new(signals.clone()),
        Box::new(sanctions.clone()),
    )?;

    let mut rng = Pcg64Mcg::seed_from_u64(seed);
    let users = seed_population(&mut rng, accounts, &trust, &signals);
    record_observations(&mut rng, &engine, &users)?;

    // Benign users without a single observed edge never got a node.
    for user in &users {
        if engine.store().get_node(&user.id)?.is_some() {
            engine.analyze_user(&user.id)?;
        }
    }

    let clusters = engine.detect_clusters(&CancelToken::new())?;

    // Block the strongest finding, if any.
    let blocked = match clusters
        .iter()
        .max_by(|a, b| a.confidence.total_cmp(&b.confidence))
    {
        Some(top) => {
            engine.block_cluster(&top.cluster_id, "admin-runner", "automated demo block")?;
            Some(top.cluster_id.clone())
        }
        None => None,
    };

    print_summary(&engine, &users, &sanctions, blocked.as_deref())?;
    Ok(())
}

struct SyntheticUser {
    id: String,
    cohort: Cohort,
}

#[derive(Clone, Copy, PartialEq)]
enum Cohort {
    FraudRing,
    BotFarm,
    Benign,
}

/// First RING_SIZE users share a device, the next BOT_FARM_SIZE share an
/// IP, everyone else is ordinary.
fn seed_population(
    rng: &mut Pcg64Mcg,
    accounts: usize,
    trust: &StaticTrustProvider,
    signals: &StaticSignalProvider,
) -> Vec<SyntheticUser> {
    let total = accounts.max(RING_SIZE + BOT_FARM_SIZE + 3);
    let mut users = Vec::with_capacity(total);

    for i in 0..total {
        let id = format!("user-{i:04}");
        let cohort = if i < RING_SIZE {
            Cohort::FraudRing
        } else if i < RING_SIZE + BOT_FARM_SIZE {
            Cohort::BotFarm
        } else {
            Cohort::Benign
        };

        let mut sig = UserSignals::default();
        match cohort {
            Cohort::FraudRing => {
                sig.account_age_days = rng.gen_range(0..4);
                sig.device_fingerprints.insert("device-ring-1".to_string());
                sig.behavioral_signature = Some("sig-ring".to_string());
                sig.report_count = rng.gen_range(1..4);
                trust.set_score(&id, rng.gen_range(100..300));
            }
            Cohort::BotFarm => {
                sig.account_age_days = rng.gen_range(0..3);
                sig.ip_addresses.insert("10.0.0.66".to_string());
                sig.behavioral_signature = Some("sig-bot".to_string());
                trust.set_score(&id, rng.gen_range(50..250));
            }
            Cohort::Benign => {
                sig.account_age_days = rng.gen_range(30..2000);
                sig.device_fingerprints.insert(format!("device-{i}"));
                sig.ip_addresses.insert(format!("192.168.1.{i}"));
                trust.set_score(&id, rng.gen_range(400..950));
            }
        }
        signals.set_signals(&id, sig);
        users.push(SyntheticUser { id, cohort });
    }
    users
}

fn record_observations(
    rng: &mut Pcg64Mcg,
    engine: &RiskGraphEngine,
    users: &[SyntheticUser],
) -> Result<()> {
    let ring: Vec<&SyntheticUser> = users
        .iter()
        .filter(|u| u.cohort == Cohort::FraudRing)
        .collect();
    let bots: Vec<&SyntheticUser> = users
        .iter()
        .filter(|u| u.cohort == Cohort::BotFarm)
        .collect();
    let benign: Vec<&SyntheticUser> = users
        .iter()
        .filter(|u| u.cohort == Cohort::Benign)
        .collect();

    // Ring: pairwise device matches on the shared fingerprint.
    for (i, a) in ring.iter().enumerate() {
        for b in ring.iter().skip(i + 1) {
            engine.record_observation(&RawObservation {
                user_a: a.id.clone(),
                user_b: b.id.clone(),
                kind: ConnectionType::DeviceMatch,
                signal_value: Some("device-ring-1".to_string()),
            })?;
        }
    }

    // Bot farm: a chain of IP matches is enough to connect the component.
    for pair in bots.windows(2) {
        engine.record_observation(&RawObservation {
            user_a: pair[0].id.clone(),
            user_b: pair[1].id.clone(),
            kind: ConnectionType::IpMatch,
            signal_value: Some("10.0.0.66".to_string()),
        })?;
    }

    // Benign background: random chat and referral edges, too weak to cluster.
    for _ in 0..benign.len() * 2 {
        let a = &benign[rng.gen_range(0..benign.len())];
        let b = &benign[rng.gen_range(0..benign.len())];
        if a.id == b.id {
            continue;
        }
        let kind = if rng.gen_bool(0.7) {
            ConnectionType::Chat
        } else {
            ConnectionType::Referral
        };
        engine.record_observation(&RawObservation {
            user_a: a.id.clone(),
            user_b: b.id.clone(),
            kind,
            signal_value: None,
        })?;
    }
    Ok(())
}

fn print_summary(
    engine: &RiskGraphEngine,
    users: &[SyntheticUser],
    sanctions: &RecordingSanctionSink,
    blocked: Option<&str>,
) -> Result<()> {
    let store = engine.store();
    let clusters = store.all_clusters()?;

    let mut review_count = 0usize;
    let mut high_or_worse = 0usize;
    for user in users {
        if let Some(node) = store.get_node(&user.id)? {
            if node.risk_level >= RiskLevel::High {
                high_or_worse += 1;
            }
            if !node.flags.is_empty() {
                review_count += 1;
            }
        }
    }

    println!("=== RUN SUMMARY ===");
    println!("  nodes:            {}", store.node_count()?);
    println!("  high+ risk nodes: {high_or_worse}");
    println!("  flagged nodes:    {review_count}");
    println!("  clusters:         {}", clusters.len());
    println!();
    println!("=== CLUSTERS ===");
    if clusters.is_empty() {
        println!("  (none detected)");
    }
    for c in &clusters {
        println!(
            "  {} | {} | {} member(s) | confidence {:.2} | {} | centroid {}",
            c.cluster_id,
            c.pattern.name(),
            c.members.len(),
            c.confidence,
            c.status.name(),
            c.centroid
        );
    }
    println!();
    println!("=== SANCTIONS ===");
    let emissions = sanctions.emissions();
    if emissions.is_empty() {
        println!("  (none emitted)");
    }
    for (cluster_id, members, reason) in &emissions {
        println!(
            "  {cluster_id} | {} account(s) | reason: {reason}",
            members.len()
        );
    }
    if let Some(id) = blocked {
        println!();
        println!("  blocked cluster: {id}");
        for action in engine.audit_trail(id)? {
            println!("    {} by {} ({})", action.action, action.admin_id, action.reason);
        }
    }
    Ok(())
}

fn parse_arg<T: std::str::FromStr + Copy>(args: &[String], flag: &str, default: T) -> T {
    args.windows(2)
        .find(|w| w[0] == flag)
        .and_then(|w| w[1].parse().ok())
        .unwrap_or(default)
}
