//! External collaborator interfaces.
//!
//! The engine consumes trust scores and raw fraud signals from external
//! stores and emits sanction requests to the account-lifecycle system.
//! All three seams are traits; the engine never mutates provider state.
//!
//! In-memory fixture implementations live here too — they back the
//! integration tests and the graph-runner binary.

use crate::{
    error::{GraphError, GraphResult},
    node::NodeMetadata,
    types::UserId,
};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeSet, HashMap};
use std::sync::{
    atomic::{AtomicBool, Ordering},
    Arc, Mutex,
};

/// Composite trust/reputation score computed elsewhere. May be stale.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TrustScore {
    /// 0..=1000.
    pub score: i64,
    pub tier: String,
}

/// Raw per-user fraud signals, queryable by user id.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct UserSignals {
    pub account_age_days: i64,
    pub device_fingerprints: BTreeSet<String>,
    pub ip_addresses: BTreeSet<String>,
    pub behavioral_signature: Option<String>,
    pub report_count: i64,
    pub block_count: i64,
    pub transaction_pattern_tags: Vec<String>,
}

impl UserSignals {
    /// Merge into cached node metadata. Counts only move forward, signal
    /// sets only grow — a degraded provider can never erase evidence.
    pub fn apply_to(&self, meta: &mut NodeMetadata) {
        meta.account_age_days = self.account_age_days;
        meta.device_fingerprints
            .extend(self.device_fingerprints.iter().cloned());
        meta.ip_addresses.extend(self.ip_addresses.iter().cloned());
        if self.behavioral_signature.is_some() {
            meta.behavioral_signature = self.behavioral_signature.clone();
        }
        meta.report_count = meta.report_count.max(self.report_count);
        meta.block_count = meta.block_count.max(self.block_count);
    }
}

/// Read-only trust score collaborator. Unavailability must degrade the
/// local scorer (neutral default + degraded flag), never fail it.
pub trait TrustScoreProvider {
    fn trust_score(&self, user_id: &str) -> GraphResult<TrustScore>;
}

/// Read-only fraud signal collaborator.
pub trait FraudSignalProvider {
    fn user_signals(&self, user_id: &str) -> GraphResult<UserSignals>;
    /// Reverse lookup: all user ids sharing a device fingerprint.
    fn users_sharing_device(&self, fingerprint: &str) -> GraphResult<Vec<UserId>>;
}

/// Outbound "sanction these accounts" signal, consumed by the external
/// account-lifecycle subsystem. This engine never applies sanctions itself.
pub trait SanctionSink {
    fn sanction_accounts(
        &self,
        cluster_id: &str,
        members: &[UserId],
        reason: &str,
    ) -> GraphResult<()>;
}

// ── In-memory fixtures ───────────────────────────────────────────────

/// Trust provider backed by a shared map. Flip `set_available(false)` to
/// exercise the degraded path.
#[derive(Clone, Default)]
pub struct StaticTrustProvider {
    scores: Arc<Mutex<HashMap<UserId, i64>>>,
    unavailable: Arc<AtomicBool>,
}

impl StaticTrustProvider {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_score(&self, user_id: &str, score: i64) {
        self.scores
            .lock()
            .expect("trust provider lock")
            .insert(user_id.to_string(), score);
    }

    pub fn set_available(&self, available: bool) {
        self.unavailable.store(!available, Ordering::SeqCst);
    }
}

impl TrustScoreProvider for StaticTrustProvider {
    fn trust_score(&self, user_id: &str) -> GraphResult<TrustScore> {
        if self.unavailable.load(Ordering::SeqCst) {
            return Err(GraphError::DependencyDegraded {
                name: "trust_score_provider",
                detail: "provider offline".into(),
            });
        }
        let scores = self.scores.lock().expect("trust provider lock");
        let score = match scores.get(user_id) {
            Some(s) => *s,
            None => {
                return Err(GraphError::NotFound {
                    kind: "trust_score",
                    id: user_id.to_string(),
                })
            }
        };
        let tier = match score {
            800.. => "established",
            400..=799 => "standard",
            _ => "new",
        };
        Ok(TrustScore {
            score,
            tier: tier.to_string(),
        })
    }
}

/// Fraud signal provider backed by a shared map.
#[derive(Clone, Default)]
pub struct StaticSignalProvider {
    signals: Arc<Mutex<HashMap<UserId, UserSignals>>>,
    unavailable: Arc<AtomicBool>,
}

impl StaticSignalProvider {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_signals(&self, user_id: &str, signals: UserSignals) {
        self.signals
            .lock()
            .expect("signal provider lock")
            .insert(user_id.to_string(), signals);
    }

    pub fn set_available(&self, available: bool) {
        self.unavailable.store(!available, Ordering::SeqCst);
    }
}

impl FraudSignalProvider for StaticSignalProvider {
    fn user_signals(&self, user_id: &str) -> GraphResult<UserSignals> {
        if self.unavailable.load(Ordering::SeqCst) {
            return Err(GraphError::DependencyDegraded {
                name: "fraud_signal_provider",
                detail: "provider offline".into(),
            });
        }
        let signals = self.signals.lock().expect("signal provider lock");
        Ok(signals.get(user_id).cloned().unwrap_or_default())
    }

    fn users_sharing_device(&self, fingerprint: &str) -> GraphResult<Vec<UserId>> {
        if self.unavailable.load(Ordering::SeqCst) {
            return Err(GraphError::DependencyDegraded {
                name: "fraud_signal_provider",
                detail: "provider offline".into(),
            });
        }
        let signals = self.signals.lock().expect("signal provider lock");
        let mut users: Vec<UserId> = signals
            .iter()
            .filter(|(_, s)| s.device_fingerprints.contains(fingerprint))
            .map(|(id, _)| id.clone())
            .collect();
        users.sort();
        Ok(users)
    }
}

/// Sanction sink that records every emission. Tests assert against it;
/// graph-runner prints it in the run summary.
#[derive(Clone, Default)]
pub struct RecordingSanctionSink {
    emitted: Arc<Mutex<Vec<(String, Vec<UserId>, String)>>>,
}

impl RecordingSanctionSink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn emissions(&self) -> Vec<(String, Vec<UserId>, String)> {
        self.emitted.lock().expect("sanction sink lock").clone()
    }
}

impl SanctionSink for RecordingSanctionSink {
    fn sanction_accounts(
        &self,
        cluster_id: &str,
        members: &[UserId],
        reason: &str,
    ) -> GraphResult<()> {
        log::info!(
            "sanction signal: cluster={cluster_id} members={} reason={reason}",
            members.len()
        );
        self.emitted.lock().expect("sanction sink lock").push((
            cluster_id.to_string(),
            members.to_vec(),
            reason.to_string(),
        ));
        Ok(())
    }
}
