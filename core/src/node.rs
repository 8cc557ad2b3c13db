//! Per-user graph-neighborhood state.

use crate::{
    connection::Connection,
    types::{ClusterId, UserId},
};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};

/// Node flag set when a single device fingerprint links 3+ accounts.
pub const FLAG_SHARED_DEVICE_3PLUS: &str = "shared_device_3plus";
/// Node flag set when a single IP address links 3+ accounts.
pub const FLAG_SHARED_IP_3PLUS: &str = "shared_ip_3plus";

/// Derived risk band. A pure function of the risk score — the boundary
/// table below is the only place scores map to levels.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, PartialOrd, Ord)]
#[serde(rename_all = "snake_case")]
pub enum RiskLevel {
    Safe,
    Low,
    Medium,
    High,
    Critical,
}

impl RiskLevel {
    /// Fixed boundaries: 0-19 / 20-39 / 40-59 / 60-79 / 80-100.
    pub fn from_score(score: i64) -> Self {
        match score {
            i64::MIN..=19 => Self::Safe,
            20..=39 => Self::Low,
            40..=59 => Self::Medium,
            60..=79 => Self::High,
            _ => Self::Critical,
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            Self::Safe => "safe",
            Self::Low => "low",
            Self::Medium => "medium",
            Self::High => "high",
            Self::Critical => "critical",
        }
    }

    /// Inverse of name(), for rows read back from the store.
    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "safe" => Some(Self::Safe),
            "low" => Some(Self::Low),
            "medium" => Some(Self::Medium),
            "high" => Some(Self::High),
            "critical" => Some(Self::Critical),
            _ => None,
        }
    }
}

/// Aggregated per-user signal metadata, cached from the fraud signal
/// provider. Sets are BTree-backed so the JSON column is deterministic.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct NodeMetadata {
    pub account_age_days: i64,
    pub device_fingerprints: BTreeSet<String>,
    pub ip_addresses: BTreeSet<String>,
    pub behavioral_signature: Option<String>,
    pub report_count: i64,
    pub block_count: i64,
}

/// One record per user with at least one recorded connection.
/// Created lazily on the first observation, never deleted.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct RiskNode {
    pub user_id: UserId,
    /// Last-known trust score from the external provider (0-1000, may be stale).
    pub trust_score: i64,
    /// Always in [0, 100]; recomputed from connections + metadata, never hand-edited.
    pub risk_score: i64,
    pub risk_level: RiskLevel,
    /// Neighbor user id -> connection. Keys unique, order irrelevant
    /// (BTreeMap keeps serialization stable).
    pub connections: BTreeMap<UserId, Connection>,
    pub metadata: NodeMetadata,
    /// Accumulated flags. Cleared only by a recompute that finds the
    /// condition no longer holds.
    pub flags: BTreeSet<String>,
    /// At most one active cluster membership.
    pub cluster_id: Option<ClusterId>,
    /// Needs re-scoring after an incremental connection write.
    pub dirty: bool,
    /// Optimistic-concurrency counter, bumped on every committed update.
    pub version: i64,
}

impl RiskNode {
    pub fn new(user_id: UserId, neutral_trust: i64) -> Self {
        Self {
            user_id,
            trust_score: neutral_trust,
            risk_score: 0,
            risk_level: RiskLevel::Safe,
            connections: BTreeMap::new(),
            metadata: NodeMetadata::default(),
            flags: BTreeSet::new(),
            cluster_id: None,
            dirty: false,
            version: 0,
        }
    }

    /// Number of distinct neighbors reached through connections of `kind`.
    pub fn neighbor_count_of_kind(&self, kind: crate::connection::ConnectionType) -> usize {
        self.connections.values().filter(|c| c.kind == kind).count()
    }
}
