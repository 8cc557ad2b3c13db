//! Typed, weighted edges between users.
//!
//! RULE: The connection type set is closed. A new kind of shared signal
//! requires a new enum variant and a weight table entry — never ad-hoc
//! dispatch on strings at runtime.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;

/// One kind of shared signal between two users.
/// Variants are appended, never removed or reordered.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum ConnectionType {
    DeviceMatch,
    IpMatch,
    BehaviorMatch,
    Report,
    Transaction,
    Referral,
    Block,
    Chat,
}

impl ConnectionType {
    pub const ALL: [ConnectionType; 8] = [
        Self::DeviceMatch,
        Self::IpMatch,
        Self::BehaviorMatch,
        Self::Report,
        Self::Transaction,
        Self::Referral,
        Self::Block,
        Self::Chat,
    ];

    /// Fixed evidential weight per type. Always looked up, never derived.
    pub fn weight(&self) -> f64 {
        match self {
            Self::DeviceMatch => 0.9,
            Self::IpMatch => 0.8,
            Self::BehaviorMatch => 0.7,
            Self::Report => 0.6,
            Self::Transaction => 0.5,
            Self::Referral => 0.4,
            Self::Block => 0.4,
            Self::Chat => 0.3,
        }
    }

    /// Hard-evidence types eligible for structural clustering.
    pub fn is_structural(&self) -> bool {
        matches!(self, Self::DeviceMatch | Self::IpMatch)
    }

    pub fn name(&self) -> &'static str {
        match self {
            Self::DeviceMatch => "device_match",
            Self::IpMatch => "ip_match",
            Self::BehaviorMatch => "behavior_match",
            Self::Report => "report",
            Self::Transaction => "transaction",
            Self::Referral => "referral",
            Self::Block => "block",
            Self::Chat => "chat",
        }
    }
}

/// A directed observation of a shared signal, interpreted symmetrically
/// by the cluster detector. Stored inside the owning node's connection map.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Connection {
    pub kind: ConnectionType,
    pub weight: f64,
    /// Weight scaled by normalized interaction count. Monotone in the
    /// count, asymptotic to `weight` — never exceeds it.
    pub strength: f64,
    /// Monotonically non-decreasing observation counter.
    pub interaction_count: u64,
    /// Local risk contribution of this edge, 0..=100.
    pub risk_score: i64,
    pub flags: BTreeSet<String>,
    pub first_seen: DateTime<Utc>,
    pub last_seen: DateTime<Utc>,
}

impl Connection {
    pub fn new(kind: ConnectionType, now: DateTime<Utc>) -> Self {
        let mut conn = Self {
            kind,
            weight: kind.weight(),
            strength: 0.0,
            interaction_count: 0,
            risk_score: 0,
            flags: BTreeSet::new(),
            first_seen: now,
            last_seen: now,
        };
        conn.record_interaction(now);
        conn
    }

    /// Count one more observation and recompute strength.
    pub fn record_interaction(&mut self, now: DateTime<Utc>) {
        self.interaction_count += 1;
        self.last_seen = now;
        self.strength = strength_for(self.weight, self.interaction_count);
        self.risk_score = (self.strength * 100.0).round() as i64;
    }
}

/// Diminishing-returns normalization: n/(n+2) rises from 1/3 at the first
/// observation toward 1.0, so strength caps at the type weight.
pub fn strength_for(weight: f64, interaction_count: u64) -> f64 {
    let n = interaction_count as f64;
    weight * (n / (n + 2.0))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn weight_table_is_exact() {
        let expected = [
            (ConnectionType::DeviceMatch, 0.9),
            (ConnectionType::IpMatch, 0.8),
            (ConnectionType::BehaviorMatch, 0.7),
            (ConnectionType::Report, 0.6),
            (ConnectionType::Transaction, 0.5),
            (ConnectionType::Referral, 0.4),
            (ConnectionType::Block, 0.4),
            (ConnectionType::Chat, 0.3),
        ];
        assert_eq!(expected.len(), ConnectionType::ALL.len());
        for (kind, weight) in expected {
            assert_eq!(kind.weight(), weight, "weight mismatch for {kind:?}");
        }
    }

    #[test]
    fn strength_monotone_and_capped() {
        for kind in ConnectionType::ALL {
            let mut prev = 0.0;
            for n in 1..200u64 {
                let s = strength_for(kind.weight(), n);
                assert!(s > prev, "strength must be strictly monotone");
                assert!(s < kind.weight(), "strength must stay below the weight");
                prev = s;
            }
        }
    }

    #[test]
    fn interaction_count_never_decreases() {
        let now = Utc::now();
        let mut conn = Connection::new(ConnectionType::Chat, now);
        let mut prev = conn.interaction_count;
        for _ in 0..10 {
            conn.record_interaction(now);
            assert!(conn.interaction_count > prev);
            prev = conn.interaction_count;
        }
    }
}
