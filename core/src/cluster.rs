//! Detected fraud clusters and their admin lifecycle.

use crate::types::{AdminId, ClusterId, UserId};
use crate::node::RiskLevel;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Recognized coordinated-abuse shapes. Classification is a deterministic
/// decision table in detector.rs, in strict priority order — not ML.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum FraudPattern {
    MultiAccount,
    BotNetwork,
    ScamRing,
    FakeReviews,
    PaymentFraud,
    IdentityTheft,
    CoordinatedSpam,
    WashTrading,
}

impl FraudPattern {
    pub fn name(&self) -> &'static str {
        match self {
            Self::MultiAccount => "multi_account",
            Self::BotNetwork => "bot_network",
            Self::ScamRing => "scam_ring",
            Self::FakeReviews => "fake_reviews",
            Self::PaymentFraud => "payment_fraud",
            Self::IdentityTheft => "identity_theft",
            Self::CoordinatedSpam => "coordinated_spam",
            Self::WashTrading => "wash_trading",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "multi_account" => Some(Self::MultiAccount),
            "bot_network" => Some(Self::BotNetwork),
            "scam_ring" => Some(Self::ScamRing),
            "fake_reviews" => Some(Self::FakeReviews),
            "payment_fraud" => Some(Self::PaymentFraud),
            "identity_theft" => Some(Self::IdentityTheft),
            "coordinated_spam" => Some(Self::CoordinatedSpam),
            "wash_trading" => Some(Self::WashTrading),
            _ => None,
        }
    }
}

/// Lifecycle state. Advanced by the detector (Active -> Investigating on
/// confidence crossing the configured threshold) or by explicit admin
/// action. Resolved is terminal.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum ClusterStatus {
    Active,
    Investigating,
    Confirmed,
    Resolved,
}

impl ClusterStatus {
    pub fn name(&self) -> &'static str {
        match self {
            Self::Active => "active",
            Self::Investigating => "investigating",
            Self::Confirmed => "confirmed",
            Self::Resolved => "resolved",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "active" => Some(Self::Active),
            "investigating" => Some(Self::Investigating),
            "confirmed" => Some(Self::Confirmed),
            "resolved" => Some(Self::Resolved),
            _ => None,
        }
    }

    /// The state machine: ACTIVE -> INVESTIGATING -> CONFIRMED -> RESOLVED,
    /// with ACTIVE -> RESOLVED allowed for false-positive dismissal.
    /// No transition out of RESOLVED.
    pub fn can_transition_to(&self, next: ClusterStatus) -> bool {
        use ClusterStatus::*;
        matches!(
            (self, next),
            (Active, Investigating)
                | (Active, Resolved)
                | (Investigating, Confirmed)
                | (Investigating, Resolved)
                | (Confirmed, Resolved)
        )
    }
}

/// Per-cluster evidence aggregated across members.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct ClusterEvidence {
    /// Distinct device fingerprints present on 2+ members.
    pub shared_device_count: i64,
    /// Distinct IP addresses present on 2+ members.
    pub shared_ip_count: i64,
    /// Mean pairwise behavioral similarity, [0, 1].
    pub behavioral_similarity: f64,
    /// How tightly member account creations cluster in time, [0, 1].
    pub temporal_correlation: f64,
    /// Recognized tags from the external transaction signal provider.
    pub transaction_pattern_tags: Vec<String>,
}

/// One admin decision, append-only.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ClusterAction {
    pub action_id: String,
    pub cluster_id: ClusterId,
    pub admin_id: AdminId,
    pub action: String,
    pub reason: String,
    pub taken_at: DateTime<Utc>,
}

/// The unit of coordinated-fraud evidence: a connected component of
/// high-confidence edges with 3 or more members.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct RiskCluster {
    pub cluster_id: ClusterId,
    pub pattern: FraudPattern,
    pub risk_level: RiskLevel,
    /// Sorted member ids. Invariant: len >= 3.
    pub members: Vec<UserId>,
    /// Member with the highest individual risk score (lowest id on ties).
    pub centroid: UserId,
    /// Weighted evidence sum, guaranteed in [0, 1]. Never hand-set.
    pub confidence: f64,
    pub evidence: ClusterEvidence,
    pub status: ClusterStatus,
    pub detected_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn resolved_is_terminal() {
        use ClusterStatus::*;
        for next in [Active, Investigating, Confirmed, Resolved] {
            assert!(!Resolved.can_transition_to(next));
        }
    }

    #[test]
    fn false_positive_dismissal_allowed() {
        assert!(ClusterStatus::Active.can_transition_to(ClusterStatus::Resolved));
    }

    #[test]
    fn no_backwards_transitions() {
        use ClusterStatus::*;
        assert!(!Investigating.can_transition_to(Active));
        assert!(!Confirmed.can_transition_to(Investigating));
        assert!(!Confirmed.can_transition_to(Active));
    }
}
