//! Local Risk Scorer — real-time 1-hop analysis of a single node.
//!
//! The score is assembled from named, individually capped components and
//! clamped to [0, 100]. Propagation looks exactly one hop out (never the
//! transitive closure) so a single call stays cheap regardless of graph
//! size.

use crate::{
    config::EngineConfig,
    connection::ConnectionType,
    error::{GraphError, GraphResult},
    event::GraphEvent,
    node::{RiskLevel, RiskNode, FLAG_SHARED_DEVICE_3PLUS, FLAG_SHARED_IP_3PLUS},
    signal::{FraudSignalProvider, TrustScoreProvider},
    store::GraphStore,
    types::UserId,
    weigher::SHARED_SIGNAL_FLAG_THRESHOLD,
};

// ── Score components ─────────────────────────────────────────────────

const NEW_ACCOUNT_PENALTY: f64 = 15.0;
const REPORT_PENALTY_EACH: f64 = 3.0;
const REPORT_PENALTY_CAP: f64 = 15.0;
const BLOCK_PENALTY_EACH: f64 = 4.0;
const BLOCK_PENALTY_CAP: f64 = 12.0;
const CONNECTION_STRENGTH_SCALE: f64 = 12.0;
const CONNECTION_COMPONENT_CAP: f64 = 40.0;
const PROPAGATION_SCALE: f64 = 20.0;
const PROPAGATION_CAP: f64 = 25.0;
/// Maximum points the trust adjustment can move the score either way.
const TRUST_ADJUSTMENT_RANGE: f64 = 15.0;

/// One connection the scorer considers worth a reviewer's attention.
#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
pub struct SuspiciousConnection {
    pub neighbor_id: UserId,
    pub kind: ConnectionType,
    pub weight: f64,
    pub strength: f64,
    pub interaction_count: u64,
    pub reason: String,
}

/// Result of a 1-hop analysis, consumed by the moderation portal and the
/// external content-scoring subsystem.
#[derive(Debug, Clone)]
pub struct GraphAnalysisResult {
    pub node: RiskNode,
    pub suspicious_connections: Vec<SuspiciousConnection>,
    pub recommendations: Vec<String>,
    pub requires_review: bool,
    /// True when the trust provider was unavailable and the neutral
    /// default stood in. Degraded analyses are surfaced, never dropped.
    pub degraded: bool,
}

pub struct LocalRiskScorer<'a> {
    store: &'a GraphStore,
    config: &'a EngineConfig,
    trust: &'a dyn TrustScoreProvider,
    signals: &'a dyn FraudSignalProvider,
}

impl<'a> LocalRiskScorer<'a> {
    pub fn new(
        store: &'a GraphStore,
        config: &'a EngineConfig,
        trust: &'a dyn TrustScoreProvider,
        signals: &'a dyn FraudSignalProvider,
    ) -> Self {
        Self {
            store,
            config,
            trust,
            signals,
        }
    }

    /// Recompute a node's risk score and level from its own connections,
    /// metadata, and cached trust. Persists the recomputed node.
    pub fn score_node(&self, user_id: &str) -> GraphResult<GraphAnalysisResult> {
        // Trust unavailability degrades, never fails the call.
        let (trust_score, degraded) = match self.trust.trust_score(user_id) {
            Ok(t) => (t.score.clamp(0, 1000), false),
            Err(e) => {
                log::warn!("trust score unavailable for '{user_id}': {e}");
                (self.config.neutral_trust, true)
            }
        };

        let mut attempts = 0u32;
        let result = loop {
            let mut node = self.store.require_node(user_id)?;
            let expected_version = node.version;

            match self.signals.user_signals(user_id) {
                Ok(signals) => signals.apply_to(&mut node.metadata),
                Err(e) => log::debug!("metadata refresh skipped for '{user_id}': {e}"),
            }
            node.trust_score = trust_score;

            let score = self.compute_score(&node)?;
            node.risk_score = score;
            node.risk_level = RiskLevel::from_score(score);
            self.recompute_flags(&mut node);
            node.dirty = false;

            if self.store.update_node_versioned(&node, expected_version)? {
                break self.build_result(node, degraded);
            }
            attempts += 1;
            if attempts > self.config.max_write_retries {
                return Err(GraphError::WriteConflict {
                    user_id: user_id.to_string(),
                    attempts,
                });
            }
        };

        self.store.append_event(&GraphEvent::NodeScored {
            user_id: user_id.to_string(),
            risk_score: result.node.risk_score,
            risk_level: result.node.risk_level.name().to_string(),
            requires_review: result.requires_review,
            degraded,
        })?;
        Ok(result)
    }

    fn compute_score(&self, node: &RiskNode) -> GraphResult<i64> {
        // Metadata component.
        let mut score = 0.0;
        if node.metadata.account_age_days < self.config.new_account_age_days {
            score += NEW_ACCOUNT_PENALTY;
        }
        score += (node.metadata.report_count as f64 * REPORT_PENALTY_EACH).min(REPORT_PENALTY_CAP);
        score += (node.metadata.block_count as f64 * BLOCK_PENALTY_EACH).min(BLOCK_PENALTY_CAP);

        // Connection component: capped sum of edge strengths.
        let connection_component: f64 = node
            .connections
            .values()
            .map(|c| c.strength * CONNECTION_STRENGTH_SCALE)
            .sum();
        score += connection_component.min(CONNECTION_COMPONENT_CAP);

        // Propagation component: one hop only. Neighbors below the weight
        // threshold or below HIGH contribute nothing.
        let mut propagation = 0.0;
        for (neighbor_id, conn) in &node.connections {
            if conn.weight < self.config.propagation_threshold {
                continue;
            }
            let Some(neighbor) = self.store.get_node(neighbor_id)? else {
                log::error!(
                    "dangling connection '{}' -> '{neighbor_id}' ignored in scoring",
                    node.user_id
                );
                continue;
            };
            if neighbor.risk_level >= RiskLevel::High {
                propagation += conn.weight * (neighbor.risk_score as f64 / 100.0)
                    * PROPAGATION_SCALE;
            }
        }
        score += propagation.min(PROPAGATION_CAP);

        // Trust adjustment: inverse, bounded, centered on the midpoint.
        // 0 trust adds the full range; 1000 trust subtracts it.
        let midpoint = self.config.neutral_trust as f64;
        score += ((midpoint - node.trust_score as f64) / midpoint) * TRUST_ADJUSTMENT_RANGE;

        Ok(score.round().clamp(0.0, 100.0) as i64)
    }

    /// Flags accumulate on write; only this recompute may clear one, and
    /// only when the triggering condition no longer holds. The device
    /// condition has two sources — local DeviceMatch neighbors and the
    /// provider's reverse lookup — so clearing checks both.
    fn recompute_flags(&self, node: &mut RiskNode) {
        let device_holds = node.neighbor_count_of_kind(ConnectionType::DeviceMatch)
            >= SHARED_SIGNAL_FLAG_THRESHOLD
            || self.device_sharing_holds(node);
        if device_holds {
            node.flags.insert(FLAG_SHARED_DEVICE_3PLUS.to_string());
        } else {
            node.flags.remove(FLAG_SHARED_DEVICE_3PLUS);
        }
        // The provider indexes devices only, no IP reverse lookup exists;
        // the IP flag tracks local neighbors alone.
        if node.neighbor_count_of_kind(ConnectionType::IpMatch) >= SHARED_SIGNAL_FLAG_THRESHOLD {
            node.flags.insert(FLAG_SHARED_IP_3PLUS.to_string());
        } else {
            node.flags.remove(FLAG_SHARED_IP_3PLUS);
        }
    }

    /// Whether any cached fingerprint still links 3+ other accounts per
    /// the provider. A degraded provider cannot confirm the condition
    /// lapsed, so an already-set flag stays.
    fn device_sharing_holds(&self, node: &RiskNode) -> bool {
        let flag_set = node.flags.contains(FLAG_SHARED_DEVICE_3PLUS);
        for fingerprint in &node.metadata.device_fingerprints {
            match self.signals.users_sharing_device(fingerprint) {
                Ok(users) => {
                    let others = users
                        .iter()
                        .filter(|u| u.as_str() != node.user_id)
                        .count();
                    if others >= SHARED_SIGNAL_FLAG_THRESHOLD {
                        return true;
                    }
                }
                Err(e) => {
                    if flag_set {
                        log::warn!(
                            "device lookup unavailable for '{fingerprint}': {e}; keeping flag"
                        );
                        return true;
                    }
                }
            }
        }
        false
    }

    fn build_result(&self, node: RiskNode, degraded: bool) -> GraphAnalysisResult {
        let mut suspicious = Vec::new();
        for (neighbor_id, conn) in &node.connections {
            if conn.weight < self.config.propagation_threshold {
                continue;
            }
            suspicious.push(SuspiciousConnection {
                neighbor_id: neighbor_id.clone(),
                kind: conn.kind,
                weight: conn.weight,
                strength: conn.strength,
                interaction_count: conn.interaction_count,
                reason: format!(
                    "{} link observed {} time(s)",
                    conn.kind.name(),
                    conn.interaction_count
                ),
            });
        }

        let shared_signal_flag = node.flags.contains(FLAG_SHARED_DEVICE_3PLUS)
            || node.flags.contains(FLAG_SHARED_IP_3PLUS);
        let requires_review = node.risk_level >= RiskLevel::High || shared_signal_flag;

        let mut recommendations = Vec::new();
        if node.flags.contains(FLAG_SHARED_DEVICE_3PLUS) {
            recommendations
                .push("device fingerprint shared with 3+ accounts: review for multi-accounting".into());
        }
        if node.flags.contains(FLAG_SHARED_IP_3PLUS) {
            recommendations.push("IP address shared with 3+ accounts: review for ring activity".into());
        }
        if node.risk_level >= RiskLevel::High {
            recommendations.push("aggregate risk high: escalate to manual review".into());
        }
        if node.cluster_id.is_some() {
            recommendations.push("member of a detected cluster: review cluster evidence".into());
        }
        if degraded {
            recommendations.push("trust score unavailable: treat this analysis as provisional".into());
        }

        GraphAnalysisResult {
            node,
            suspicious_connections: suspicious,
            recommendations,
            requires_review,
            degraded,
        }
    }
}
