//! Engine configuration.
//!
//! The connection weight table is NOT here — it is a fixed constant
//! lookup in connection.rs. Config covers the tunables: thresholds,
//! confidence weights, retry bounds, and retention.

use serde::{Deserialize, Serialize};

/// Weights of the normalized evidence components summed into cluster
/// confidence. Each component is clamped to [0, 1] before weighting and
/// the weights sum to 1.0, so confidence is guaranteed in [0, 1].
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConfidenceWeights {
    pub device: f64,
    pub ip: f64,
    pub behavioral: f64,
    pub temporal: f64,
    pub transaction: f64,
}

impl ConfidenceWeights {
    pub fn sum(&self) -> f64 {
        self.device + self.ip + self.behavioral + self.temporal + self.transaction
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EngineConfig {
    /// Minimum connection weight for an edge to enter structural
    /// clustering (applies on top of the DeviceMatch/IpMatch type filter).
    pub clustering_weight_threshold: f64,
    /// Minimum connection weight for neighbor risk to propagate in the
    /// 1-hop local scorer.
    pub propagation_threshold: f64,
    /// Components smaller than this never become clusters.
    pub min_cluster_size: usize,
    /// Confidence above which ACTIVE clusters auto-advance to INVESTIGATING.
    pub investigating_confidence: f64,
    pub confidence_weights: ConfidenceWeights,
    /// Accounts younger than this (days) take the new-account penalty.
    pub new_account_age_days: i64,
    /// Trust midpoint used when the trust provider is unavailable.
    pub neutral_trust: i64,
    /// Bounded optimistic-concurrency retries on risk_node writes.
    pub max_write_retries: u32,
    /// A batch lease older than this is considered abandoned and broken.
    pub lease_timeout_secs: i64,
    /// Retention window for RESOLVED clusters. None retains forever.
    /// Explicit config point — the engine never infers a TTL.
    pub resolved_retention_days: Option<i64>,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            clustering_weight_threshold: 0.7,
            propagation_threshold: 0.6,
            min_cluster_size: 3,
            investigating_confidence: 0.8,
            confidence_weights: ConfidenceWeights {
                device: 0.35,
                ip: 0.25,
                behavioral: 0.15,
                temporal: 0.15,
                transaction: 0.10,
            },
            new_account_age_days: 7,
            neutral_trust: 500,
            max_write_retries: 3,
            lease_timeout_secs: 3600,
            resolved_retention_days: None,
        }
    }
}

impl EngineConfig {
    /// Load from a JSON file. In tests, use EngineConfig::default_test().
    pub fn load(path: &str) -> anyhow::Result<Self> {
        let content = std::fs::read_to_string(path)
            .map_err(|e| anyhow::anyhow!("Cannot read {path}: {e}"))?;
        let config: EngineConfig = serde_json::from_str(&content)?;
        anyhow::ensure!(
            (config.confidence_weights.sum() - 1.0).abs() < 1e-9,
            "confidence weights must sum to 1.0, got {}",
            config.confidence_weights.sum()
        );
        Ok(config)
    }

    /// Config with defaults for use in unit tests.
    pub fn default_test() -> Self {
        Self::default()
    }
}
