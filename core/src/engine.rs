//! The engine facade: owns the store, config, and external collaborators,
//! and exposes the operations callers actually use. Components (weigher,
//! scorer, detector, gateway) are constructed per call — they borrow,
//! they do not own.

use crate::{
    cluster::{ClusterAction, RiskCluster},
    config::EngineConfig,
    detector::{CancelToken, ClusterDetector},
    error::GraphResult,
    gateway::AdminGateway,
    node::RiskNode,
    scorer::{GraphAnalysisResult, LocalRiskScorer},
    signal::{
        FraudSignalProvider, RecordingSanctionSink, SanctionSink, StaticSignalProvider,
        StaticTrustProvider, TrustScoreProvider,
    },
    store::GraphStore,
    weigher::{ConnectionWeigher, RawObservation},
};

pub struct RiskGraphEngine {
    store: GraphStore,
    config: EngineConfig,
    trust: Box<dyn TrustScoreProvider>,
    signals: Box<dyn FraudSignalProvider>,
    sanctions: Box<dyn SanctionSink>,
}

/// Shared handles to the in-memory fixtures behind a test engine, so a
/// test can adjust provider state after construction.
pub struct TestFixtures {
    pub trust: StaticTrustProvider,
    pub signals: StaticSignalProvider,
    pub sanctions: RecordingSanctionSink,
}

impl RiskGraphEngine {
    pub fn new(
        store: GraphStore,
        config: EngineConfig,
        trust: Box<dyn TrustScoreProvider>,
        signals: Box<dyn FraudSignalProvider>,
        sanctions: Box<dyn SanctionSink>,
    ) -> GraphResult<Self> {
        store.migrate()?;
        Ok(Self {
            store,
            config,
            trust,
            signals,
            sanctions,
        })
    }

    /// In-memory engine wired to the static fixtures. The returned
    /// handles share state with the engine's own provider copies.
    pub fn build_test() -> GraphResult<(Self, TestFixtures)> {
        let fixtures = TestFixtures {
            trust: StaticTrustProvider::new(),
            signals: StaticSignalProvider::new(),
            sanctions: RecordingSanctionSink::new(),
        };
        let engine = Self::new(
            GraphStore::in_memory()?,
            EngineConfig::default_test(),
            Box::new(fixtures.trust.clone()),
            Box::new(fixtures.signals.clone()),
            Box::new(fixtures.sanctions.clone()),
        )?;
        Ok((engine, fixtures))
    }

    pub fn store(&self) -> &GraphStore {
        &self.store
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    // ── Incremental path ─────────────────────────────────────────────

    /// Record one observed relationship on both endpoints' nodes.
    pub fn record_observation(&self, obs: &RawObservation) -> GraphResult<()> {
        ConnectionWeigher::new(&self.store, &self.config, self.signals.as_ref())
            .record_observation(obs)
    }

    /// Recompute and persist one node's risk score; returns the full
    /// 1-hop analysis.
    pub fn analyze_user(&self, user_id: &str) -> GraphResult<GraphAnalysisResult> {
        LocalRiskScorer::new(
            &self.store,
            &self.config,
            self.trust.as_ref(),
            self.signals.as_ref(),
        )
        .score_node(user_id)
    }

    // ── Batch path ───────────────────────────────────────────────────

    /// Run one full cluster-detection pass under the exclusive lease.
    pub fn detect_clusters(&self, cancel: &CancelToken) -> GraphResult<Vec<RiskCluster>> {
        ClusterDetector::new(&self.store, &self.config, self.signals.as_ref())
            .detect_clusters(cancel)
    }

    /// Purge resolved clusters past the configured retention window.
    /// A no-op (returning 0) when no retention is configured.
    pub fn purge_resolved_clusters(&self) -> GraphResult<usize> {
        match self.config.resolved_retention_days {
            Some(days) => {
                let purged = self.store.purge_resolved_before(days)?;
                if purged > 0 {
                    log::info!("purged {purged} resolved cluster(s) older than {days} day(s)");
                }
                Ok(purged)
            }
            None => Ok(0),
        }
    }

    // ── Admin path ───────────────────────────────────────────────────

    pub fn cluster_members(&self, cluster_id: &str) -> GraphResult<(RiskCluster, Vec<RiskNode>)> {
        self.gateway().cluster_members(cluster_id)
    }

    pub fn block_cluster(
        &self,
        cluster_id: &str,
        admin_id: &str,
        reason: &str,
    ) -> GraphResult<ClusterAction> {
        self.gateway().block_cluster(cluster_id, admin_id, reason)
    }

    pub fn confirm_cluster(
        &self,
        cluster_id: &str,
        admin_id: &str,
        reason: &str,
    ) -> GraphResult<ClusterAction> {
        self.gateway().confirm_cluster(cluster_id, admin_id, reason)
    }

    pub fn dismiss_cluster(
        &self,
        cluster_id: &str,
        admin_id: &str,
        reason: &str,
    ) -> GraphResult<ClusterAction> {
        self.gateway().dismiss_cluster(cluster_id, admin_id, reason)
    }

    pub fn audit_trail(&self, cluster_id: &str) -> GraphResult<Vec<ClusterAction>> {
        self.gateway().audit_trail(cluster_id)
    }

    fn gateway(&self) -> AdminGateway<'_> {
        AdminGateway::new(&self.store, self.sanctions.as_ref())
    }
}
