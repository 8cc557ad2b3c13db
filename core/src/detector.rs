//! Cluster Detector — the batch job that extracts densely connected
//! suspicious components from the risk graph.
//!
//! The run is guarded by an exclusive lease (a second trigger is rejected,
//! not queued) and commits all cluster writes in a single transaction at
//! the end, so a cancelled or failed run leaves no partial state behind.
//!
//! Structural clustering only ever sees the filtered hard-evidence edge
//! set (DeviceMatch/IpMatch at or above the clustering threshold). Soft
//! signals (chat, referral, ...) contribute to evidence scoring, never to
//! edge selection.

use crate::{
    cluster::{ClusterEvidence, ClusterStatus, FraudPattern, RiskCluster},
    config::EngineConfig,
    error::{GraphError, GraphResult},
    event::GraphEvent,
    node::{RiskLevel, RiskNode},
    signal::FraudSignalProvider,
    store::GraphStore,
    types::{ClusterId, UserId},
};
use chrono::Utc;
use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::sync::{
    atomic::{AtomicBool, Ordering},
    Arc,
};

// ── Classification thresholds ────────────────────────────────────────

const BOT_NETWORK_MIN_MEMBERS: usize = 5;
const BOT_NETWORK_MAX_TRUST: f64 = 300.0;
const BOT_NETWORK_MIN_TEMPORAL: f64 = 0.7;
const BOT_NETWORK_MAX_SIGNATURES: usize = 2;
const IDENTITY_THEFT_TRUST_SPREAD: i64 = 600;
const SCAM_RING_MIN_REPORTS: f64 = 3.0;
const FAKE_REVIEWS_MIN_REPORTS: f64 = 1.0;
const FAKE_REVIEWS_MIN_TEMPORAL: f64 = 0.5;
/// Evidence counts at or above this saturate their confidence component.
const EVIDENCE_COUNT_SATURATION: f64 = 3.0;
/// Account-creation spread (days) at which temporal correlation reaches 0.
const TEMPORAL_SPREAD_DAYS: f64 = 30.0;

/// Cooperative cancellation for an in-flight batch run. Cancelling after
/// the commit point has no effect; before it, the run discards everything.
#[derive(Clone, Default)]
pub struct CancelToken(Arc<AtomicBool>);

impl CancelToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}

/// Union-find over user ids with path compression.
///
/// The representative of a set is always its lowest user id, which makes
/// union symmetric and idempotent: repeated runs over an unchanged edge
/// set produce identical partitions and identical representatives.
pub struct DisjointSet {
    parent: HashMap<UserId, UserId>,
}

impl DisjointSet {
    pub fn new() -> Self {
        Self {
            parent: HashMap::new(),
        }
    }

    pub fn insert(&mut self, id: &str) {
        self.parent
            .entry(id.to_string())
            .or_insert_with(|| id.to_string());
    }

    pub fn find(&mut self, id: &str) -> UserId {
        self.insert(id);
        // Walk to the root, then compress the path behind us.
        let mut root = id.to_string();
        while self.parent[&root] != root {
            root = self.parent[&root].clone();
        }
        let mut current = id.to_string();
        while self.parent[&current] != root {
            let next = self.parent[&current].clone();
            self.parent.insert(current, root.clone());
            current = next;
        }
        root
    }

    pub fn union(&mut self, a: &str, b: &str) {
        let root_a = self.find(a);
        let root_b = self.find(b);
        if root_a == root_b {
            return;
        }
        // Lowest id wins the root — the deterministic tie-break.
        if root_a < root_b {
            self.parent.insert(root_b, root_a);
        } else {
            self.parent.insert(root_a, root_b);
        }
    }

    /// Components keyed by representative, members sorted.
    pub fn components(&mut self) -> BTreeMap<UserId, Vec<UserId>> {
        let ids: Vec<UserId> = self.parent.keys().cloned().collect();
        let mut components: BTreeMap<UserId, Vec<UserId>> = BTreeMap::new();
        for id in ids {
            let root = self.find(&id);
            components.entry(root).or_default().push(id);
        }
        for members in components.values_mut() {
            members.sort();
        }
        components
    }
}

impl Default for DisjointSet {
    fn default() -> Self {
        Self::new()
    }
}

pub struct ClusterDetector<'a> {
    store: &'a GraphStore,
    config: &'a EngineConfig,
    signals: &'a dyn FraudSignalProvider,
}

impl<'a> ClusterDetector<'a> {
    pub fn new(
        store: &'a GraphStore,
        config: &'a EngineConfig,
        signals: &'a dyn FraudSignalProvider,
    ) -> Self {
        Self {
            store,
            config,
            signals,
        }
    }

    /// Run one full detection pass. Returns the clusters as committed.
    pub fn detect_clusters(&self, cancel: &CancelToken) -> GraphResult<Vec<RiskCluster>> {
        if let Err(e) = self
            .store
            .acquire_detector_lease("cluster_detector", self.config.lease_timeout_secs)
        {
            if let GraphError::ConcurrentBatchConflict { holder } = &e {
                log::warn!("cluster detection rejected: lease held by '{holder}'");
                self.store.append_event(&GraphEvent::BatchRunRejected {
                    holder: holder.clone(),
                })?;
            }
            return Err(e);
        }

        let result = self.run_locked(cancel);
        self.store.release_detector_lease()?;
        result
    }

    fn run_locked(&self, cancel: &CancelToken) -> GraphResult<Vec<RiskCluster>> {
        let started = std::time::Instant::now();
        let nodes = self.store.all_nodes()?;
        let node_map: BTreeMap<UserId, RiskNode> = nodes
            .into_iter()
            .map(|n| (n.user_id.clone(), n))
            .collect();

        let edges = self.build_filtered_edges(&node_map)?;
        self.store.append_event(&GraphEvent::BatchRunStarted {
            node_count: node_map.len(),
            edge_count: edges.len(),
        })?;
        log::info!(
            "cluster detection: {} nodes, {} high-confidence edges",
            node_map.len(),
            edges.len()
        );

        let mut dsu = DisjointSet::new();
        for (a, b) in &edges {
            dsu.union(a, b);
        }

        let mut clusters = Vec::new();
        for (representative, members) in dsu.components() {
            if members.len() < self.config.min_cluster_size {
                continue;
            }
            if cancel.is_cancelled() {
                return self.abort();
            }
            clusters.push(self.assemble_cluster(&representative, members, &node_map)?);
        }

        // Membership diff: every member of a surviving cluster points at
        // it; anyone holding a membership without union-find support this
        // run is cleared. A user never holds two clusters.
        let mut assignments: Vec<(UserId, ClusterId)> = Vec::new();
        let mut clustered_users: BTreeSet<UserId> = BTreeSet::new();
        for cluster in &clusters {
            for member in &cluster.members {
                clustered_users.insert(member.clone());
                let current = node_map.get(member).and_then(|n| n.cluster_id.clone());
                if current.as_deref() != Some(&cluster.cluster_id) {
                    assignments.push((member.clone(), cluster.cluster_id.clone()));
                }
            }
        }
        let cleared: Vec<UserId> = self
            .store
            .nodes_with_cluster()?
            .into_iter()
            .map(|(user_id, _)| user_id)
            .filter(|user_id| !clustered_users.contains(user_id))
            .collect();

        // The single commit point. Everything before this is discardable.
        if cancel.is_cancelled() {
            return self.abort();
        }
        self.store.commit_batch(&clusters, &assignments, &cleared)?;

        for cluster in &clusters {
            self.store.append_event(&GraphEvent::ClusterDetected {
                cluster_id: cluster.cluster_id.clone(),
                pattern: cluster.pattern.name().to_string(),
                member_count: cluster.members.len(),
                confidence: cluster.confidence,
            })?;
        }
        self.store.append_event(&GraphEvent::BatchRunCompleted {
            cluster_count: clusters.len(),
        })?;
        log::info!(
            "cluster detection committed {} cluster(s) in {:?}",
            clusters.len(),
            started.elapsed()
        );
        Ok(clusters)
    }

    fn abort(&self) -> GraphResult<Vec<RiskCluster>> {
        log::warn!("cluster detection aborted by operator; discarding partial results");
        self.store.append_event(&GraphEvent::BatchRunAborted)?;
        Err(GraphError::BatchAborted)
    }

    /// Step 1: hard-evidence edges only. Dangling references are logged
    /// and excluded; they never abort the batch.
    fn build_filtered_edges(
        &self,
        node_map: &BTreeMap<UserId, RiskNode>,
    ) -> GraphResult<BTreeSet<(UserId, UserId)>> {
        let mut edges = BTreeSet::new();
        for node in node_map.values() {
            for (neighbor_id, conn) in &node.connections {
                if !conn.kind.is_structural()
                    || conn.weight < self.config.clustering_weight_threshold
                {
                    continue;
                }
                if !node_map.contains_key(neighbor_id) {
                    log::error!(
                        "dangling edge '{}' -> '{neighbor_id}' excluded from clustering",
                        node.user_id
                    );
                    self.store.append_event(&GraphEvent::DanglingEdgeSkipped {
                        user_id: node.user_id.clone(),
                        neighbor_id: neighbor_id.clone(),
                    })?;
                    continue;
                }
                let edge = if node.user_id < *neighbor_id {
                    (node.user_id.clone(), neighbor_id.clone())
                } else {
                    (neighbor_id.clone(), node.user_id.clone())
                };
                edges.insert(edge);
            }
        }
        Ok(edges)
    }

    fn assemble_cluster(
        &self,
        representative: &str,
        members: Vec<UserId>,
        node_map: &BTreeMap<UserId, RiskNode>,
    ) -> GraphResult<RiskCluster> {
        let member_nodes: Vec<&RiskNode> =
            members.iter().filter_map(|m| node_map.get(m)).collect();

        // Device/IP edges inside the component, counted once per
        // endpoint. The component only exists because of these.
        let structural_links: usize = member_nodes
            .iter()
            .map(|n| {
                n.connections
                    .iter()
                    .filter(|(nbr, c)| c.kind.is_structural() && members.binary_search(nbr).is_ok())
                    .count()
            })
            .sum();

        let evidence = self.compute_evidence(&member_nodes);
        let confidence = self.compute_confidence(&evidence);
        let pattern = self.classify(&member_nodes, &evidence, structural_links);

        // Highest individual risk score; members are sorted, so the
        // lowest user id wins ties.
        let centroid = member_nodes
            .iter()
            .max_by(|a, b| {
                a.risk_score
                    .cmp(&b.risk_score)
                    .then(b.user_id.cmp(&a.user_id))
            })
            .map(|n| n.user_id.clone())
            .unwrap_or_else(|| representative.to_string());

        let cluster_id = format!("cluster-{representative}");
        let now = Utc::now();

        // Re-detection preserves first-seen time and any admin-advanced
        // status; only the confidence auto-advance moves ACTIVE forward.
        let existing = self.store.get_cluster(&cluster_id)?;
        let (detected_at, mut status) = match &existing {
            Some(c) => (c.detected_at, c.status),
            None => (now, ClusterStatus::Active),
        };
        if status == ClusterStatus::Active && confidence > self.config.investigating_confidence {
            status = ClusterStatus::Investigating;
            self.store.append_event(&GraphEvent::ClusterStatusChanged {
                cluster_id: cluster_id.clone(),
                from: ClusterStatus::Active.name().to_string(),
                to: ClusterStatus::Investigating.name().to_string(),
            })?;
        }

        Ok(RiskCluster {
            cluster_id,
            pattern,
            risk_level: RiskLevel::from_score((confidence * 100.0).round() as i64),
            members,
            centroid,
            confidence,
            evidence,
            status,
            detected_at,
            updated_at: now,
        })
    }

    /// Step 4: evidence aggregation across members. Soft signals enter
    /// here, and only here.
    fn compute_evidence(&self, members: &[&RiskNode]) -> ClusterEvidence {
        let mut device_owners: BTreeMap<&String, usize> = BTreeMap::new();
        let mut ip_owners: BTreeMap<&String, usize> = BTreeMap::new();
        for node in members {
            for fp in &node.metadata.device_fingerprints {
                *device_owners.entry(fp).or_default() += 1;
            }
            for ip in &node.metadata.ip_addresses {
                *ip_owners.entry(ip).or_default() += 1;
            }
        }
        let shared_device_count = device_owners.values().filter(|&&n| n >= 2).count() as i64;
        let shared_ip_count = ip_owners.values().filter(|&&n| n >= 2).count() as i64;

        // Mean pairwise signature similarity (1.0 when both present and equal).
        let mut pair_count = 0u64;
        let mut similarity_sum = 0.0;
        for (i, a) in members.iter().enumerate() {
            for b in members.iter().skip(i + 1) {
                pair_count += 1;
                if let (Some(sig_a), Some(sig_b)) = (
                    &a.metadata.behavioral_signature,
                    &b.metadata.behavioral_signature,
                ) {
                    if sig_a == sig_b {
                        similarity_sum += 1.0;
                    }
                }
            }
        }
        let behavioral_similarity = if pair_count > 0 {
            similarity_sum / pair_count as f64
        } else {
            0.0
        };

        // Accounts created within a tight window correlate strongly.
        let ages: Vec<i64> = members.iter().map(|n| n.metadata.account_age_days).collect();
        let spread = match (ages.iter().max(), ages.iter().min()) {
            (Some(max), Some(min)) => (max - min) as f64,
            _ => 0.0,
        };
        let temporal_correlation = (1.0 - spread / TEMPORAL_SPREAD_DAYS).clamp(0.0, 1.0);

        // Transaction tags come straight from the external provider; a
        // degraded provider contributes nothing.
        let mut tags: BTreeSet<String> = BTreeSet::new();
        for node in members {
            match self.signals.user_signals(&node.user_id) {
                Ok(signals) => tags.extend(signals.transaction_pattern_tags),
                Err(e) => log::warn!("transaction tags skipped for '{}': {e}", node.user_id),
            }
        }

        ClusterEvidence {
            shared_device_count,
            shared_ip_count,
            behavioral_similarity,
            temporal_correlation,
            transaction_pattern_tags: tags.into_iter().collect(),
        }
    }

    /// Step 5: weighted sum of clamped components. The weights sum to 1.0
    /// (checked at config load), so the result is always in [0, 1].
    fn compute_confidence(&self, evidence: &ClusterEvidence) -> f64 {
        let w = &self.config.confidence_weights;
        let device = (evidence.shared_device_count as f64 / EVIDENCE_COUNT_SATURATION).clamp(0.0, 1.0);
        let ip = (evidence.shared_ip_count as f64 / EVIDENCE_COUNT_SATURATION).clamp(0.0, 1.0);
        let behavioral = evidence.behavioral_similarity.clamp(0.0, 1.0);
        let temporal = evidence.temporal_correlation.clamp(0.0, 1.0);
        let transaction = if evidence.transaction_pattern_tags.is_empty() {
            0.0
        } else {
            1.0
        };
        (w.device * device
            + w.ip * ip
            + w.behavioral * behavioral
            + w.temporal * temporal
            + w.transaction * transaction)
            .clamp(0.0, 1.0)
    }

    /// Step 6: deterministic decision table, evaluated strictly in
    /// priority order. Not ML.
    fn classify(
        &self,
        members: &[&RiskNode],
        evidence: &ClusterEvidence,
        structural_links: usize,
    ) -> FraudPattern {
        // Shared fingerprint/IP values are hard evidence, and so are the
        // DeviceMatch/IpMatch edges themselves — a component can form
        // from observations whose signal value was never captured.
        let has_hard_evidence = evidence.shared_device_count >= 1
            || evidence.shared_ip_count >= 1
            || structural_links >= 1;
        let signatures: BTreeSet<&String> = members
            .iter()
            .filter_map(|n| n.metadata.behavioral_signature.as_ref())
            .collect();
        let avg_trust = members.iter().map(|n| n.trust_score as f64).sum::<f64>()
            / members.len().max(1) as f64;
        let trust_spread = members.iter().map(|n| n.trust_score).max().unwrap_or(0)
            - members.iter().map(|n| n.trust_score).min().unwrap_or(0);
        let avg_reports = members
            .iter()
            .map(|n| n.metadata.report_count as f64)
            .sum::<f64>()
            / members.len().max(1) as f64;
        let circular_flow = evidence
            .transaction_pattern_tags
            .iter()
            .any(|t| t == "circular_flow" || t == "wash_trading");

        if has_hard_evidence && signatures.len() <= 1 {
            FraudPattern::MultiAccount
        } else if members.len() >= BOT_NETWORK_MIN_MEMBERS
            && avg_trust < BOT_NETWORK_MAX_TRUST
            && evidence.temporal_correlation >= BOT_NETWORK_MIN_TEMPORAL
            && signatures.len() <= BOT_NETWORK_MAX_SIGNATURES
        {
            FraudPattern::BotNetwork
        } else if circular_flow {
            FraudPattern::WashTrading
        } else if !evidence.transaction_pattern_tags.is_empty() {
            FraudPattern::PaymentFraud
        } else if has_hard_evidence && trust_spread > IDENTITY_THEFT_TRUST_SPREAD {
            FraudPattern::IdentityTheft
        } else if avg_reports >= SCAM_RING_MIN_REPORTS {
            FraudPattern::ScamRing
        } else if avg_reports >= FAKE_REVIEWS_MIN_REPORTS
            && evidence.temporal_correlation >= FAKE_REVIEWS_MIN_TEMPORAL
        {
            FraudPattern::FakeReviews
        } else {
            FraudPattern::CoordinatedSpam
        }
    }
}
