//! Admin Action Gateway — the surface the moderation portal talks to.
//!
//! Every decision lands in the append-only cluster_action log before its
//! side effects run, so the audit trail records attempts as well as
//! outcomes. Sanctions are emitted to the external account-lifecycle
//! system; this engine never bans anyone itself.

use crate::{
    cluster::{ClusterAction, ClusterStatus, RiskCluster},
    error::{GraphError, GraphResult},
    event::GraphEvent,
    node::RiskNode,
    signal::SanctionSink,
    store::GraphStore,
};
use chrono::Utc;
use uuid::Uuid;

pub struct AdminGateway<'a> {
    store: &'a GraphStore,
    sanctions: &'a dyn SanctionSink,
}

impl<'a> AdminGateway<'a> {
    pub fn new(store: &'a GraphStore, sanctions: &'a dyn SanctionSink) -> Self {
        Self { store, sanctions }
    }

    /// Cluster detail view: the cluster plus the full node for every
    /// member, so reviewers see evidence without extra round trips.
    pub fn cluster_members(&self, cluster_id: &str) -> GraphResult<(RiskCluster, Vec<RiskNode>)> {
        let cluster = self.store.require_cluster(cluster_id)?;
        let mut nodes = Vec::with_capacity(cluster.members.len());
        for member in &cluster.members {
            nodes.push(self.store.require_node(member)?);
        }
        Ok((cluster, nodes))
    }

    /// Bulk sanction: log the decision, resolve the cluster, and signal
    /// the account-lifecycle system for every member.
    ///
    /// Repeating the call on an already-resolved cluster re-logs and
    /// re-signals but performs no state transition, so replaying a
    /// moderation request is safe.
    pub fn block_cluster(
        &self,
        cluster_id: &str,
        admin_id: &str,
        reason: &str,
    ) -> GraphResult<ClusterAction> {
        let cluster = self.store.require_cluster(cluster_id)?;

        let action = self.log_action(cluster_id, admin_id, "block_cluster", reason)?;

        if cluster.status != ClusterStatus::Resolved {
            self.transition(&cluster, ClusterStatus::Resolved)?;
        }

        self.sanctions
            .sanction_accounts(cluster_id, &cluster.members, reason)?;
        self.store.append_event(&GraphEvent::ClusterBlocked {
            cluster_id: cluster_id.to_string(),
            admin_id: admin_id.to_string(),
            member_count: cluster.members.len(),
        })?;
        log::info!(
            "cluster '{cluster_id}' blocked by '{admin_id}': {} member(s) signalled",
            cluster.members.len()
        );
        Ok(action)
    }

    /// Explicit status change, validated against the lifecycle state
    /// machine. Rejected transitions are still not logged — nothing
    /// happened.
    pub fn set_status(
        &self,
        cluster_id: &str,
        admin_id: &str,
        next: ClusterStatus,
        reason: &str,
    ) -> GraphResult<ClusterAction> {
        let cluster = self.store.require_cluster(cluster_id)?;
        if !cluster.status.can_transition_to(next) {
            return Err(GraphError::InvalidTransition {
                from: cluster.status.name().to_string(),
                to: next.name().to_string(),
            });
        }
        let action = self.log_action(
            cluster_id,
            admin_id,
            &format!("set_status:{}", next.name()),
            reason,
        )?;
        self.transition(&cluster, next)?;
        Ok(action)
    }

    /// Mark a cluster confirmed fraud.
    pub fn confirm_cluster(
        &self,
        cluster_id: &str,
        admin_id: &str,
        reason: &str,
    ) -> GraphResult<ClusterAction> {
        self.set_status(cluster_id, admin_id, ClusterStatus::Confirmed, reason)
    }

    /// Dismiss a false positive: straight to resolved, members keep their
    /// accounts.
    pub fn dismiss_cluster(
        &self,
        cluster_id: &str,
        admin_id: &str,
        reason: &str,
    ) -> GraphResult<ClusterAction> {
        self.set_status(cluster_id, admin_id, ClusterStatus::Resolved, reason)
    }

    /// The full audit trail for a cluster, oldest first.
    pub fn audit_trail(&self, cluster_id: &str) -> GraphResult<Vec<ClusterAction>> {
        self.store.cluster_actions(cluster_id)
    }

    fn log_action(
        &self,
        cluster_id: &str,
        admin_id: &str,
        action: &str,
        reason: &str,
    ) -> GraphResult<ClusterAction> {
        let record = ClusterAction {
            action_id: Uuid::new_v4().to_string(),
            cluster_id: cluster_id.to_string(),
            admin_id: admin_id.to_string(),
            action: action.to_string(),
            reason: reason.to_string(),
            taken_at: Utc::now(),
        };
        self.store.append_cluster_action(&record)?;
        Ok(record)
    }

    fn transition(&self, cluster: &RiskCluster, next: ClusterStatus) -> GraphResult<()> {
        self.store.set_cluster_status(&cluster.cluster_id, next)?;
        self.store.append_event(&GraphEvent::ClusterStatusChanged {
            cluster_id: cluster.cluster_id.clone(),
            from: cluster.status.name().to_string(),
            to: next.name().to_string(),
        })?;
        Ok(())
    }
}
