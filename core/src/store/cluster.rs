//! Store methods for the risk_cluster collection and the admin audit log.

use super::GraphStore;
use crate::{
    cluster::{ClusterAction, ClusterEvidence, ClusterStatus, FraudPattern, RiskCluster},
    error::{GraphError, GraphResult},
    node::RiskLevel,
    types::{ClusterId, UserId},
};
use chrono::{DateTime, Duration, Utc};
use rusqlite::{params, OptionalExtension};

impl GraphStore {
    pub fn get_cluster(&self, cluster_id: &str) -> GraphResult<Option<RiskCluster>> {
        let mut stmt = self.conn.prepare(
            "SELECT cluster_id, pattern, risk_level, members, centroid,
                    confidence, evidence, status, detected_at, updated_at
             FROM risk_cluster WHERE cluster_id = ?1",
        )?;
        let row = stmt
            .query_row(params![cluster_id], |r| {
                Ok((
                    r.get::<_, String>(0)?,
                    r.get::<_, String>(1)?,
                    r.get::<_, String>(2)?,
                    r.get::<_, String>(3)?,
                    r.get::<_, String>(4)?,
                    r.get::<_, f64>(5)?,
                    r.get::<_, String>(6)?,
                    r.get::<_, String>(7)?,
                    r.get::<_, String>(8)?,
                    r.get::<_, String>(9)?,
                ))
            })
            .optional()?;

        row.map(cluster_from_row).transpose()
    }

    pub fn require_cluster(&self, cluster_id: &str) -> GraphResult<RiskCluster> {
        self.get_cluster(cluster_id)?
            .ok_or_else(|| GraphError::NotFound {
                kind: "risk_cluster",
                id: cluster_id.to_string(),
            })
    }

    pub fn all_clusters(&self) -> GraphResult<Vec<RiskCluster>> {
        let mut stmt = self
            .conn
            .prepare("SELECT cluster_id FROM risk_cluster ORDER BY cluster_id ASC")?;
        let ids = stmt
            .query_map([], |r| r.get::<_, String>(0))?
            .collect::<Result<Vec<_>, _>>()?;
        let mut clusters = Vec::with_capacity(ids.len());
        for id in ids {
            if let Some(c) = self.get_cluster(&id)? {
                clusters.push(c);
            }
        }
        Ok(clusters)
    }

    pub fn cluster_count(&self) -> GraphResult<i64> {
        let n: i64 = self
            .conn
            .query_row("SELECT COUNT(*) FROM risk_cluster", [], |r| r.get(0))?;
        Ok(n)
    }

    /// Persist one cluster (insert or replace).
    fn upsert_cluster(&self, cluster: &RiskCluster) -> GraphResult<()> {
        self.conn.execute(
            "INSERT OR REPLACE INTO risk_cluster (
                 cluster_id, pattern, risk_level, members, centroid,
                 confidence, evidence, status, detected_at, updated_at
             ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10)",
            params![
                cluster.cluster_id,
                cluster.pattern.name(),
                cluster.risk_level.name(),
                serde_json::to_string(&cluster.members)?,
                cluster.centroid,
                cluster.confidence,
                serde_json::to_string(&cluster.evidence)?,
                cluster.status.name(),
                cluster.detected_at.to_rfc3339(),
                cluster.updated_at.to_rfc3339(),
            ],
        )?;
        Ok(())
    }

    /// Commit one full batch run atomically: every detected cluster, every
    /// membership assignment, and every stale-membership clear land in a
    /// single transaction. An aborted run commits nothing.
    pub fn commit_batch(
        &self,
        clusters: &[RiskCluster],
        assignments: &[(UserId, ClusterId)],
        cleared: &[UserId],
    ) -> GraphResult<()> {
        let tx = self.conn.unchecked_transaction()?;
        for cluster in clusters {
            self.upsert_cluster(cluster)?;
        }
        for (user_id, cluster_id) in assignments {
            self.conn.execute(
                "UPDATE risk_node SET cluster_id = ?2, version = version + 1,
                        updated_at = ?3
                 WHERE user_id = ?1",
                params![user_id, cluster_id, Utc::now().to_rfc3339()],
            )?;
        }
        for user_id in cleared {
            self.conn.execute(
                "UPDATE risk_node SET cluster_id = NULL, version = version + 1,
                        updated_at = ?2
                 WHERE user_id = ?1",
                params![user_id, Utc::now().to_rfc3339()],
            )?;
        }
        tx.commit()?;
        Ok(())
    }

    /// Update status outside a batch run (detector auto-advance happens
    /// inside commit_batch; this is the admin path).
    pub fn set_cluster_status(
        &self,
        cluster_id: &str,
        status: ClusterStatus,
    ) -> GraphResult<()> {
        self.conn.execute(
            "UPDATE risk_cluster SET status = ?2, updated_at = ?3 WHERE cluster_id = ?1",
            params![cluster_id, status.name(), Utc::now().to_rfc3339()],
        )?;
        Ok(())
    }

    // ── Admin audit log ───────────────────────────────────────────────

    /// Append-only: there is deliberately no update or delete counterpart.
    pub fn append_cluster_action(&self, action: &ClusterAction) -> GraphResult<()> {
        self.conn.execute(
            "INSERT INTO cluster_action (
                 action_id, cluster_id, admin_id, action, reason, taken_at
             ) VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
            params![
                action.action_id,
                action.cluster_id,
                action.admin_id,
                action.action,
                action.reason,
                action.taken_at.to_rfc3339(),
            ],
        )?;
        Ok(())
    }

    pub fn cluster_actions(&self, cluster_id: &str) -> GraphResult<Vec<ClusterAction>> {
        let mut stmt = self.conn.prepare(
            "SELECT action_id, cluster_id, admin_id, action, reason, taken_at
             FROM cluster_action WHERE cluster_id = ?1
             ORDER BY taken_at ASC, action_id ASC",
        )?;
        let actions = stmt
            .query_map(params![cluster_id], |r| {
                Ok((
                    r.get::<_, String>(0)?,
                    r.get::<_, String>(1)?,
                    r.get::<_, String>(2)?,
                    r.get::<_, String>(3)?,
                    r.get::<_, String>(4)?,
                    r.get::<_, String>(5)?,
                ))
            })?
            .collect::<Result<Vec<_>, _>>()?;

        actions
            .into_iter()
            .map(|(action_id, cluster_id, admin_id, action, reason, taken_at)| {
                Ok(ClusterAction {
                    action_id,
                    cluster_id,
                    admin_id,
                    action,
                    reason,
                    taken_at: parse_timestamp(&taken_at)?,
                })
            })
            .collect()
    }

    // ── Retention ─────────────────────────────────────────────────────

    /// Delete RESOLVED clusters older than the retention window.
    /// Audit actions are kept. Returns the number of purged clusters.
    pub fn purge_resolved_before(&self, retention_days: i64) -> GraphResult<usize> {
        let cutoff = (Utc::now() - Duration::days(retention_days)).to_rfc3339();
        let purged = self.conn.execute(
            "DELETE FROM risk_cluster WHERE status = 'resolved' AND updated_at < ?1",
            params![cutoff],
        )?;
        Ok(purged)
    }
}

fn parse_timestamp(s: &str) -> GraphResult<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(s)
        .map(|t| t.with_timezone(&Utc))
        .map_err(|e| GraphError::DataIntegrity {
            detail: format!("bad timestamp '{s}': {e}"),
        })
}

type ClusterRow = (
    String,
    String,
    String,
    String,
    String,
    f64,
    String,
    String,
    String,
    String,
);

fn cluster_from_row(row: ClusterRow) -> GraphResult<RiskCluster> {
    let (cluster_id, pattern, level, members, centroid, confidence, evidence, status, detected, updated) =
        row;
    let pattern = FraudPattern::parse(&pattern).ok_or_else(|| GraphError::DataIntegrity {
        detail: format!("unknown pattern '{pattern}' on cluster '{cluster_id}'"),
    })?;
    let risk_level = RiskLevel::parse(&level).ok_or_else(|| GraphError::DataIntegrity {
        detail: format!("unknown risk level '{level}' on cluster '{cluster_id}'"),
    })?;
    let status = ClusterStatus::parse(&status).ok_or_else(|| GraphError::DataIntegrity {
        detail: format!("unknown status '{status}' on cluster '{cluster_id}'"),
    })?;
    let members: Vec<UserId> = serde_json::from_str(&members)?;
    let evidence: ClusterEvidence = serde_json::from_str(&evidence)?;

    Ok(RiskCluster {
        cluster_id,
        pattern,
        risk_level,
        members,
        centroid,
        confidence,
        evidence,
        status,
        detected_at: parse_timestamp(&detected)?,
        updated_at: parse_timestamp(&updated)?,
    })
}
