//! Store methods for the risk_node collection.

use super::GraphStore;
use crate::{
    connection::Connection,
    error::{GraphError, GraphResult},
    node::{NodeMetadata, RiskLevel, RiskNode},
    types::UserId,
};
use chrono::Utc;
use rusqlite::{params, OptionalExtension};
use std::collections::{BTreeMap, BTreeSet};

impl GraphStore {
    /// Insert a freshly created node. Version starts at 1.
    pub fn insert_node(&self, node: &RiskNode) -> GraphResult<()> {
        self.conn.execute(
            "INSERT INTO risk_node (
                 user_id, trust_score, risk_score, risk_level,
                 connections, metadata, flags, cluster_id, dirty, version, updated_at
             ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, 1, ?10)",
            params![
                node.user_id,
                node.trust_score,
                node.risk_score,
                node.risk_level.name(),
                serde_json::to_string(&node.connections)?,
                serde_json::to_string(&node.metadata)?,
                serde_json::to_string(&node.flags)?,
                node.cluster_id,
                node.dirty as i64,
                Utc::now().to_rfc3339(),
            ],
        )?;
        Ok(())
    }

    pub fn get_node(&self, user_id: &str) -> GraphResult<Option<RiskNode>> {
        let mut stmt = self.conn.prepare(
            "SELECT user_id, trust_score, risk_score, risk_level,
                    connections, metadata, flags, cluster_id, dirty, version
             FROM risk_node WHERE user_id = ?1",
        )?;
        let row = stmt
            .query_row(params![user_id], |r| {
                Ok((
                    r.get::<_, String>(0)?,
                    r.get::<_, i64>(1)?,
                    r.get::<_, i64>(2)?,
                    r.get::<_, String>(3)?,
                    r.get::<_, String>(4)?,
                    r.get::<_, String>(5)?,
                    r.get::<_, String>(6)?,
                    r.get::<_, Option<String>>(7)?,
                    r.get::<_, i64>(8)?,
                    r.get::<_, i64>(9)?,
                ))
            })
            .optional()?;

        let Some((user_id, trust, risk, level, conns, meta, flags, cluster_id, dirty, version)) =
            row
        else {
            return Ok(None);
        };

        let connections: BTreeMap<UserId, Connection> = serde_json::from_str(&conns)?;
        let metadata: NodeMetadata = serde_json::from_str(&meta)?;
        let flags: BTreeSet<String> = serde_json::from_str(&flags)?;
        let risk_level = RiskLevel::parse(&level).ok_or_else(|| GraphError::DataIntegrity {
            detail: format!("unknown risk level '{level}' on node '{user_id}'"),
        })?;

        Ok(Some(RiskNode {
            user_id,
            trust_score: trust,
            risk_score: risk,
            risk_level,
            connections,
            metadata,
            flags,
            cluster_id,
            dirty: dirty != 0,
            version,
        }))
    }

    /// Fetch a node that must exist.
    pub fn require_node(&self, user_id: &str) -> GraphResult<RiskNode> {
        self.get_node(user_id)?.ok_or_else(|| GraphError::NotFound {
            kind: "risk_node",
            id: user_id.to_string(),
        })
    }

    /// Optimistic update: commits only if the stored version still matches
    /// `expected_version`. Returns false on conflict so the caller can
    /// re-read and retry (bounded — see weigher.rs).
    pub fn update_node_versioned(
        &self,
        node: &RiskNode,
        expected_version: i64,
    ) -> GraphResult<bool> {
        let affected = self.conn.execute(
            "UPDATE risk_node SET
                 trust_score = ?2, risk_score = ?3, risk_level = ?4,
                 connections = ?5, metadata = ?6, flags = ?7,
                 cluster_id = ?8, dirty = ?9, version = version + 1, updated_at = ?10
             WHERE user_id = ?1 AND version = ?11",
            params![
                node.user_id,
                node.trust_score,
                node.risk_score,
                node.risk_level.name(),
                serde_json::to_string(&node.connections)?,
                serde_json::to_string(&node.metadata)?,
                serde_json::to_string(&node.flags)?,
                node.cluster_id,
                node.dirty as i64,
                Utc::now().to_rfc3339(),
                expected_version,
            ],
        )?;
        Ok(affected == 1)
    }

    /// All nodes, ordered by user id for deterministic traversal.
    pub fn all_nodes(&self) -> GraphResult<Vec<RiskNode>> {
        let mut stmt = self
            .conn
            .prepare("SELECT user_id FROM risk_node ORDER BY user_id ASC")?;
        let ids = stmt
            .query_map([], |r| r.get::<_, String>(0))?
            .collect::<Result<Vec<_>, _>>()?;
        let mut nodes = Vec::with_capacity(ids.len());
        for id in ids {
            if let Some(node) = self.get_node(&id)? {
                nodes.push(node);
            }
        }
        Ok(nodes)
    }

    pub fn node_count(&self) -> GraphResult<i64> {
        let n: i64 = self
            .conn
            .query_row("SELECT COUNT(*) FROM risk_node", [], |r| r.get(0))?;
        Ok(n)
    }

    /// User ids currently carrying any cluster membership.
    pub fn nodes_with_cluster(&self) -> GraphResult<Vec<(UserId, String)>> {
        let mut stmt = self.conn.prepare(
            "SELECT user_id, cluster_id FROM risk_node
             WHERE cluster_id IS NOT NULL ORDER BY user_id ASC",
        )?;
        let rows = stmt
            .query_map([], |r| Ok((r.get(0)?, r.get(1)?)))?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(rows)
    }
}
