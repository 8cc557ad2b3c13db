//! The engine audit trail.
//!
//! Every state change the engine makes is recorded as a GraphEvent in the
//! event_log table, so moderation tooling can reconstruct why a node or
//! cluster looks the way it does.

use crate::types::{ClusterId, UserId};
use serde::{Deserialize, Serialize};

/// Every event emitted by the engine.
/// Variants are appended — never removed or reordered.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum GraphEvent {
    // ── Incremental path ───────────────────────────
    ConnectionRecorded {
        user_a: UserId,
        user_b: UserId,
        kind: String,
        interaction_count: u64,
    },
    NodeScored {
        user_id: UserId,
        risk_score: i64,
        risk_level: String,
        requires_review: bool,
        degraded: bool,
    },

    // ── Batch path ─────────────────────────────────
    BatchRunStarted {
        node_count: usize,
        edge_count: usize,
    },
    BatchRunCompleted {
        cluster_count: usize,
    },
    BatchRunRejected {
        holder: String,
    },
    BatchRunAborted,
    ClusterDetected {
        cluster_id: ClusterId,
        pattern: String,
        member_count: usize,
        confidence: f64,
    },
    ClusterStatusChanged {
        cluster_id: ClusterId,
        from: String,
        to: String,
    },
    DanglingEdgeSkipped {
        user_id: UserId,
        neighbor_id: UserId,
    },

    // ── Admin path ─────────────────────────────────
    ClusterBlocked {
        cluster_id: ClusterId,
        admin_id: String,
        member_count: usize,
    },
}

/// Extract a stable string name from a GraphEvent variant.
/// Used for the event_type column in event_log.
pub fn event_type_name(event: &GraphEvent) -> &'static str {
    match event {
        GraphEvent::ConnectionRecorded { .. } => "connection_recorded",
        GraphEvent::NodeScored { .. } => "node_scored",
        GraphEvent::BatchRunStarted { .. } => "batch_run_started",
        GraphEvent::BatchRunCompleted { .. } => "batch_run_completed",
        GraphEvent::BatchRunRejected { .. } => "batch_run_rejected",
        GraphEvent::BatchRunAborted => "batch_run_aborted",
        GraphEvent::ClusterDetected { .. } => "cluster_detected",
        GraphEvent::ClusterStatusChanged { .. } => "cluster_status_changed",
        GraphEvent::DanglingEdgeSkipped { .. } => "dangling_edge_skipped",
        GraphEvent::ClusterBlocked { .. } => "cluster_blocked",
    }
}

/// The event log entry as persisted to SQLite.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EventLogEntry {
    pub id: Option<i64>,
    pub event_type: String,
    pub payload: String, // JSON-serialized GraphEvent
    pub created_at: String,
}
