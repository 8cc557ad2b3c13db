//! SQLite persistence layer.
//!
//! RULE: Only the store modules talk to the database.
//! Components call store methods — they never execute SQL directly.

use crate::{
    error::{GraphError, GraphResult},
    event::{event_type_name, EventLogEntry, GraphEvent},
};
use chrono::{DateTime, Utc};
use rusqlite::{params, Connection, OptionalExtension};

mod cluster;
mod node;

/// Name of the single cluster-detection lease row.
const DETECTOR_LEASE: &str = "cluster_detector";

pub struct GraphStore {
    conn: Connection,
    path: Option<String>, // None for :memory:, Some(path) for file
}

impl GraphStore {
    pub fn open(path: &str) -> GraphResult<Self> {
        let conn = Connection::open_with_flags(
            path,
            rusqlite::OpenFlags::SQLITE_OPEN_READ_WRITE
                | rusqlite::OpenFlags::SQLITE_OPEN_CREATE
                | rusqlite::OpenFlags::SQLITE_OPEN_URI,
        )?;
        // WAL mode only for real files (shared-memory and :memory: ignore it).
        let _ = conn.execute_batch("PRAGMA journal_mode=WAL;");
        conn.execute_batch("PRAGMA foreign_keys=ON;")?;
        Ok(Self {
            conn,
            path: Some(path.to_string()),
        })
    }

    /// Open an in-memory database (used in tests).
    pub fn in_memory() -> GraphResult<Self> {
        let conn = Connection::open(":memory:")?;
        conn.execute_batch("PRAGMA foreign_keys=ON;")?;
        Ok(Self { conn, path: None })
    }

    /// Reopen a new connection to the same database.
    /// For in-memory databases, this returns a new isolated database.
    pub fn reopen(&self) -> GraphResult<Self> {
        match &self.path {
            Some(p) => Self::open(p),
            None => Self::in_memory(),
        }
    }

    /// Apply all schema migrations in order.
    pub fn migrate(&self) -> GraphResult<()> {
        self.conn
            .execute_batch(include_str!("../../migrations/001_graph.sql"))?;
        Ok(())
    }

    // ── Event log ──────────────────────────────────────────────

    pub fn append_event(&self, event: &GraphEvent) -> GraphResult<()> {
        self.conn.execute(
            "INSERT INTO event_log (event_type, payload, created_at)
             VALUES (?1, ?2, ?3)",
            params![
                event_type_name(event),
                serde_json::to_string(event)?,
                Utc::now().to_rfc3339(),
            ],
        )?;
        Ok(())
    }

    pub fn events_of_type(&self, event_type: &str) -> GraphResult<Vec<EventLogEntry>> {
        let mut stmt = self.conn.prepare(
            "SELECT id, event_type, payload, created_at
             FROM event_log WHERE event_type = ?1
             ORDER BY id ASC",
        )?;
        let entries = stmt
            .query_map(params![event_type], |row| {
                Ok(EventLogEntry {
                    id: Some(row.get(0)?),
                    event_type: row.get(1)?,
                    payload: row.get(2)?,
                    created_at: row.get(3)?,
                })
            })?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(entries)
    }

    pub fn event_count(&self, event_type: &str) -> GraphResult<i64> {
        let n: i64 = self.conn.query_row(
            "SELECT COUNT(*) FROM event_log WHERE event_type = ?1",
            params![event_type],
            |r| r.get(0),
        )?;
        Ok(n)
    }

    // ── Batch lease ────────────────────────────────────────────

    /// Acquire the exclusive cluster-detection lease. A live lease is a
    /// hard rejection; a lease older than `timeout_secs` is treated as
    /// abandoned and broken with a warning.
    pub fn acquire_detector_lease(&self, holder: &str, timeout_secs: i64) -> GraphResult<()> {
        let existing: Option<(String, String)> = self
            .conn
            .query_row(
                "SELECT holder, acquired_at FROM batch_lease WHERE lease_name = ?1",
                params![DETECTOR_LEASE],
                |r| Ok((r.get(0)?, r.get(1)?)),
            )
            .optional()?;

        if let Some((current_holder, acquired_at)) = existing {
            let age_secs = DateTime::parse_from_rfc3339(&acquired_at)
                .map(|t| (Utc::now() - t.with_timezone(&Utc)).num_seconds())
                .unwrap_or(i64::MAX);
            if age_secs < timeout_secs {
                return Err(GraphError::ConcurrentBatchConflict {
                    holder: current_holder,
                });
            }
            log::warn!(
                "breaking abandoned detector lease held by '{current_holder}' for {age_secs}s"
            );
            self.conn.execute(
                "DELETE FROM batch_lease WHERE lease_name = ?1",
                params![DETECTOR_LEASE],
            )?;
        }

        self.conn.execute(
            "INSERT INTO batch_lease (lease_name, holder, acquired_at) VALUES (?1, ?2, ?3)",
            params![DETECTOR_LEASE, holder, Utc::now().to_rfc3339()],
        )?;
        Ok(())
    }

    pub fn release_detector_lease(&self) -> GraphResult<()> {
        self.conn.execute(
            "DELETE FROM batch_lease WHERE lease_name = ?1",
            params![DETECTOR_LEASE],
        )?;
        Ok(())
    }
}
