//! Connection Weigher — turns raw observed relationships into typed,
//! weighted edges on both endpoints' risk nodes.
//!
//! Writes are localized read-modify-write on at most two nodes and use
//! optimistic concurrency: a version check on commit, a bounded retry
//! loop on conflict. Unrelated user pairs never contend.

use crate::{
    config::EngineConfig,
    connection::{Connection, ConnectionType},
    error::{GraphError, GraphResult},
    event::GraphEvent,
    node::{RiskNode, FLAG_SHARED_DEVICE_3PLUS, FLAG_SHARED_IP_3PLUS},
    signal::FraudSignalProvider,
    store::GraphStore,
    types::UserId,
};
use chrono::Utc;

/// Distinct accounts beyond the node itself that a single device/IP
/// must link before the immediate multi-account flag fires. Local
/// neighbor counts and the provider reverse lookup both use this, on
/// the same accounts-other-than-self basis.
pub const SHARED_SIGNAL_FLAG_THRESHOLD: usize = 3;

/// A raw observed relationship between two users, e.g. "user_a and
/// user_b share device fingerprint X".
#[derive(Debug, Clone)]
pub struct RawObservation {
    pub user_a: UserId,
    pub user_b: UserId,
    pub kind: ConnectionType,
    /// The shared signal value itself (fingerprint, IP address), when
    /// the observation carries one.
    pub signal_value: Option<String>,
}

pub struct ConnectionWeigher<'a> {
    store: &'a GraphStore,
    config: &'a EngineConfig,
    signals: &'a dyn FraudSignalProvider,
}

impl<'a> ConnectionWeigher<'a> {
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

    /// Upsert the observed connection symmetrically on both nodes.
    /// Both nodes come out dirty (due for re-scoring).
    pub fn record_observation(&self, obs: &RawObservation) -> GraphResult<()> {
        if obs.user_a == obs.user_b {
            return Err(GraphError::DataIntegrity {
                detail: format!("self-connection observed for '{}'", obs.user_a),
            });
        }

        let count = self.upsert_side(&obs.user_a, &obs.user_b, obs.kind, &obs.signal_value)?;
        self.upsert_side(&obs.user_b, &obs.user_a, obs.kind, &obs.signal_value)?;

        self.store.append_event(&GraphEvent::ConnectionRecorded {
            user_a: obs.user_a.clone(),
            user_b: obs.user_b.clone(),
            kind: obs.kind.name().to_string(),
            interaction_count: count,
        })?;
        Ok(())
    }

    /// One endpoint's read-modify-write, retried on version conflict.
    fn upsert_side(
        &self,
        user_id: &str,
        neighbor_id: &str,
        kind: ConnectionType,
        signal_value: &Option<String>,
    ) -> GraphResult<u64> {
        let mut attempts = 0u32;
        loop {
            let mut node = match self.store.get_node(user_id)? {
                Some(node) => node,
                None => {
                    // Lazy creation on the first recorded connection.
                    let node = RiskNode::new(user_id.to_string(), self.config.neutral_trust);
                    self.store.insert_node(&node)?;
                    self.store.require_node(user_id)?
                }
            };
            let expected_version = node.version;

            let count = self.apply_observation(&mut node, neighbor_id, kind, signal_value);

            if self.store.update_node_versioned(&node, expected_version)? {
                return Ok(count);
            }
            attempts += 1;
            if attempts > self.config.max_write_retries {
                return Err(GraphError::WriteConflict {
                    user_id: user_id.to_string(),
                    attempts,
                });
            }
            log::debug!("version conflict on '{user_id}', retry {attempts}");
        }
    }

    fn apply_observation(
        &self,
        node: &mut RiskNode,
        neighbor_id: &str,
        kind: ConnectionType,
        signal_value: &Option<String>,
    ) -> u64 {
        let now = Utc::now();

        // Refresh cached metadata. A degraded provider leaves the cache
        // untouched — the write itself must not fail.
        match self.signals.user_signals(&node.user_id) {
            Ok(signals) => signals.apply_to(&mut node.metadata),
            Err(e) => log::warn!("signal refresh skipped for '{}': {e}", node.user_id),
        }

        // The observed signal value is evidence regardless of provider health.
        if let Some(value) = signal_value {
            match kind {
                ConnectionType::DeviceMatch => {
                    node.metadata.device_fingerprints.insert(value.clone());
                }
                ConnectionType::IpMatch => {
                    node.metadata.ip_addresses.insert(value.clone());
                }
                _ => {}
            }
        }

        // Same-type connection to the same neighbor: count one more
        // interaction. The type set is closed; we never invent types here.
        let count = match node.connections.get_mut(neighbor_id) {
            Some(existing) if existing.kind == kind => {
                existing.record_interaction(now);
                existing.interaction_count
            }
            _ => {
                let conn = Connection::new(kind, now);
                let count = conn.interaction_count;
                node.connections.insert(neighbor_id.to_string(), conn);
                count
            }
        };

        self.accumulate_sharing_flags(node, kind, signal_value);
        node.dirty = true;
        count
    }

    /// Immediate multi-account signals, independent of aggregate score:
    /// one device/IP linking 3+ distinct accounts flags the node.
    fn accumulate_sharing_flags(
        &self,
        node: &mut RiskNode,
        kind: ConnectionType,
        signal_value: &Option<String>,
    ) {
        let (flag, threshold_hit) = match kind {
            ConnectionType::DeviceMatch => (
                FLAG_SHARED_DEVICE_3PLUS,
                node.neighbor_count_of_kind(ConnectionType::DeviceMatch)
                    >= SHARED_SIGNAL_FLAG_THRESHOLD,
            ),
            ConnectionType::IpMatch => (
                FLAG_SHARED_IP_3PLUS,
                node.neighbor_count_of_kind(ConnectionType::IpMatch)
                    >= SHARED_SIGNAL_FLAG_THRESHOLD,
            ),
            _ => return,
        };

        if threshold_hit {
            node.flags.insert(flag.to_string());
            return;
        }

        // The local neighbor count can undercount a hub device; ask the
        // provider for the fingerprint's full account list when we have
        // it. IPs have no counterpart — the provider indexes devices only.
        if kind == ConnectionType::DeviceMatch {
            if let Some(value) = signal_value {
                match self.signals.users_sharing_device(value) {
                    Ok(users) => {
                        let others = users
                            .iter()
                            .filter(|u| u.as_str() != node.user_id)
                            .count();
                        if others >= SHARED_SIGNAL_FLAG_THRESHOLD {
                            node.flags.insert(flag.to_string());
                        }
                    }
                    Err(e) => log::warn!("device lookup skipped for '{value}': {e}"),
                }
            }
        }
    }
}
