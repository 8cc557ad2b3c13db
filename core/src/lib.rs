//! Behavioral risk graph and fraud cluster detection.
//!
//! Users are nodes, observed relationships are typed weighted edges, and
//! coordinated abuse shows up as densely connected components. Two paths
//! share one SQLite-backed graph:
//!
//! - incremental: record an observation, re-score the affected node with
//!   a cheap 1-hop analysis ([`engine::RiskGraphEngine::analyze_user`]);
//! - batch: union-find over the hard-evidence edge set, producing
//!   classified, confidence-scored clusters for admin review
//!   ([`engine::RiskGraphEngine::detect_clusters`]).
//!
//! Trust scores, raw fraud signals, and account sanctions live behind
//! traits in [`signal`] — this engine recommends, external systems act.

pub mod cluster;
pub mod config;
pub mod connection;
pub mod detector;
pub mod engine;
pub mod error;
pub mod event;
pub mod gateway;
pub mod node;
pub mod scorer;
pub mod signal;
pub mod store;
pub mod types;
pub mod weigher;

pub use cluster::{ClusterAction, ClusterEvidence, ClusterStatus, FraudPattern, RiskCluster};
pub use config::EngineConfig;
pub use connection::{Connection, ConnectionType};
pub use detector::CancelToken;
pub use engine::RiskGraphEngine;
pub use error::{GraphError, GraphResult};
pub use node::{RiskLevel, RiskNode};
pub use scorer::GraphAnalysisResult;
pub use store::GraphStore;
pub use weigher::RawObservation;
