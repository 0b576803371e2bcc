//! Cluster topology planning.
//!
//! A cluster is one coordinator plus `segment_count` segments. Every node's
//! identity, port and storage names are derived from a [`ClusterSpec`] by
//! [`plan`]; the same spec always yields the same topology.

mod cluster;
mod environment;

pub use cluster::{plan, ClusterSpec, NodeConfig, NodeRole, PlanContext, COORDINATOR_CONTENT_ID};
pub use environment::{env_keys, NodeEnvironment};
