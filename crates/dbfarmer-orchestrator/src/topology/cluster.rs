//! Cluster specification, node roles and the topology planner.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::error::{OrchestratorError, Result};
use crate::topology::environment::NodeEnvironment;

/// Content id reserved for the coordinator.
pub const COORDINATOR_CONTENT_ID: i32 = -1;

/// The size and base port of a cluster.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClusterSpec {
    /// Port of the coordinator; segments take the following ports.
    pub base_port: u16,

    /// Number of segment nodes.
    pub segment_count: i32,
}

impl ClusterSpec {
    /// Creates and validates a cluster specification.
    pub fn new(base_port: u16, segment_count: i32) -> Result<Self> {
        let spec = Self {
            base_port,
            segment_count,
        };
        spec.validate()?;
        Ok(spec)
    }

    /// Checks that the segment count is non-negative and every derived port
    /// fits in the TCP port range.
    pub fn validate(&self) -> Result<()> {
        if self.segment_count < 0 {
            return Err(OrchestratorError::configuration(format!(
                "segment count must be >= 0, got {}",
                self.segment_count
            )));
        }
        if self.base_port == 0 {
            return Err(OrchestratorError::configuration("base port must be > 0"));
        }
        let last = u32::from(self.base_port) + self.segment_count as u32;
        if last > u32::from(u16::MAX) {
            return Err(OrchestratorError::configuration(format!(
                "port range {}..={} exceeds {}",
                self.base_port,
                last,
                u16::MAX
            )));
        }
        Ok(())
    }

    /// Returns the total number of nodes, coordinator included.
    pub fn node_count(&self) -> usize {
        self.segment_count.max(0) as usize + 1
    }

    /// Returns every content id in the cluster, coordinator first.
    pub fn content_ids(&self) -> Vec<i32> {
        (COORDINATOR_CONTENT_ID..self.segment_count).collect()
    }
}

/// The role a node plays in the cluster.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum NodeRole {
    /// The node accepting client connections.
    Coordinator,

    /// A worker node holding one data partition.
    Segment {
        /// Partition id, starting at 0.
        content_id: i32,
    },
}

impl NodeRole {
    /// Maps a content id to a role.
    pub fn from_content_id(content_id: i32) -> Self {
        if content_id == COORDINATOR_CONTENT_ID {
            Self::Coordinator
        } else {
            Self::Segment { content_id }
        }
    }

    /// Returns the content id (-1 for the coordinator).
    pub fn content_id(&self) -> i32 {
        match self {
            Self::Coordinator => COORDINATOR_CONTENT_ID,
            Self::Segment { content_id } => *content_id,
        }
    }

    /// Returns true for the coordinator.
    pub fn is_coordinator(&self) -> bool {
        matches!(self, Self::Coordinator)
    }

    /// Returns the container service name.
    pub fn service_name(&self) -> String {
        match self {
            Self::Coordinator => "coordinator".to_string(),
            Self::Segment { content_id } => format!("primary-{}", content_id),
        }
    }

    /// Returns the container volume name.
    pub fn volume_name(&self) -> String {
        format!("pgdata-{}", self.service_name())
    }

    /// Returns the local data directory name.
    pub fn data_dir_name(&self) -> String {
        format!("primary_{}", self.content_id())
    }
}

impl fmt::Display for NodeRole {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.service_name())
    }
}

/// Inputs to [`plan`] that depend on the backend.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PlanContext {
    /// Address at which every node reaches the coordinator.
    pub coordinator_address: String,
}

impl PlanContext {
    /// Creates a plan context.
    pub fn new(coordinator_address: impl Into<String>) -> Self {
        Self {
            coordinator_address: coordinator_address.into(),
        }
    }

    /// Context for containerized clusters, where the coordinator is reached
    /// by its service name.
    pub fn container() -> Self {
        Self::new(NodeRole::Coordinator.service_name())
    }
}

/// Everything one node needs to start and join the cluster.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NodeConfig {
    /// Role of the node.
    pub role: NodeRole,

    /// Catalog id of the node (1 for the coordinator).
    pub dbid: i32,

    /// Listening port.
    pub port: u16,

    /// Host at which the coordinator is reachable.
    pub coordinator_address: String,

    /// Port at which the coordinator is reachable.
    pub coordinator_port: u16,

    /// Number of segments in the cluster.
    pub segment_count: i32,
}

impl NodeConfig {
    /// Returns the content id.
    pub fn content_id(&self) -> i32 {
        self.role.content_id()
    }

    /// Returns the stable storage key used for service names.
    pub fn name(&self) -> String {
        self.role.service_name()
    }

    /// Returns the environment the node process receives.
    pub fn environment(&self) -> NodeEnvironment {
        NodeEnvironment::for_node(self)
    }
}

/// Derives the topology for a cluster: the coordinator first, then segments
/// in ascending content id order.
pub fn plan(spec: &ClusterSpec, context: &PlanContext) -> Result<Vec<NodeConfig>> {
    spec.validate()?;

    let nodes = spec
        .content_ids()
        .into_iter()
        .map(|content_id| {
            let role = NodeRole::from_content_id(content_id);
            NodeConfig {
                role,
                dbid: content_id + 2,
                // content ids start at -1, so the offset is never negative
                port: spec.base_port + (content_id + 1) as u16,
                coordinator_address: context.coordinator_address.clone(),
                coordinator_port: spec.base_port,
                segment_count: spec.segment_count,
            }
        })
        .collect();

    Ok(nodes)
}
