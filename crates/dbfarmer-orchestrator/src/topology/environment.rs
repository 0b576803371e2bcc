//! Per-node environment variables.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::topology::cluster::NodeConfig;

/// Variable names read by the node bootstrap scripts.
pub mod env_keys {
    /// Catalog id of the node.
    pub const DBID: &str = "CLUSTER_DBID";
    /// Content id of the node.
    pub const CONTENT_ID: &str = "CLUSTER_CONTENTID";
    /// Number of segments in the cluster.
    pub const NUM_SEGMENTS: &str = "CLUSTER_NUM_SEGMENTS";
    /// Listening port.
    pub const PORT: &str = "PGPORT";
    /// Coordinator host.
    pub const COORDINATOR_HOST: &str = "CLUSTER_COORDINATOR_HOST";
    /// Coordinator port, set for segments only.
    pub const COORDINATOR_PORT: &str = "CLUSTER_COORDINATOR_PORT";
    /// Data directory of a locally run node.
    pub const DATA_DIR: &str = "PGDATA";
}

/// An immutable, insertion-ordered set of environment variables for one node.
///
/// Adding a variable returns a new value; a key that is already present is
/// replaced in place.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct NodeEnvironment {
    vars: Vec<(String, String)>,
}

impl NodeEnvironment {
    /// Creates an empty environment.
    pub fn new() -> Self {
        Self::default()
    }

    /// Builds the environment for a node.
    pub fn for_node(node: &NodeConfig) -> Self {
        let env = Self::new()
            .with(env_keys::DBID, node.dbid.to_string())
            .with(env_keys::CONTENT_ID, node.content_id().to_string())
            .with(env_keys::NUM_SEGMENTS, node.segment_count.to_string())
            .with(env_keys::PORT, node.port.to_string())
            .with(env_keys::COORDINATOR_HOST, node.coordinator_address.clone());

        if node.role.is_coordinator() {
            env
        } else {
            env.with(env_keys::COORDINATOR_PORT, node.coordinator_port.to_string())
        }
    }

    /// Returns a copy with the variable set.
    #[must_use]
    pub fn with(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        let key = key.into();
        let value = value.into();
        match self.vars.iter_mut().find(|(k, _)| *k == key) {
            Some(entry) => entry.1 = value,
            None => self.vars.push((key, value)),
        }
        self
    }

    /// Looks up a variable.
    pub fn get(&self, key: &str) -> Option<&str> {
        self.vars
            .iter()
            .find(|(k, _)| k == key)
            .map(|(_, v)| v.as_str())
    }

    /// Iterates the variables in insertion order.
    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.vars.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }

    /// Returns the number of variables.
    pub fn len(&self) -> usize {
        self.vars.len()
    }

    /// Returns true if no variable is set.
    pub fn is_empty(&self) -> bool {
        self.vars.is_empty()
    }

    /// Renders the variables as `KEY=VALUE` strings.
    pub fn to_assignments(&self) -> Vec<String> {
        self.iter().map(|(k, v)| format!("{}={}", k, v)).collect()
    }
}

impl fmt::Display for NodeEnvironment {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_assignments().join(" "))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::topology::{plan, ClusterSpec, PlanContext};

    #[test]
    fn test_environment_contract() {
        let spec = ClusterSpec::new(12345, 2).unwrap();
        let nodes = plan(&spec, &PlanContext::new("host-a")).unwrap();

        assert_eq!(
            nodes[0].environment().to_assignments(),
            vec![
                "CLUSTER_DBID=1",
                "CLUSTER_CONTENTID=-1",
                "CLUSTER_NUM_SEGMENTS=2",
                "PGPORT=12345",
                "CLUSTER_COORDINATOR_HOST=host-a",
            ]
        );
        assert_eq!(
            nodes[2].environment().to_assignments(),
            vec![
                "CLUSTER_DBID=3",
                "CLUSTER_CONTENTID=1",
                "CLUSTER_NUM_SEGMENTS=2",
                "PGPORT=12347",
                "CLUSTER_COORDINATOR_HOST=host-a",
                "CLUSTER_COORDINATOR_PORT=12345",
            ]
        );
    }

    #[test]
    fn test_with_replaces_existing_key() {
        let base = NodeEnvironment::new().with("A", "1").with("B", "2");
        let updated = base.clone().with("A", "3");

        assert_eq!(base.get("A"), Some("1"));
        assert_eq!(updated.get("A"), Some("3"));
        assert_eq!(updated.len(), 2);
        assert_eq!(updated.to_string(), "A=3 B=2");
        assert!(NodeEnvironment::new().is_empty());
    }
}
