//! Builds compose descriptors from cluster specifications.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::compose::descriptor::{ComposeService, ContainerDescriptor};
use crate::error::{OrchestratorError, Result};
use crate::topology::{plan, ClusterSpec, NodeConfig, PlanContext};

const DEFAULT_NETWORK: &str = "default";

/// Settings shared by every generated service.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ComposeConfig {
    /// Image every node runs.
    pub image: String,

    /// Compose project name.
    pub project_name: String,

    /// Path inside the container where the node volume is mounted.
    pub data_mount: String,
}

impl Default for ComposeConfig {
    fn default() -> Self {
        Self {
            image: "dbfarmer:gpdb".to_string(),
            project_name: "dbfarmer-for-gpdb".to_string(),
            data_mount: "/home/gpadmin/pgdata".to_string(),
        }
    }
}

impl ComposeConfig {
    /// Creates a new configuration builder.
    pub fn builder() -> ComposeConfigBuilder {
        ComposeConfigBuilder::default()
    }

    /// Returns the default mount path for a container user.
    pub fn data_mount_for_user(user: &str) -> String {
        format!("/home/{}/pgdata", user)
    }
}

/// Builder for `ComposeConfig`.
#[derive(Debug, Default)]
pub struct ComposeConfigBuilder {
    config: ComposeConfig,
}

impl ComposeConfigBuilder {
    /// Sets the image.
    pub fn image(mut self, image: impl Into<String>) -> Self {
        self.config.image = image.into();
        self
    }

    /// Sets the project name.
    pub fn project_name(mut self, name: impl Into<String>) -> Self {
        self.config.project_name = name.into();
        self
    }

    /// Sets the data mount path.
    pub fn data_mount(mut self, path: impl Into<String>) -> Self {
        self.config.data_mount = path.into();
        self
    }

    /// Mounts node data under the given user's home directory.
    pub fn user(mut self, user: &str) -> Self {
        self.config.data_mount = ComposeConfig::data_mount_for_user(user);
        self
    }

    /// Builds the configuration.
    pub fn build(self) -> ComposeConfig {
        self.config
    }
}

/// Turns a [`ClusterSpec`] into a [`ContainerDescriptor`].
#[derive(Debug, Clone, Default)]
pub struct ContainerDescriptorBuilder {
    config: ComposeConfig,
}

impl ContainerDescriptorBuilder {
    /// Creates a builder.
    pub fn new(config: ComposeConfig) -> Self {
        Self { config }
    }

    /// Returns the configuration.
    pub fn config(&self) -> &ComposeConfig {
        &self.config
    }

    /// Builds the descriptor: one service and one volume per node on a
    /// shared default network. Only the coordinator publishes its port.
    pub fn build(&self, spec: &ClusterSpec) -> Result<ContainerDescriptor> {
        if self.config.image.is_empty() {
            return Err(OrchestratorError::configuration("container image must be set"));
        }

        let nodes = plan(spec, &PlanContext::container())?;

        let mut services = BTreeMap::new();
        let mut volumes = BTreeMap::new();
        for node in &nodes {
            volumes.insert(node.role.volume_name(), None);
            services.insert(node.role.service_name(), self.service(node));
        }

        debug!(services = services.len(), "Built container descriptor");

        Ok(ContainerDescriptor {
            version: "3".to_string(),
            name: self.config.project_name.clone(),
            networks: BTreeMap::from([(DEFAULT_NETWORK.to_string(), None)]),
            volumes,
            services,
        })
    }

    fn service(&self, node: &NodeConfig) -> ComposeService {
        let ports = if node.role.is_coordinator() {
            vec![format!("{}:{}", node.port, node.port)]
        } else {
            Vec::new()
        };

        ComposeService {
            image: self.config.image.clone(),
            environment: node.environment().to_assignments(),
            volumes: vec![format!(
                "{}:{}",
                node.role.volume_name(),
                self.config.data_mount
            )],
            networks: vec![DEFAULT_NETWORK.to_string()],
            ports,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn builder() -> ContainerDescriptorBuilder {
        ContainerDescriptorBuilder::new(ComposeConfig::builder().user("gpadmin").build())
    }

    #[test]
    fn test_one_service_and_volume_per_node() {
        let spec = ClusterSpec::new(12345, 3).unwrap();
        let descriptor = builder().build(&spec).unwrap();

        assert_eq!(descriptor.services.len(), 4);
        assert_eq!(descriptor.volumes.len(), 4);
        assert_eq!(descriptor.networks.len(), 1);
        assert!(descriptor.networks.contains_key("default"));
        for (name, service) in &descriptor.services {
            let volume = service.volumes[0].split(':').next().unwrap();
            assert_eq!(volume, format!("pgdata-{}", name));
            assert!(descriptor.volumes.contains_key(volume));
            assert_eq!(service.networks, vec!["default"]);
        }
    }

    #[test]
    fn test_only_coordinator_publishes_port() {
        let spec = ClusterSpec::new(12345, 2).unwrap();
        let descriptor = builder().build(&spec).unwrap();

        let published: Vec<_> = descriptor.published_services().collect();
        assert_eq!(published.len(), 1);
        assert_eq!(published[0].0, "coordinator");
        assert_eq!(published[0].1.ports, vec!["12345:12345"]);
    }

    #[test]
    fn test_service_contents() {
        let spec = ClusterSpec::new(12345, 1).unwrap();
        let descriptor = builder().build(&spec).unwrap();

        let segment = &descriptor.services["primary-0"];
        assert_eq!(segment.image, "dbfarmer:gpdb");
        assert_eq!(segment.volumes, vec!["pgdata-primary-0:/home/gpadmin/pgdata"]);
        assert_eq!(
            segment.environment,
            vec![
                "CLUSTER_DBID=2",
                "CLUSTER_CONTENTID=0",
                "CLUSTER_NUM_SEGMENTS=1",
                "PGPORT=12346",
                "CLUSTER_COORDINATOR_HOST=coordinator",
                "CLUSTER_COORDINATOR_PORT=12345",
            ]
        );
        assert_eq!(descriptor.name, "dbfarmer-for-gpdb");
        assert_eq!(descriptor.version, "3");
    }

    #[test]
    fn test_build_is_reproducible() {
        let spec = ClusterSpec::new(12345, 2).unwrap();
        assert_eq!(
            builder().build(&spec).unwrap().to_yaml().unwrap(),
            builder().build(&spec).unwrap().to_yaml().unwrap()
        );
    }

    #[test]
    fn test_invalid_input() {
        let spec = ClusterSpec {
            base_port: 12345,
            segment_count: -2,
        };
        assert!(builder().build(&spec).is_err());

        let empty_image =
            ContainerDescriptorBuilder::new(ComposeConfig::builder().image("").build());
        assert!(empty_image
            .build(&ClusterSpec::new(12345, 1).unwrap())
            .is_err());
    }
}
