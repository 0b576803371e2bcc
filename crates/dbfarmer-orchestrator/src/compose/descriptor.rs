//! Typed compose file records.

use std::collections::BTreeMap;
use std::path::Path;

use serde::{Deserialize, Serialize};
use tracing::info;

use crate::error::Result;

/// File name used for generated descriptors.
pub const COMPOSE_FILE_NAME: &str = "compose.yaml";

/// Desired state of a containerized cluster.
///
/// Serialized as a compose file only at the boundary, through
/// [`to_yaml`](Self::to_yaml) or [`write_to`](Self::write_to).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ContainerDescriptor {
    /// Compose file format version.
    pub version: String,

    /// Compose project name.
    pub name: String,

    /// Networks; a cluster uses the single `default` network.
    pub networks: BTreeMap<String, Option<ComposeNetwork>>,

    /// Named volumes, one per node.
    pub volumes: BTreeMap<String, Option<ComposeVolume>>,

    /// Services, one per node.
    pub services: BTreeMap<String, ComposeService>,
}

impl ContainerDescriptor {
    /// Serializes the descriptor to compose YAML.
    pub fn to_yaml(&self) -> Result<String> {
        Ok(serde_yaml::to_string(self)?)
    }

    /// Parses a descriptor from compose YAML.
    pub fn from_yaml(yaml: &str) -> Result<Self> {
        Ok(serde_yaml::from_str(yaml)?)
    }

    /// Writes the descriptor to `path`, creating parent directories.
    pub async fn write_to(&self, path: &Path) -> Result<()> {
        let yaml = self.to_yaml()?;
        if let Some(parent) = path.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }
        tokio::fs::write(path, yaml).await?;
        info!(path = %path.display(), services = self.services.len(), "Wrote compose file");
        Ok(())
    }

    /// Returns the services that publish ports to the host.
    pub fn published_services(&self) -> impl Iterator<Item = (&str, &ComposeService)> {
        self.services
            .iter()
            .filter(|(_, s)| !s.ports.is_empty())
            .map(|(name, s)| (name.as_str(), s))
    }
}

/// One node's container.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ComposeService {
    /// Image reference.
    pub image: String,

    /// `KEY=VALUE` environment entries.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub environment: Vec<String>,

    /// `volume:path` mounts.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub volumes: Vec<String>,

    /// Networks the container joins.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub networks: Vec<String>,

    /// `host:container` port publications.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub ports: Vec<String>,
}

/// A named volume with default settings.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ComposeVolume {
    /// Volume driver; the runtime default when unset.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub driver: Option<String>,
}

/// A network with default settings.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ComposeNetwork {
    /// Network driver; the runtime default when unset.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub driver: Option<String>,
}
