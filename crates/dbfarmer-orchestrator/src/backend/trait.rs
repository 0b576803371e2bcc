//! Cluster backend trait definition.
//!
//! A backend realizes a planned cluster somewhere (local processes, a
//! container runtime) and tears it down again.

use std::path::PathBuf;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::error::{OrchestratorError, Result};
use crate::health::HealthReport;
use crate::process::TeardownReport;
use crate::topology::{ClusterSpec, NodeConfig};

/// Core trait for cluster backends.
///
/// # Lifecycle
///
/// 1. Optionally call `build()` to prepare images (container backends only)
/// 2. Call `up()` to start every node and wait for the cluster to be ready
/// 3. Call `down()` to stop the nodes, optionally deleting their data
///
/// `up` and `down` are independent invocations: nothing is kept in memory
/// between them, only on-disk node state and generated files.
#[async_trait]
pub trait ClusterBackend: Send + Sync {
    /// Starts a cluster and waits until it is ready.
    ///
    /// # Errors
    ///
    /// Returns an error if the cluster shape is invalid, a preparation command fails,
    /// or a node cannot be launched. Nodes already launched keep running.
    async fn up(&self, spec: &ClusterSpec) -> Result<Deployment>;

    /// Stops the cluster; with `remove_data` its persisted data is deleted.
    ///
    /// Stopping a cluster that is not running succeeds.
    async fn down(&self, remove_data: bool) -> Result<TeardownReport>;

    /// Builds the image nodes run from.
    ///
    /// Default implementation returns an error if not supported.
    async fn build(&self, server_version: &str) -> Result<()> {
        let _ = server_version;
        Err(OrchestratorError::unsupported(format!(
            "build is not available for the {} backend",
            self.name()
        )))
    }

    /// Returns the capabilities of this backend.
    fn capabilities(&self) -> BackendCapabilities;

    /// Returns the name of this backend.
    fn name(&self) -> &str;
}

/// Capabilities supported by a backend.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct BackendCapabilities {
    /// Whether the backend can build node images.
    pub supports_build: bool,
}

/// Summary of a started cluster.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Deployment {
    /// Name of the backend that started the cluster.
    pub backend: String,

    /// Planned nodes, coordinator first.
    pub nodes: Vec<NodeConfig>,

    /// Process ids of locally launched nodes.
    pub pids: Vec<u32>,

    /// Path of the generated compose file, for container backends.
    pub descriptor_path: Option<PathBuf>,

    /// Outcome of the readiness wait.
    pub health: HealthReport,
}

impl Deployment {
    /// Returns the coordinator's port.
    pub fn coordinator_port(&self) -> Option<u16> {
        self.nodes
            .iter()
            .find(|n| n.role.is_coordinator())
            .map(|n| n.port)
    }
}

/// A boxed backend for dynamic dispatch.
pub type BoxedBackend = Box<dyn ClusterBackend>;
