//! Backend that runs every node as a process on this machine.

use std::path::Path;
use std::sync::Arc;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tracing::info;

use crate::backend::r#trait::{BackendCapabilities, ClusterBackend, Deployment};
use crate::command::{CommandRunner, CommandSpec, RetryPolicy};
use crate::error::Result;
use crate::health::HealthChecker;
use crate::process::{ProcessSupervisor, SupervisorConfig, TeardownReport};
use crate::topology::{plan, ClusterSpec, PlanContext};

/// Configuration for the local backend.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LocalBackendConfig {
    /// Host name nodes and the health check use to reach the coordinator.
    pub coordinator_host: String,

    /// Commands run before any node starts.
    pub prepare: Vec<CommandSpec>,
}

impl Default for LocalBackendConfig {
    fn default() -> Self {
        Self {
            coordinator_host: "localhost".to_string(),
            prepare: Vec::new(),
        }
    }
}

impl LocalBackendConfig {
    /// Creates a new configuration builder.
    pub fn builder() -> LocalBackendConfigBuilder {
        LocalBackendConfigBuilder::default()
    }

    /// Returns `make -C <root_dir>/src install`, which installs the
    /// node-side extension.
    pub fn install_extension(root_dir: &Path) -> CommandSpec {
        CommandSpec::new("make")
            .arg("-C")
            .arg(root_dir.join("src"))
            .arg("install")
    }
}

/// Builder for `LocalBackendConfig`.
#[derive(Debug, Default)]
pub struct LocalBackendConfigBuilder {
    config: LocalBackendConfig,
}

impl LocalBackendConfigBuilder {
    /// Sets the coordinator host.
    pub fn coordinator_host(mut self, host: impl Into<String>) -> Self {
        self.config.coordinator_host = host.into();
        self
    }

    /// Adds a preparation command.
    pub fn prepare(mut self, command: CommandSpec) -> Self {
        self.config.prepare.push(command);
        self
    }

    /// Builds the configuration.
    pub fn build(self) -> LocalBackendConfig {
        self.config
    }
}

/// Local process backend.
pub struct LocalBackend {
    config: LocalBackendConfig,
    supervisor: ProcessSupervisor,
    health: HealthChecker,
    runner: Arc<dyn CommandRunner>,
}

impl LocalBackend {
    /// Creates a local backend.
    pub fn new(
        config: LocalBackendConfig,
        supervisor: SupervisorConfig,
        health: HealthChecker,
        runner: Arc<dyn CommandRunner>,
    ) -> Self {
        Self {
            config,
            supervisor: ProcessSupervisor::new(supervisor, runner.clone()),
            health,
            runner,
        }
    }

    /// Returns the process supervisor.
    pub fn supervisor(&self) -> &ProcessSupervisor {
        &self.supervisor
    }
}

#[async_trait]
impl ClusterBackend for LocalBackend {
    async fn up(&self, spec: &ClusterSpec) -> Result<Deployment> {
        let context = PlanContext::new(&self.config.coordinator_host);
        let nodes = plan(spec, &context)?;

        for command in &self.config.prepare {
            self.runner.run(command, RetryPolicy::Never).await?;
        }

        let handles = self.supervisor.start_nodes(&nodes).await?;
        let pids = handles.iter().filter_map(|h| h.pid()).collect();

        let health = self
            .health
            .wait_until_ready(&self.config.coordinator_host, spec.base_port, &spec.content_ids())
            .await?;

        info!(
            backend = self.name(),
            nodes = nodes.len(),
            port = spec.base_port,
            "Cluster is up"
        );

        Ok(Deployment {
            backend: self.name().to_string(),
            nodes,
            pids,
            descriptor_path: None,
            health,
        })
    }

    async fn down(&self, remove_data: bool) -> Result<TeardownReport> {
        self.supervisor.teardown(remove_data).await
    }

    fn capabilities(&self) -> BackendCapabilities {
        BackendCapabilities {
            supports_build: false,
        }
    }

    fn name(&self) -> &str {
        "local"
    }
}
