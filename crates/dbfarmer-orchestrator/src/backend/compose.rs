//! Docker Compose backend.
//!
//! Writes a compose file for the cluster and drives the `docker compose` CLI.
//! Container lifecycles belong to the container runtime; this backend only
//! shapes the desired state and waits for the coordinator to answer.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tracing::info;

use crate::backend::r#trait::{BackendCapabilities, ClusterBackend, Deployment};
use crate::command::{CommandRunner, CommandSpec, RetryPolicy};
use crate::compose::{ComposeConfig, ContainerDescriptorBuilder, COMPOSE_FILE_NAME};
use crate::error::{OrchestratorError, Result};
use crate::health::HealthChecker;
use crate::process::TeardownReport;
use crate::topology::{plan, ClusterSpec, PlanContext};

/// Server versions the image build knows how to package.
pub const SUPPORTED_SERVER_VERSIONS: &[&str] = &["7.1.0"];

const SOURCE_ARCHIVE_URL: &str = "https://codeload.github.com/greenplum-db/gpdb/tar.gz/refs/tags";

/// Configuration for the Docker Compose backend.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ComposeBackendConfig {
    /// Repository root; `<root_dir>/src` holds the extension sources.
    pub root_dir: PathBuf,

    /// Directory for the compose file, dockerfile and build context.
    pub work_dir: PathBuf,

    /// Host the health check connects to.
    pub health_address: String,

    /// User the image is built for.
    pub user: String,

    /// Service settings.
    pub compose: ComposeConfig,
}

impl Default for ComposeBackendConfig {
    fn default() -> Self {
        Self {
            root_dir: PathBuf::from("."),
            work_dir: PathBuf::from("container"),
            health_address: "localhost".to_string(),
            user: "gpadmin".to_string(),
            compose: ComposeConfig::default(),
        }
    }
}

impl ComposeBackendConfig {
    /// Creates a new configuration builder.
    pub fn builder() -> ComposeBackendConfigBuilder {
        ComposeBackendConfigBuilder::default()
    }

    /// Returns the compose file path.
    pub fn compose_file(&self) -> PathBuf {
        self.work_dir.join(COMPOSE_FILE_NAME)
    }
}

/// Builder for `ComposeBackendConfig`.
#[derive(Debug, Default)]
pub struct ComposeBackendConfigBuilder {
    config: ComposeBackendConfig,
}

impl ComposeBackendConfigBuilder {
    /// Sets the repository root.
    pub fn root_dir(mut self, path: impl Into<PathBuf>) -> Self {
        self.config.root_dir = path.into();
        self
    }

    /// Sets the working directory.
    pub fn work_dir(mut self, path: impl Into<PathBuf>) -> Self {
        self.config.work_dir = path.into();
        self
    }

    /// Sets the health check host.
    pub fn health_address(mut self, address: impl Into<String>) -> Self {
        self.config.health_address = address.into();
        self
    }

    /// Sets the image user.
    pub fn user(mut self, user: impl Into<String>) -> Self {
        self.config.user = user.into();
        self
    }

    /// Sets the service settings.
    pub fn compose(mut self, compose: ComposeConfig) -> Self {
        self.config.compose = compose;
        self
    }

    /// Builds the configuration.
    pub fn build(self) -> ComposeBackendConfig {
        self.config
    }
}

/// Docker Compose backend.
pub struct ComposeBackend {
    config: ComposeBackendConfig,
    descriptors: ContainerDescriptorBuilder,
    health: HealthChecker,
    runner: Arc<dyn CommandRunner>,
}

impl ComposeBackend {
    /// Creates a compose backend.
    pub fn new(
        config: ComposeBackendConfig,
        health: HealthChecker,
        runner: Arc<dyn CommandRunner>,
    ) -> Self {
        Self {
            descriptors: ContainerDescriptorBuilder::new(config.compose.clone()),
            config,
            health,
            runner,
        }
    }

    fn compose_command(&self, compose_file: &Path) -> CommandSpec {
        CommandSpec::new("docker")
            .args(["compose", "-f"])
            .arg(compose_file)
    }

    async fn run(&self, command: CommandSpec) -> Result<()> {
        self.runner.run(&command, RetryPolicy::Never).await?;
        Ok(())
    }

    /// Downloads the server sources (once), installs the extension and packs
    /// its sources into the build context.
    async fn prepare_sources(&self, server_version: &str) -> Result<()> {
        let work_dir = &self.config.work_dir;
        let src_dir = self.config.root_dir.join("src");

        let server_archive = work_dir.join(format!("gpdb_src-{}.tar.gz", server_version));
        if tokio::fs::try_exists(&server_archive).await? {
            info!(archive = %server_archive.display(), "Server sources already downloaded");
        } else {
            self.run(
                CommandSpec::new("curl")
                    .arg(format!("{}/{}", SOURCE_ARCHIVE_URL, server_version))
                    .arg("--output")
                    .arg(&server_archive),
            )
            .await?;
        }

        self.run(CommandSpec::new("make").arg("-C").arg(&src_dir).arg("install"))
            .await?;

        self.run(
            CommandSpec::new("tar")
                .arg("-czvf")
                .arg(work_dir.join("dbfarmer_src.tar.gz"))
                .arg("-C")
                .arg(&src_dir)
                .arg("."),
        )
        .await
    }
}

#[async_trait]
impl ClusterBackend for ComposeBackend {
    async fn up(&self, spec: &ClusterSpec) -> Result<Deployment> {
        let descriptor = self.descriptors.build(spec)?;
        let nodes = plan(spec, &PlanContext::container())?;
        let compose_file = self.config.compose_file();

        if self.runner.is_dry_run() {
            info!(path = %compose_file.display(), "Dry run, compose file not written");
        } else {
            descriptor.write_to(&compose_file).await?;
        }

        self.runner
            .spawn_detached(&self.compose_command(&compose_file).arg("up"))
            .await?;

        let health = self
            .health
            .wait_until_ready(&self.config.health_address, spec.base_port, &spec.content_ids())
            .await?;

        info!(
            backend = self.name(),
            project = %descriptor.name,
            services = descriptor.services.len(),
            "Cluster is up"
        );

        Ok(Deployment {
            backend: self.name().to_string(),
            nodes,
            pids: Vec::new(),
            descriptor_path: Some(compose_file),
            health,
        })
    }

    async fn down(&self, remove_data: bool) -> Result<TeardownReport> {
        let mut command = self
            .compose_command(&self.config.compose_file())
            .arg("down");
        if remove_data {
            command = command.arg("--volumes");
        }
        self.run(command).await?;

        Ok(TeardownReport {
            data_removed: remove_data,
            ..TeardownReport::default()
        })
    }

    async fn build(&self, server_version: &str) -> Result<()> {
        if !SUPPORTED_SERVER_VERSIONS.contains(&server_version) {
            return Err(OrchestratorError::configuration(format!(
                "server version {} is not supported (supported: {})",
                server_version,
                SUPPORTED_SERVER_VERSIONS.join(", ")
            )));
        }

        self.prepare_sources(server_version).await?;

        let work_dir = &self.config.work_dir;
        self.run(
            CommandSpec::new("docker")
                .arg("build")
                .arg("--build-arg")
                .arg(format!("user={}", self.config.user))
                .arg("--build-arg")
                .arg(format!("server_version={}", server_version))
                .arg("--tag")
                .arg(&self.config.compose.image)
                .arg("--file")
                .arg(work_dir.join("dockerfile"))
                .arg(work_dir),
        )
        .await?;

        info!(image = %self.config.compose.image, server_version, "Built image");
        Ok(())
    }

    fn capabilities(&self) -> BackendCapabilities {
        BackendCapabilities {
            supports_build: true,
        }
    }

    fn name(&self) -> &str {
        "container"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::command::{ScriptedResponse, ScriptedRunner};
    use crate::compose::ContainerDescriptor;
    use crate::health::PsqlProbe;

    fn backend(root: &Path, runner: Arc<ScriptedRunner>) -> ComposeBackend {
        let config = ComposeBackendConfig::builder()
            .root_dir(root)
            .work_dir(root.join("container"))
            .health_address("farm-host")
            .user("gpadmin")
            .build();
        let health = HealthChecker::new(Arc::new(PsqlProbe::new(runner.clone())));
        ComposeBackend::new(config, health, runner)
    }

    #[tokio::test]
    async fn test_up_writes_descriptor_and_starts_compose() {
        let root = tempfile::tempdir().unwrap();
        let runner = Arc::new(ScriptedRunner::with_responses([ScriptedResponse::success(
            "-1\n0\n1\n",
        )]));
        let backend = backend(root.path(), runner.clone());

        let deployment = backend.up(&ClusterSpec::new(12345, 2).unwrap()).await.unwrap();

        let compose_file = root.path().join("container/compose.yaml");
        assert_eq!(deployment.descriptor_path.as_deref(), Some(compose_file.as_path()));
        assert_eq!(deployment.health.attempts, 1);

        let yaml = std::fs::read_to_string(&compose_file).unwrap();
        let descriptor = ContainerDescriptor::from_yaml(&yaml).unwrap();
        assert_eq!(descriptor.services.len(), 3);

        let lines = runner.command_lines();
        assert_eq!(lines[0], format!("docker compose -f {} up", compose_file.display()));
        assert!(lines[1].starts_with("psql postgres -h farm-host -p 12345"));
    }

    #[tokio::test]
    async fn test_down_with_volumes() {
        let root = tempfile::tempdir().unwrap();
        let runner = Arc::new(ScriptedRunner::new());
        let backend = backend(root.path(), runner.clone());

        let report = backend.down(true).await.unwrap();
        assert!(report.data_removed);
        backend.down(false).await.unwrap();

        let file = root.path().join("container/compose.yaml");
        assert_eq!(
            runner.command_lines(),
            vec![
                format!("docker compose -f {} down --volumes", file.display()),
                format!("docker compose -f {} down", file.display()),
            ]
        );
    }

    #[tokio::test]
    async fn test_build_rejects_unknown_version() {
        let root = tempfile::tempdir().unwrap();
        let runner = Arc::new(ScriptedRunner::new());
        let backend = backend(root.path(), runner.clone());

        let err = backend.build("6.0.0").await.unwrap_err();
        assert!(matches!(err, OrchestratorError::Configuration(_)));
        assert!(runner.calls().is_empty());
    }

    #[tokio::test]
    async fn test_build_command_sequence() {
        let root = tempfile::tempdir().unwrap();
        let runner = Arc::new(ScriptedRunner::new());
        let backend = backend(root.path(), runner.clone());

        backend.build("7.1.0").await.unwrap();

        let work = root.path().join("container");
        let programs: Vec<_> = runner
            .calls()
            .iter()
            .map(|c| c.program().to_string())
            .collect();
        assert_eq!(programs, vec!["curl", "make", "tar", "docker"]);
        assert_eq!(
            runner.command_lines()[3],
            format!(
                "docker build --build-arg user=gpadmin --build-arg server_version=7.1.0 \
                 --tag dbfarmer:gpdb --file {} {}",
                work.join("dockerfile").display(),
                work.display()
            )
        );
    }

    #[tokio::test]
    async fn test_build_skips_existing_download() {
        let root = tempfile::tempdir().unwrap();
        let work = root.path().join("container");
        std::fs::create_dir_all(&work).unwrap();
        std::fs::write(work.join("gpdb_src-7.1.0.tar.gz"), b"cached").unwrap();
        let runner = Arc::new(ScriptedRunner::new());
        let backend = backend(root.path(), runner.clone());

        backend.build("7.1.0").await.unwrap();
        assert!(runner.calls().iter().all(|c| c.program() != "curl"));
    }
}
