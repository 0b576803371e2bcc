//! Farm configuration.
//!
//! Settings come from built-in defaults, an optional TOML file, and CLI
//! arguments, in increasing order of precedence.

use std::path::{Path, PathBuf};

use dbfarmer_orchestrator::command::{CommandRunner, CommandSpec, RetryPolicy, SystemCommandRunner};
use dbfarmer_orchestrator::compose::ComposeConfig;
use dbfarmer_orchestrator::health::ReadinessPolicy;
use dbfarmer_orchestrator::process::Signal;
use serde::{Deserialize, Serialize};

use crate::{BackendCommand, CliArgs, ContainerAction, LocalAction, UpArgs};

/// Farm configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct FarmConfig {
    /// Filesystem locations.
    pub paths: PathsConfig,

    /// Cluster shape defaults.
    pub cluster: ClusterConfig,

    /// Local backend settings.
    pub local: LocalConfig,

    /// Container backend settings.
    pub container: ContainerConfig,

    /// Readiness check settings.
    pub health: HealthConfig,

    /// Logging configuration.
    pub logging: LoggingConfig,
}

/// Filesystem locations; unset entries are derived from the repository root.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct PathsConfig {
    /// Repository root. Defaults to `git rev-parse --show-toplevel`.
    pub root_dir: Option<PathBuf>,

    /// Entrypoint, dockerfile and compose file directory. Defaults to
    /// `<root_dir>/container`.
    pub work_dir: Option<PathBuf>,

    /// Local node data. Defaults to `<root_dir>/pgdata`.
    pub data_root: Option<PathBuf>,
}

/// Cluster shape defaults.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ClusterConfig {
    /// Coordinator port; segments use the following ports.
    pub port: u16,

    /// Number of segments.
    pub num_segments: i32,
}

impl Default for ClusterConfig {
    fn default() -> Self {
        Self {
            port: 12345,
            num_segments: 1,
        }
    }
}

/// Local backend settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LocalConfig {
    /// Coordinator host. Defaults to this machine's hostname.
    pub coordinator_host: Option<String>,

    /// Whether `up` runs `make -C <root_dir>/src install` first.
    pub install_extension: bool,

    /// Signal sent to nodes on `down`.
    pub signal: String,
}

impl Default for LocalConfig {
    fn default() -> Self {
        Self {
            coordinator_host: None,
            install_extension: true,
            signal: "TERM".to_string(),
        }
    }
}

/// Container backend settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ContainerConfig {
    /// Image every node runs.
    pub image: String,

    /// Compose project name.
    pub project_name: String,

    /// User the image is built for. Defaults to `$USER`.
    pub user: Option<String>,

    /// Host the readiness check connects to. Defaults to this machine's
    /// hostname.
    pub health_address: Option<String>,
}

impl Default for ContainerConfig {
    fn default() -> Self {
        let compose = ComposeConfig::default();
        Self {
            image: compose.image,
            project_name: compose.project_name,
            user: None,
            health_address: None,
        }
    }
}

/// Readiness check settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct HealthConfig {
    /// Seconds between attempts.
    pub retry_interval_secs: u64,

    /// What counts as ready (`all-nodes` or `query-succeeds`).
    pub policy: ReadinessPolicy,
}

impl Default for HealthConfig {
    fn default() -> Self {
        Self {
            retry_interval_secs: 1,
            policy: ReadinessPolicy::default(),
        }
    }
}

/// Logging configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Log level (trace, debug, info, warn, error).
    pub level: String,

    /// Log format (pretty, json, compact).
    pub format: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            format: "compact".to_string(),
        }
    }
}

/// Directories with every default applied.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolvedPaths {
    pub root_dir: PathBuf,
    pub work_dir: PathBuf,
    pub data_root: PathBuf,
}

impl FarmConfig {
    /// Loads configuration from a file.
    pub fn from_file(path: &Path) -> anyhow::Result<Self> {
        let content = std::fs::read_to_string(path)?;
        let config: Self = toml::from_str(&content)?;
        Ok(config)
    }

    /// Merges CLI arguments into the configuration.
    pub fn merge_cli_args(&mut self, args: &CliArgs) {
        if let Some(ref level) = args.log_level {
            self.logging.level = level.clone();
        }

        let up = match &args.backend {
            Some(BackendCommand::Local {
                action: LocalAction::Up(up),
            })
            | Some(BackendCommand::Container {
                action: ContainerAction::Up(up),
            }) => up,
            _ => return,
        };
        self.merge_up_args(up);
    }

    fn merge_up_args(&mut self, up: &UpArgs) {
        if let Some(port) = up.port {
            self.cluster.port = port;
        }
        if let Some(num_segments) = up.num_segments {
            self.cluster.num_segments = num_segments;
        }
    }

    /// Validates the configuration.
    ///
    /// The cluster shape is validated separately, when the operation is
    /// built, so that a bad segment count is reported as such.
    pub fn validate(&self) -> anyhow::Result<()> {
        let valid_levels = ["trace", "debug", "info", "warn", "error"];
        if !valid_levels.contains(&self.logging.level.to_lowercase().as_str()) {
            anyhow::bail!("Invalid log level: {}", self.logging.level);
        }

        let valid_formats = ["pretty", "json", "compact"];
        if !valid_formats.contains(&self.logging.format.to_lowercase().as_str()) {
            anyhow::bail!("Invalid log format: {}", self.logging.format);
        }

        self.signal()?;

        if self.container.image.is_empty() {
            anyhow::bail!("Container image must not be empty");
        }

        Ok(())
    }

    /// Returns the configured termination signal.
    pub fn signal(&self) -> anyhow::Result<Signal> {
        Ok(self.local.signal.parse::<Signal>()?)
    }

    /// Fills in unset directories. The repository root is asked from git
    /// only when it is not configured.
    pub async fn resolve_paths(&self) -> anyhow::Result<ResolvedPaths> {
        let root_dir = match &self.paths.root_dir {
            Some(root) => root.clone(),
            None => repository_root().await?,
        };

        Ok(ResolvedPaths {
            work_dir: self
                .paths
                .work_dir
                .clone()
                .unwrap_or_else(|| root_dir.join("container")),
            data_root: self
                .paths
                .data_root
                .clone()
                .unwrap_or_else(|| root_dir.join("pgdata")),
            root_dir,
        })
    }

    /// Returns the coordinator host for the local backend.
    pub fn coordinator_host(&self) -> String {
        self.local.coordinator_host.clone().unwrap_or_else(local_hostname)
    }

    /// Returns the health check host for the container backend.
    pub fn health_address(&self) -> String {
        self.container.health_address.clone().unwrap_or_else(local_hostname)
    }

    /// Returns the container user.
    pub fn container_user(&self) -> String {
        self.container
            .user
            .clone()
            .or_else(|| std::env::var("USER").ok())
            .or_else(|| std::env::var("USERNAME").ok())
            .unwrap_or_else(|| "gpadmin".to_string())
    }
}

/// Runs `git rev-parse --show-toplevel`. Always executed, even in dry-run
/// mode, because every other path depends on it.
async fn repository_root() -> anyhow::Result<PathBuf> {
    let output = SystemCommandRunner::new()
        .run(
            &CommandSpec::new("git").args(["rev-parse", "--show-toplevel"]),
            RetryPolicy::Never,
        )
        .await
        .map_err(|e| anyhow::anyhow!("Failed to locate the repository root: {}", e))?;
    Ok(PathBuf::from(output.stdout.trim()))
}

fn local_hostname() -> String {
    hostname::get()
        .map(|h| h.to_string_lossy().to_string())
        .unwrap_or_else(|_| "localhost".to_string())
}
