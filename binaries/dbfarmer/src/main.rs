//! dbfarmer - create and tear down coordinator/segment database clusters.
//!
//! # Usage
//!
//! ```bash
//! # Start a coordinator and two segments as local processes
//! dbfarmer local up --port 12345 --num-segments 2
//!
//! # Stop them and delete their data
//! dbfarmer local down --remove-data
//!
//! # Build the node image, then run the cluster under Docker Compose
//! dbfarmer container build --server-version 7.1.0
//! dbfarmer container up
//!
//! # Show what would run without running it
//! dbfarmer --dry-run container down --remove-data
//! ```

mod config;

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use clap::{Args, CommandFactory, Parser, Subcommand};
use config::{FarmConfig, ResolvedPaths};
use dbfarmer_orchestrator::backend::{
    BoxedBackend, ComposeBackend, ComposeBackendConfig, LocalBackend, LocalBackendConfig,
};
use dbfarmer_orchestrator::command::{CommandRunner, SystemCommandRunner};
use dbfarmer_orchestrator::compose::ComposeConfig;
use dbfarmer_orchestrator::health::{HealthChecker, PsqlProbe};
use dbfarmer_orchestrator::lifecycle::{ClusterLifecycle, Operation, Outcome, DEFAULT_SERVER_VERSION};
use dbfarmer_orchestrator::process::SupervisorConfig;
use dbfarmer_orchestrator::topology::ClusterSpec;
use tracing::{error, info, warn};
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

/// CLI arguments.
#[derive(Parser, Debug)]
#[command(
    name = "dbfarmer",
    about = "Define and manage database clusters on your localhost or in local containers",
    version,
    arg_required_else_help = true
)]
pub struct CliArgs {
    /// Print commands instead of running them.
    #[arg(long, global = true)]
    dry_run: bool,

    /// Path to the configuration file.
    #[arg(short, long, value_name = "FILE", global = true)]
    config: Option<PathBuf>,

    /// Log level (trace, debug, info, warn, error).
    #[arg(short, long, value_name = "LEVEL", global = true)]
    log_level: Option<String>,

    /// Enable JSON log output.
    #[arg(long, global = true)]
    json_logs: bool,

    /// Print the default configuration and exit.
    #[arg(long)]
    print_config: bool,

    #[command(subcommand)]
    backend: Option<BackendCommand>,
}

/// Where the cluster runs.
#[derive(Subcommand, Debug)]
pub enum BackendCommand {
    /// Manage database clusters running as processes on your localhost.
    Local {
        #[command(subcommand)]
        action: LocalAction,
    },

    /// Manage database clusters running in local containers.
    Container {
        #[command(subcommand)]
        action: ContainerAction,
    },
}

/// Operations on a local cluster.
#[derive(Subcommand, Debug)]
pub enum LocalAction {
    /// Create and start a database cluster.
    Up(UpArgs),

    /// Stop and remove a database cluster.
    Down(DownArgs),
}

/// Operations on a containerized cluster.
#[derive(Subcommand, Debug)]
pub enum ContainerAction {
    /// Create and start a database cluster.
    Up(UpArgs),

    /// Stop and remove a database cluster.
    Down(DownArgs),

    /// Build the container image for database clusters.
    Build(BuildArgs),
}

/// Arguments to `up`.
#[derive(Args, Debug)]
pub struct UpArgs {
    /// Port to connect to the cluster, also used as the coordinator's port
    /// [default: 12345].
    #[arg(long, value_name = "PORT")]
    port: Option<u16>,

    /// Number of segments in the cluster, using ports from (PORT + 1) to
    /// (PORT + NUM_SEGMENTS) [default: 1].
    #[arg(long, value_name = "N", allow_negative_numbers = true)]
    num_segments: Option<i32>,
}

/// Arguments to `down`.
#[derive(Args, Debug)]
pub struct DownArgs {
    /// Remove all data when removing the cluster (dangerous!).
    #[arg(long)]
    remove_data: bool,
}

/// Arguments to `build`.
#[derive(Args, Debug)]
pub struct BuildArgs {
    /// Version of the database server program.
    #[arg(long, value_name = "VERSION", default_value = DEFAULT_SERVER_VERSION)]
    server_version: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum BackendKind {
    Local,
    Container,
}

impl BackendCommand {
    /// Maps the command line onto a backend and an operation.
    fn resolve(&self, config: &FarmConfig) -> Result<(BackendKind, Operation)> {
        let up = || -> Result<Operation> {
            let spec = ClusterSpec::new(config.cluster.port, config.cluster.num_segments)
                .context("Invalid cluster shape")?;
            Ok(Operation::Up(spec))
        };

        let resolved = match self {
            Self::Local { action } => (
                BackendKind::Local,
                match action {
                    LocalAction::Up(_) => up()?,
                    LocalAction::Down(down) => Operation::Down {
                        remove_data: down.remove_data,
                    },
                },
            ),
            Self::Container { action } => (
                BackendKind::Container,
                match action {
                    ContainerAction::Up(_) => up()?,
                    ContainerAction::Down(down) => Operation::Down {
                        remove_data: down.remove_data,
                    },
                    ContainerAction::Build(build) => Operation::Build {
                        server_version: build.server_version.clone(),
                    },
                },
            ),
        };

        Ok(resolved)
    }
}

/// Assembles the backend for one invocation.
fn build_backend(
    kind: BackendKind,
    config: &FarmConfig,
    paths: &ResolvedPaths,
    runner: Arc<dyn CommandRunner>,
) -> Result<BoxedBackend> {
    let health = HealthChecker::new(Arc::new(PsqlProbe::new(runner.clone())))
        .with_policy(config.health.policy)
        .with_retry_interval(Duration::from_secs(config.health.retry_interval_secs));

    let backend: BoxedBackend = match kind {
        BackendKind::Local => {
            let mut local = LocalBackendConfig::builder().coordinator_host(config.coordinator_host());
            if config.local.install_extension {
                local = local.prepare(LocalBackendConfig::install_extension(&paths.root_dir));
            }
            let supervisor = SupervisorConfig::builder()
                .data_root(&paths.data_root)
                .entrypoint_script_in(&paths.work_dir)
                .signal(config.signal()?)
                .build();
            Box::new(LocalBackend::new(local.build(), supervisor, health, runner))
        }
        BackendKind::Container => {
            let user = config.container_user();
            let compose = ComposeConfig::builder()
                .image(&config.container.image)
                .project_name(&config.container.project_name)
                .user(&user)
                .build();
            let backend_config = ComposeBackendConfig::builder()
                .root_dir(&paths.root_dir)
                .work_dir(&paths.work_dir)
                .health_address(config.health_address())
                .user(user)
                .compose(compose)
                .build();
            Box::new(ComposeBackend::new(backend_config, health, runner))
        }
    };

    Ok(backend)
}

/// Prints the result of an operation for the user.
fn report(outcome: &Outcome, paths: &ResolvedPaths) {
    match outcome {
        Outcome::Deployed(deployment) => {
            if let Some(port) = deployment.coordinator_port() {
                println!(
                    "Cluster with {} node(s) is up, coordinator listening on port {}",
                    deployment.nodes.len(),
                    port
                );
            }
            if let Some(path) = &deployment.descriptor_path {
                println!("Compose file: {}", path.display());
            }
        }
        Outcome::TornDown(teardown) => {
            for lock in &teardown.stale {
                println!(
                    "Skipped stale lock file '{}' (pid {} is not running)",
                    lock.path.display(),
                    lock.pid
                );
            }
            if !teardown.stopped.is_empty() {
                println!("Stopped {} node(s)", teardown.stopped.len());
            }
            if teardown.data_removed {
                println!("Data directory '{}' removed", paths.data_root.display());
            }
        }
        Outcome::Built { server_version } => {
            println!("Built image for server version {}", server_version);
        }
    }
}

/// Initialize tracing/logging.
fn init_tracing(config: &config::LoggingConfig, json_logs: bool) -> Result<()> {
    let filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(&config.level))
        .context("Failed to parse log filter")?;

    let format = if json_logs || config.format == "json" {
        "json"
    } else {
        &config.format
    };

    match format {
        "json" => {
            tracing_subscriber::registry()
                .with(filter)
                .with(fmt::layer().json().with_writer(std::io::stderr))
                .try_init()
                .map_err(|e| anyhow::anyhow!("Failed to initialize tracing: {}", e))?;
        }
        "pretty" => {
            tracing_subscriber::registry()
                .with(filter)
                .with(fmt::layer().pretty().with_writer(std::io::stderr))
                .try_init()
                .map_err(|e| anyhow::anyhow!("Failed to initialize tracing: {}", e))?;
        }
        _ => {
            tracing_subscriber::registry()
                .with(filter)
                .with(fmt::layer().compact().with_writer(std::io::stderr))
                .try_init()
                .map_err(|e| anyhow::anyhow!("Failed to initialize tracing: {}", e))?;
        }
    }

    Ok(())
}

#[tokio::main(flavor = "current_thread")]
async fn main() -> Result<()> {
    let args = CliArgs::parse();

    if args.print_config {
        let config = FarmConfig::default();
        println!("{}", toml::to_string_pretty(&config)?);
        return Ok(());
    }

    let mut config = if let Some(ref config_path) = args.config {
        FarmConfig::from_file(config_path)
            .with_context(|| format!("Failed to load config from {:?}", config_path))?
    } else {
        FarmConfig::default()
    };

    config.merge_cli_args(&args);
    config.validate().context("Invalid configuration")?;

    init_tracing(&config.logging, args.json_logs)?;

    let Some(command) = args.backend.as_ref() else {
        CliArgs::command().print_help()?;
        anyhow::bail!("Subcommand is missing");
    };

    // The operation is validated before any command runs.
    let (kind, operation) = command.resolve(&config)?;
    let paths = config.resolve_paths().await?;

    info!(
        version = env!("CARGO_PKG_VERSION"),
        operation = %operation,
        dry_run = args.dry_run,
        root_dir = %paths.root_dir.display(),
        "dbfarmer starting"
    );

    let runner: Arc<dyn CommandRunner> = Arc::new(SystemCommandRunner::with_dry_run(args.dry_run));
    let lifecycle = ClusterLifecycle::new(build_backend(kind, &config, &paths, runner)?);

    tokio::select! {
        outcome = lifecycle.execute(operation) => {
            match outcome {
                Ok(outcome) => report(&outcome, &paths),
                Err(e) => {
                    error!(error = %e, "Operation failed");
                    return Err(e.into());
                }
            }
        }
        _ = tokio::signal::ctrl_c() => {
            warn!("Interrupted");
            anyhow::bail!("Interrupted");
        }
    }

    Ok(())
}
