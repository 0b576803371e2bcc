//! Local node process supervision.

use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tracing::{debug, error, info, warn};

use crate::command::{CommandRunner, CommandSpec, RetryPolicy};
use crate::error::{OrchestratorError, Result};
use crate::process::handle::ProcessHandle;
use crate::process::lock::{find_lock_files, read_lock_file, LockFile};
use crate::process::signal::Signal;
use crate::topology::{env_keys, plan, ClusterSpec, NodeConfig, NodeEnvironment, PlanContext};

/// Configuration for the process supervisor.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SupervisorConfig {
    /// Directory holding one data directory per node.
    pub data_root: PathBuf,

    /// Directory for startup logs; `<data_root>/log` when unset.
    pub log_dir: Option<PathBuf>,

    /// Command that bootstraps and runs one node.
    pub entrypoint: CommandSpec,

    /// Name of the lock file a running node keeps in its data directory.
    pub lock_file_name: String,

    /// Signal sent to stop a node.
    pub signal: Signal,
}

impl Default for SupervisorConfig {
    fn default() -> Self {
        Self {
            data_root: PathBuf::from("pgdata"),
            log_dir: None,
            entrypoint: CommandSpec::new("bash").arg("entrypoint.sh"),
            lock_file_name: "postmaster.pid".to_string(),
            signal: Signal::default(),
        }
    }
}

impl SupervisorConfig {
    /// Creates a new configuration builder.
    pub fn builder() -> SupervisorConfigBuilder {
        SupervisorConfigBuilder::default()
    }

    /// Returns the directory for startup logs.
    pub fn log_dir(&self) -> PathBuf {
        self.log_dir
            .clone()
            .unwrap_or_else(|| self.data_root.join("log"))
    }

    /// Returns the data directory of a node.
    pub fn data_dir(&self, node: &NodeConfig) -> PathBuf {
        self.data_root.join(node.role.data_dir_name())
    }

    /// Returns the startup log path of a node.
    pub fn log_path(&self, node: &NodeConfig) -> PathBuf {
        self.log_dir()
            .join(format!("startup_{}.log", node.content_id()))
    }
}

/// Builder for `SupervisorConfig`.
#[derive(Debug, Default)]
pub struct SupervisorConfigBuilder {
    config: SupervisorConfig,
}

impl SupervisorConfigBuilder {
    /// Sets the data root.
    pub fn data_root(mut self, path: impl Into<PathBuf>) -> Self {
        self.config.data_root = path.into();
        self
    }

    /// Sets the log directory.
    pub fn log_dir(mut self, path: impl Into<PathBuf>) -> Self {
        self.config.log_dir = Some(path.into());
        self
    }

    /// Sets the entrypoint command.
    pub fn entrypoint(mut self, command: CommandSpec) -> Self {
        self.config.entrypoint = command;
        self
    }

    /// Uses `bash <work_dir>/entrypoint.sh` as the entrypoint.
    pub fn entrypoint_script_in(mut self, work_dir: impl AsRef<Path>) -> Self {
        self.config.entrypoint =
            CommandSpec::new("bash").arg(work_dir.as_ref().join("entrypoint.sh"));
        self
    }

    /// Sets the lock file name.
    pub fn lock_file_name(mut self, name: impl Into<String>) -> Self {
        self.config.lock_file_name = name.into();
        self
    }

    /// Sets the termination signal.
    pub fn signal(mut self, signal: Signal) -> Self {
        self.config.signal = signal;
        self
    }

    /// Builds the configuration.
    pub fn build(self) -> SupervisorConfig {
        self.config
    }
}

/// Outcome of a teardown.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TeardownReport {
    /// Lock files whose process was signalled.
    pub stopped: Vec<LockFile>,

    /// Lock files whose process no longer exists.
    pub stale: Vec<LockFile>,

    /// Whether the data root was removed.
    pub data_removed: bool,

    /// Lock files or directories that could not be handled, with the reason.
    pub failed: Vec<(PathBuf, String)>,
}

impl TeardownReport {
    /// Returns the pids that were signalled.
    pub fn stopped_pids(&self) -> Vec<u32> {
        self.stopped.iter().map(|l| l.pid).collect()
    }

    /// Renders the failures as `path: reason` pairs.
    pub fn failure_summary(&self) -> String {
        self.failed
            .iter()
            .map(|(path, reason)| format!("{}: {}", path.display(), reason))
            .collect::<Vec<_>>()
            .join("; ")
    }
}

/// Starts and stops node processes on the local machine.
pub struct ProcessSupervisor {
    config: SupervisorConfig,
    runner: Arc<dyn CommandRunner>,
}

impl ProcessSupervisor {
    /// Creates a supervisor.
    pub fn new(config: SupervisorConfig, runner: Arc<dyn CommandRunner>) -> Self {
        Self { config, runner }
    }

    /// Returns the configuration.
    pub fn config(&self) -> &SupervisorConfig {
        &self.config
    }

    /// Returns the environment a node process receives on top of the
    /// inherited one.
    pub fn node_environment(&self, node: &NodeConfig) -> NodeEnvironment {
        node.environment().with(
            env_keys::DATA_DIR,
            self.config.data_dir(node).display().to_string(),
        )
    }

    /// Launches the entrypoint for one node.
    ///
    /// Output goes to `startup_<content_id>.log`, truncated first. Returns
    /// without waiting for the node to accept connections.
    pub async fn start_node(&self, node: &NodeConfig) -> Result<ProcessHandle> {
        let log_path = self.config.log_path(node);
        let env = self.node_environment(node);
        let entrypoint = &self.config.entrypoint;

        debug!(node = %node.role, env = %env, "Node environment");

        if self.runner.is_dry_run() {
            self.runner.spawn_detached(entrypoint).await?;
            return Ok(ProcessHandle::new(node.clone(), log_path, None));
        }

        tokio::fs::create_dir_all(self.config.log_dir()).await?;
        let stdout = tokio::fs::File::create(&log_path).await?.into_std().await;
        let stderr = stdout.try_clone()?;

        let child = entrypoint
            .to_command()
            .envs(env.iter())
            .stdin(Stdio::null())
            .stdout(Stdio::from(stdout))
            .stderr(Stdio::from(stderr))
            .spawn()?;

        info!(
            node = %node.role,
            pid = ?child.id(),
            port = node.port,
            log = %log_path.display(),
            "Started node"
        );

        Ok(ProcessHandle::new(node.clone(), log_path, Some(child)))
    }

    /// Plans the cluster and starts every node, coordinator first.
    ///
    /// Stops at the first launch failure. Nodes started before the failure
    /// keep running; the error records how many there were.
    pub async fn start_cluster(
        &self,
        spec: &ClusterSpec,
        context: &PlanContext,
    ) -> Result<Vec<ProcessHandle>> {
        let nodes = plan(spec, context)?;
        self.start_nodes(&nodes).await
    }

    /// Starts already planned nodes in order, with the same failure
    /// semantics as [`start_cluster`](Self::start_cluster).
    pub async fn start_nodes(&self, nodes: &[NodeConfig]) -> Result<Vec<ProcessHandle>> {
        let mut handles = Vec::with_capacity(nodes.len());

        for node in nodes {
            match self.start_node(node).await {
                Ok(handle) => handles.push(handle),
                Err(e) => {
                    error!(
                        node = %node.role,
                        started = handles.len(),
                        error = %e,
                        "Failed to start node"
                    );
                    return Err(OrchestratorError::node_start(
                        node.name(),
                        handles.len(),
                        e.to_string(),
                    ));
                }
            }
        }

        info!(nodes = handles.len(), "Cluster processes started");
        Ok(handles)
    }

    /// Signals every node that holds a lock file under the data root and
    /// optionally removes the data root.
    ///
    /// Every lock file is visited even when an earlier one fails. Lock files
    /// whose process is gone, or exits before the signal lands, are reported
    /// as stale and left in place. Unreadable lock files and failed commands
    /// are collected, and once all nodes and the data removal were tried they
    /// are returned together as [`OrchestratorError::Teardown`]. Running this
    /// twice is safe.
    pub async fn teardown(&self, remove_data: bool) -> Result<TeardownReport> {
        let data_root = &self.config.data_root;
        let mut report = TeardownReport::default();

        info!(data_root = %data_root.display(), remove_data, "Tearing down local cluster");

        for path in find_lock_files(data_root, &self.config.lock_file_name).await? {
            let lock = match read_lock_file(&path).await {
                Ok(lock) => lock,
                Err(e) => {
                    warn!(lock_file = %path.display(), error = %e, "Unreadable lock file");
                    report.failed.push((path, e.to_string()));
                    continue;
                }
            };

            let stopped = self.stop(&lock).await;
            match stopped {
                Ok(true) => report.stopped.push(lock),
                Ok(false) => {
                    warn!(
                        lock_file = %lock.path.display(),
                        pid = lock.pid,
                        "Skipping stale lock file"
                    );
                    report.stale.push(lock);
                }
                Err(e) => {
                    error!(pid = lock.pid, error = %e, "Failed to stop node");
                    report.failed.push((lock.path, e.to_string()));
                }
            }
        }

        if remove_data {
            let remove = CommandSpec::new("rm").arg("-rf").arg(data_root);
            match self.runner.run(&remove, RetryPolicy::Never).await {
                Ok(_) => {
                    info!(data_root = %data_root.display(), "Data directory removed");
                    report.data_removed = true;
                }
                Err(e) => {
                    error!(data_root = %data_root.display(), error = %e, "Failed to remove data");
                    report.failed.push((data_root.clone(), e.to_string()));
                }
            }
        }

        if report.failed.is_empty() {
            Ok(report)
        } else {
            Err(OrchestratorError::Teardown(Box::new(report)))
        }
    }

    /// Signals the node behind a lock file. Returns false if the process no
    /// longer exists.
    async fn stop(&self, lock: &LockFile) -> Result<bool> {
        if !self.is_alive(lock.pid).await? {
            return Ok(false);
        }

        match self
            .runner
            .run(&self.config.signal.kill_command(lock.pid), RetryPolicy::Never)
            .await
        {
            Ok(_) => {
                info!(pid = lock.pid, signal = %self.config.signal, "Signalled node");
                Ok(true)
            }
            // exited between the probe and the signal
            Err(OrchestratorError::Execution { .. }) => Ok(false),
            Err(e) => Err(e),
        }
    }

    async fn is_alive(&self, pid: u32) -> Result<bool> {
        match self
            .runner
            .run(&Signal::probe_command(pid), RetryPolicy::Never)
            .await
        {
            Ok(_) => Ok(true),
            Err(OrchestratorError::Execution { .. }) => Ok(false),
            Err(e) => Err(e),
        }
    }
}
