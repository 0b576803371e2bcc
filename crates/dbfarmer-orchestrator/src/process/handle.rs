use std::path::{Path, PathBuf};

use tokio::process::Child;

use crate::topology::NodeConfig;

/// A node process started by the supervisor.
///
/// Dropping the handle does not stop the process; nodes outlive the
/// invocation that started them and are stopped through their lock files.
#[derive(Debug)]
pub struct ProcessHandle {
    node: NodeConfig,
    log_path: PathBuf,
    child: Option<Child>,
}

impl ProcessHandle {
    pub(crate) fn new(node: NodeConfig, log_path: PathBuf, child: Option<Child>) -> Self {
        Self {
            node,
            log_path,
            child,
        }
    }

    /// Returns the node this process serves.
    pub fn node(&self) -> &NodeConfig {
        &self.node
    }

    /// Returns the path of the startup log.
    pub fn log_path(&self) -> &Path {
        &self.log_path
    }

    /// Returns the OS process id, if a process was spawned and has not been
    /// reaped.
    pub fn pid(&self) -> Option<u32> {
        self.child.as_ref().and_then(Child::id)
    }

    /// Returns true if no process was spawned (dry run).
    pub fn is_dry_run(&self) -> bool {
        self.child.is_none()
    }

    /// Waits for the process to exit and returns its exit code.
    pub async fn wait(&mut self) -> std::io::Result<Option<i32>> {
        match self.child.as_mut() {
            Some(child) => Ok(child.wait().await?.code()),
            None => Ok(None),
        }
    }
}
