//! Command runner backed by real operating-system processes.

use std::process::Stdio;

use async_trait::async_trait;
use tracing::{debug, info};

use super::runner::{CommandOutput, CommandRunner, CommandSpec};
use crate::error::{OrchestratorError, Result};

/// Runs commands with `tokio::process`.
///
/// With `dry_run` set, every command is printed as `Running <cmd>` and
/// reported as a successful empty result without being executed.
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemCommandRunner {
    dry_run: bool,
}

impl SystemCommandRunner {
    /// Creates a runner that executes commands.
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a runner that only prints commands.
    pub fn dry_run() -> Self {
        Self { dry_run: true }
    }

    /// Creates a runner with an explicit dry-run flag.
    pub fn with_dry_run(dry_run: bool) -> Self {
        Self { dry_run }
    }

    fn announce(command: &CommandSpec) {
        println!("Running {}", command);
        info!(command = %command, "Dry run, command skipped");
    }
}

#[async_trait]
impl CommandRunner for SystemCommandRunner {
    async fn run_once(&self, command: &CommandSpec) -> Result<CommandOutput> {
        if self.dry_run {
            Self::announce(command);
            return Ok(CommandOutput::default());
        }

        debug!(command = %command, "Running command");

        let output = command
            .to_command()
            .stdin(Stdio::null())
            .output()
            .await?;
        let result = CommandOutput::from_output(&output);

        if !output.status.success() {
            return Err(OrchestratorError::execution(
                command.to_string(),
                output.status.to_string(),
                result.combined_output(),
            ));
        }

        Ok(result)
    }

    async fn spawn_detached(&self, command: &CommandSpec) -> Result<Option<u32>> {
        if self.dry_run {
            Self::announce(command);
            return Ok(None);
        }

        let child = command.to_command().stdin(Stdio::null()).spawn()?;
        let pid = child.id();
        info!(command = %command, pid = ?pid, "Spawned detached command");

        // Dropping the handle leaves the process running.
        drop(child);
        Ok(pid)
    }

    fn is_dry_run(&self) -> bool {
        self.dry_run
    }
}
