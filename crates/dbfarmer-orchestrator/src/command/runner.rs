//! Command runner trait and supporting types.

use std::fmt;
use std::path::PathBuf;
use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::error::Result;

/// An external command: program, arguments and optional working directory.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CommandSpec {
    program: String,
    args: Vec<String>,
    current_dir: Option<PathBuf>,
}

impl CommandSpec {
    /// Creates a command for the given program with no arguments.
    pub fn new(program: impl Into<String>) -> Self {
        Self {
            program: program.into(),
            args: Vec::new(),
            current_dir: None,
        }
    }

    /// Appends one argument.
    pub fn arg(mut self, arg: impl AsRef<std::ffi::OsStr>) -> Self {
        self.args.push(arg.as_ref().to_string_lossy().into_owned());
        self
    }

    /// Appends several arguments.
    pub fn args<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<std::ffi::OsStr>,
    {
        self.args
            .extend(args.into_iter().map(|a| a.as_ref().to_string_lossy().into_owned()));
        self
    }

    /// Sets the working directory.
    pub fn current_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.current_dir = Some(dir.into());
        self
    }

    /// Returns the program name.
    pub fn program(&self) -> &str {
        &self.program
    }

    /// Returns the arguments.
    pub fn get_args(&self) -> &[String] {
        &self.args
    }

    /// Builds a `tokio::process::Command` for this spec.
    pub fn to_command(&self) -> tokio::process::Command {
        let mut cmd = tokio::process::Command::new(&self.program);
        cmd.args(&self.args);
        if let Some(dir) = &self.current_dir {
            cmd.current_dir(dir);
        }
        cmd
    }
}

impl fmt::Display for CommandSpec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.program)?;
        for arg in &self.args {
            write!(f, " {}", arg)?;
        }
        Ok(())
    }
}

/// Output from a completed command.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CommandOutput {
    /// Standard output from the command.
    pub stdout: String,

    /// Standard error from the command.
    pub stderr: String,

    /// Exit code of the command (-1 if terminated by a signal).
    pub exit_code: i32,
}

impl CommandOutput {
    /// Creates a new command output.
    pub fn new(stdout: impl Into<String>, stderr: impl Into<String>, exit_code: i32) -> Self {
        Self {
            stdout: stdout.into(),
            stderr: stderr.into(),
            exit_code,
        }
    }

    /// Converts a `std::process::Output`.
    pub fn from_output(output: &std::process::Output) -> Self {
        Self {
            stdout: String::from_utf8_lossy(&output.stdout).into_owned(),
            stderr: String::from_utf8_lossy(&output.stderr).into_owned(),
            exit_code: output.status.code().unwrap_or(-1),
        }
    }

    /// Returns true if the command succeeded (exit code 0).
    pub fn success(&self) -> bool {
        self.exit_code == 0
    }

    /// Returns the combined stdout and stderr.
    pub fn combined_output(&self) -> String {
        if self.stderr.is_empty() {
            self.stdout.clone()
        } else if self.stdout.is_empty() {
            self.stderr.clone()
        } else {
            format!("{}\n{}", self.stdout, self.stderr)
        }
    }
}

/// Retry behaviour for a command that fails with a non-zero exit status.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum RetryPolicy {
    /// Surface the first failure to the caller.
    #[default]
    Never,

    /// Sleep for the interval and retry, with no upper bound on attempts.
    Every(Duration),
}

impl RetryPolicy {
    /// Maps a retry interval in seconds; negative values disable retry.
    pub fn from_interval_secs(secs: i64) -> Self {
        if secs < 0 {
            Self::Never
        } else {
            Self::Every(Duration::from_secs(secs as u64))
        }
    }
}

/// Executes external commands.
///
/// Implementations supply [`run_once`](CommandRunner::run_once) and
/// [`spawn_detached`](CommandRunner::spawn_detached); the retry loop in
/// [`run`](CommandRunner::run) is shared. Only failures for which
/// [`OrchestratorError::is_retryable`](crate::error::OrchestratorError::is_retryable) holds are retried: a program that
/// cannot be spawned at all is reported immediately.
#[async_trait]
pub trait CommandRunner: Send + Sync {
    /// Runs the command once, capturing its output.
    ///
    /// A non-zero exit status is returned as [`OrchestratorError::Execution`](crate::error::OrchestratorError::Execution)
    /// carrying the combined output.
    async fn run_once(&self, command: &CommandSpec) -> Result<CommandOutput>;

    /// Starts a long-running command without waiting for it to exit.
    ///
    /// Returns the process id when one was started.
    async fn spawn_detached(&self, command: &CommandSpec) -> Result<Option<u32>>;

    /// Returns true if commands are only printed, never executed.
    fn is_dry_run(&self) -> bool {
        false
    }

    /// Runs the command according to the retry policy.
    async fn run(&self, command: &CommandSpec, retry: RetryPolicy) -> Result<CommandOutput> {
        loop {
            match self.run_once(command).await {
                Ok(output) => return Ok(output),
                Err(err) if err.is_retryable() => match retry {
                    RetryPolicy::Never => return Err(err),
                    RetryPolicy::Every(interval) => {
                        warn!(
                            command = %command,
                            retry_in = ?interval,
                            error = %err,
                            "Command failed, retrying"
                        );
                        tokio::time::sleep(interval).await;
                    }
                },
                Err(err) => return Err(err),
            }
        }
    }
}
