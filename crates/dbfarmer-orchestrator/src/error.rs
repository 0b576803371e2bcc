//! Error types for the orchestrator crate.
//!
//! This module provides error types for topology planning, command
//! execution, and cluster lifecycle operations.

use std::path::PathBuf;

use thiserror::Error;

use crate::process::TeardownReport;

/// Result type for orchestrator operations.
pub type Result<T> = std::result::Result<T, OrchestratorError>;

/// Errors that can occur during orchestration operations.
#[derive(Debug, Error)]
pub enum OrchestratorError {
    /// An external command exited with a non-zero status.
    #[error("command `{command}` failed ({status}): {output}")]
    Execution {
        /// The command line that was run.
        command: String,
        /// Exit status description.
        status: String,
        /// Captured combined stdout and stderr.
        output: String,
    },

    /// Invalid cluster or backend configuration.
    #[error("configuration error: {0}")]
    Configuration(String),

    /// A node process could not be launched.
    #[error("failed to start node {node} after {started} node(s) were started: {reason}")]
    NodeStart {
        /// Name of the node that failed.
        node: String,
        /// Number of sibling nodes already running.
        started: usize,
        /// The reason for the failure.
        reason: String,
    },

    /// A process lock file exists but could not be interpreted.
    #[error("invalid lock file {}: {reason}", path.display())]
    LockFile {
        /// Path of the lock file.
        path: PathBuf,
        /// The reason for the failure.
        reason: String,
    },

    /// Teardown visited every node but some could not be handled.
    #[error("teardown incomplete: {}", .0.failure_summary())]
    Teardown(Box<TeardownReport>),

    /// The requested operation is not available for this backend.
    #[error("operation not supported: {0}")]
    Unsupported(String),

    /// I/O error.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Serialization error.
    #[error("serialization error: {0}")]
    Serialization(String),
}

impl OrchestratorError {
    /// Creates an execution error.
    pub fn execution(
        command: impl Into<String>,
        status: impl Into<String>,
        output: impl Into<String>,
    ) -> Self {
        Self::Execution {
            command: command.into(),
            status: status.into(),
            output: output.into(),
        }
    }

    /// Creates a configuration error.
    pub fn configuration(reason: impl Into<String>) -> Self {
        Self::Configuration(reason.into())
    }

    /// Creates a node start error.
    pub fn node_start(node: impl Into<String>, started: usize, reason: impl Into<String>) -> Self {
        Self::NodeStart {
            node: node.into(),
            started,
            reason: reason.into(),
        }
    }

    /// Creates a lock file error.
    pub fn lock_file(path: impl Into<PathBuf>, reason: impl Into<String>) -> Self {
        Self::LockFile {
            path: path.into(),
            reason: reason.into(),
        }
    }

    /// Creates an unsupported operation error.
    pub fn unsupported(operation: impl Into<String>) -> Self {
        Self::Unsupported(operation.into())
    }

    /// Creates a serialization error.
    pub fn serialization(reason: impl Into<String>) -> Self {
        Self::Serialization(reason.into())
    }

    /// Returns true if retrying the same operation may succeed.
    ///
    /// Only a command that ran and exited non-zero qualifies. Spawn failures
    /// do not.
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::Execution { .. })
    }

    /// Returns the captured output of a failed command, if any.
    pub fn output(&self) -> Option<&str> {
        match self {
            Self::Execution { output, .. } => Some(output),
            _ => None,
        }
    }
}

impl From<serde_yaml::Error> for OrchestratorError {
    fn from(err: serde_yaml::Error) -> Self {
        Self::Serialization(err.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = OrchestratorError::execution("kill 42", "exit status: 1", "no such process");
        assert_eq!(
            err.to_string(),
            "command `kill 42` failed (exit status: 1): no such process"
        );

        let err = OrchestratorError::configuration("segment count must be >= 0");
        assert_eq!(
            err.to_string(),
            "configuration error: segment count must be >= 0"
        );
    }

    #[test]
    fn test_error_retryable() {
        assert!(OrchestratorError::execution("psql", "exit status: 2", "").is_retryable());
        assert!(!OrchestratorError::configuration("test").is_retryable());
        assert!(!OrchestratorError::unsupported("build").is_retryable());
        let missing = std::io::Error::new(std::io::ErrorKind::NotFound, "psql");
        assert!(!OrchestratorError::from(missing).is_retryable());
    }

    #[test]
    fn test_error_output() {
        let err = OrchestratorError::execution("psql", "exit status: 2", "connection refused");
        assert_eq!(err.output(), Some("connection refused"));
        assert_eq!(OrchestratorError::configuration("x").output(), None);
    }
}
