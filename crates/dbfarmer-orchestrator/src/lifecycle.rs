//! Operation dispatch.
//!
//! The command line is reduced to one [`Operation`] at startup and handed to
//! [`ClusterLifecycle::execute`], which forwards it to the selected backend.

use std::fmt;

use serde::{Deserialize, Serialize};
use tracing::info;

use crate::backend::{BoxedBackend, ClusterBackend, Deployment};
use crate::error::Result;
use crate::process::TeardownReport;
use crate::topology::ClusterSpec;

/// Default server version for image builds.
pub const DEFAULT_SERVER_VERSION: &str = "7.1.0";

/// A lifecycle operation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum Operation {
    /// Create and start a cluster.
    Up(ClusterSpec),

    /// Stop a cluster.
    Down {
        /// Also delete the cluster's data.
        remove_data: bool,
    },

    /// Build the node image.
    Build {
        /// Server version to package.
        server_version: String,
    },
}

impl Operation {
    /// Returns the operation name.
    pub fn name(&self) -> &'static str {
        match self {
            Self::Up(_) => "up",
            Self::Down { .. } => "down",
            Self::Build { .. } => "build",
        }
    }
}

impl fmt::Display for Operation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// What an operation produced.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Outcome {
    /// The cluster was started.
    Deployed(Deployment),

    /// The cluster was stopped.
    TornDown(TeardownReport),

    /// The image was built.
    Built {
        /// Server version that was packaged.
        server_version: String,
    },
}

/// Runs operations against one backend.
pub struct ClusterLifecycle {
    backend: BoxedBackend,
}

impl ClusterLifecycle {
    /// Creates a lifecycle for the backend.
    pub fn new(backend: BoxedBackend) -> Self {
        Self { backend }
    }

    /// Returns the backend.
    pub fn backend(&self) -> &dyn ClusterBackend {
        self.backend.as_ref()
    }

    /// Executes one operation.
    pub async fn execute(&self, operation: Operation) -> Result<Outcome> {
        info!(backend = self.backend.name(), operation = %operation, "Executing operation");

        let outcome = match operation {
            Operation::Up(spec) => Outcome::Deployed(self.backend.up(&spec).await?),
            Operation::Down { remove_data } => {
                Outcome::TornDown(self.backend.down(remove_data).await?)
            }
            Operation::Build { server_version } => {
                self.backend.build(&server_version).await?;
                Outcome::Built { server_version }
            }
        };

        Ok(outcome)
    }
}

#[cfg(test)]
mod tests {
    use std::sync::{Arc, Mutex};

    use async_trait::async_trait;

    use super::*;
    use crate::backend::BackendCapabilities;
    use crate::error::OrchestratorError;
    use crate::health::HealthReport;
    use crate::topology::{plan, PlanContext};

    #[derive(Default)]
    struct RecordingBackend {
        seen: Arc<Mutex<Vec<String>>>,
    }

    #[async_trait]
    impl ClusterBackend for RecordingBackend {
        async fn up(&self, spec: &ClusterSpec) -> Result<Deployment> {
            self.seen.lock().unwrap().push(format!("up {}", spec.segment_count));
            Ok(Deployment {
                backend: "recording".to_string(),
                nodes: plan(spec, &PlanContext::new("h"))?,
                pids: Vec::new(),
                descriptor_path: None,
                health: HealthReport {
                    attempts: 1,
                    content_ids: spec.content_ids(),
                },
            })
        }

        async fn down(&self, remove_data: bool) -> Result<TeardownReport> {
            self.seen.lock().unwrap().push(format!("down {}", remove_data));
            Ok(TeardownReport {
                data_removed: remove_data,
                ..TeardownReport::default()
            })
        }

        fn capabilities(&self) -> BackendCapabilities {
            BackendCapabilities::default()
        }

        fn name(&self) -> &str {
            "recording"
        }
    }

    #[tokio::test]
    async fn test_execute_dispatches_to_backend() {
        let backend = RecordingBackend::default();
        let seen = backend.seen.clone();
        let lifecycle = ClusterLifecycle::new(Box::new(backend));

        let outcome = lifecycle
            .execute(Operation::Up(ClusterSpec::new(12345, 2).unwrap()))
            .await
            .unwrap();
        match outcome {
            Outcome::Deployed(deployment) => assert_eq!(deployment.nodes.len(), 3),
            other => panic!("unexpected outcome: {other:?}"),
        }

        let outcome = lifecycle
            .execute(Operation::Down { remove_data: true })
            .await
            .unwrap();
        assert!(matches!(outcome, Outcome::TornDown(r) if r.data_removed));

        assert_eq!(*seen.lock().unwrap(), vec!["up 2", "down true"]);
    }

    #[tokio::test]
    async fn test_build_falls_back_to_unsupported() {
        let lifecycle = ClusterLifecycle::new(Box::new(RecordingBackend::default()));

        let err = lifecycle
            .execute(Operation::Build {
                server_version: DEFAULT_SERVER_VERSION.to_string(),
            })
            .await
            .unwrap_err();
        assert!(matches!(err, OrchestratorError::Unsupported(_)));
        assert_eq!(lifecycle.backend().name(), "recording");
    }

    #[test]
    fn test_operation_names() {
        assert_eq!(Operation::Down { remove_data: false }.to_string(), "down");
        assert_eq!(
            Operation::Up(ClusterSpec::new(1, 0).unwrap()).name(),
            "up"
        );
    }
}
