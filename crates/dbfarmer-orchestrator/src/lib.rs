//! Provisioning and teardown of coordinator/segment database clusters.
//!
//! A cluster is one coordinator node plus N segment nodes. This crate derives
//! every node's identity, port and storage location from the cluster size,
//! starts the nodes either as local processes or as Docker Compose services,
//! waits until the coordinator sees every segment, and tears the cluster
//! down again.
//!
//! # Architecture
//!
//! - [`command`]: external command execution with retry and dry-run support
//! - [`topology`]: cluster specification and the deterministic planner
//! - [`process`]: local node processes and lock-file driven teardown
//! - [`compose`]: typed compose descriptors
//! - [`health`]: readiness polling through a cross-node query
//! - [`backend`]: the local and container backends
//! - [`lifecycle`]: dispatch of `up` / `down` / `build`
//! - [`error`]: error types
//!
//! # Example
//!
//! ```ignore
//! use std::sync::Arc;
//! use dbfarmer_orchestrator::{
//!     backend::{LocalBackend, LocalBackendConfig},
//!     command::SystemCommandRunner,
//!     health::{HealthChecker, PsqlProbe},
//!     lifecycle::{ClusterLifecycle, Operation},
//!     process::SupervisorConfig,
//!     topology::ClusterSpec,
//! };
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let runner = Arc::new(SystemCommandRunner::new());
//!     let health = HealthChecker::new(Arc::new(PsqlProbe::new(runner.clone())));
//!     let backend = LocalBackend::new(
//!         LocalBackendConfig::builder().coordinator_host("my-host").build(),
//!         SupervisorConfig::builder().data_root("/work/pgdata").build(),
//!         health,
//!         runner,
//!     );
//!
//!     let lifecycle = ClusterLifecycle::new(Box::new(backend));
//!     lifecycle.execute(Operation::Up(ClusterSpec::new(12345, 2)?)).await?;
//!     Ok(())
//! }
//! ```

#![warn(missing_docs)]
#![warn(rustdoc::missing_crate_level_docs)]

pub mod backend;
pub mod command;
pub mod compose;
pub mod error;
pub mod health;
pub mod lifecycle;
pub mod process;
pub mod topology;

// Re-export commonly used types at the crate root
pub use backend::{BackendCapabilities, ClusterBackend, ComposeBackend, Deployment, LocalBackend};
pub use command::{CommandRunner, CommandSpec, RetryPolicy, SystemCommandRunner};
pub use compose::{ContainerDescriptor, ContainerDescriptorBuilder};
pub use error::{OrchestratorError, Result};
pub use health::{HealthChecker, ReadinessPolicy};
pub use lifecycle::{ClusterLifecycle, Operation, Outcome};
pub use process::{ProcessSupervisor, TeardownReport};
pub use topology::{plan, ClusterSpec, NodeConfig, NodeRole, PlanContext};
