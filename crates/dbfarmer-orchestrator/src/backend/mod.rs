//! Cluster backend implementations.
//!
//! This module provides the trait definition for cluster backends and the
//! local-process and Docker Compose implementations.

mod compose;
mod local;
mod r#trait;

pub use compose::{ComposeBackend, ComposeBackendConfig, SUPPORTED_SERVER_VERSIONS};
pub use local::{LocalBackend, LocalBackendConfig};
pub use r#trait::{BackendCapabilities, BoxedBackend, ClusterBackend, Deployment};
