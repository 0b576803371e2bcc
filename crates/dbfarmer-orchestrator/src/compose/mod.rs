//! Compose descriptors for containerized clusters.

mod builder;
mod descriptor;

pub use builder::{ComposeConfig, ComposeConfigBuilder, ContainerDescriptorBuilder};
pub use descriptor::{
    ComposeNetwork, ComposeService, ComposeVolume, ContainerDescriptor, COMPOSE_FILE_NAME,
};
