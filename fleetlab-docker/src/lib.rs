pub mod command;
pub mod compose_generator;
pub mod compose_store;
pub mod docker_runtime;

pub use command::{CommandExecutor, CommandOutput, ProgressTicker, SystemCommandExecutor};
pub use compose_generator::ComposeGenerator;
pub use compose_store::ComposeStore;
pub use docker_runtime::DockerRuntime;

// Re-export core types for convenience
pub use fleetlab_core::{
    error::{FleetError, FleetResult},
    runtime::{ArtifactStore, ContainerRuntime},
};
