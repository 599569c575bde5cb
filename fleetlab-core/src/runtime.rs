use async_trait::async_trait;
use std::net::IpAddr;

use crate::error::FleetResult;
use crate::types::{ArtifactRef, PruneTarget, StartOptions, StopOptions, UnitDefinition};

/// Abstract interface to the environment the fleet runs in
///
/// The reconciler, the network manager, the cleanup sweep and the fault
/// injector only ever talk to the outside world through this trait, which
/// keeps them testable against an in-memory fake.
///
/// Every call blocks the caller until the underlying operation has finished.
/// Failures of external commands surface as `FleetError::Execution` carrying
/// the exit code and captured output; an attempt to create something that is
/// already there surfaces as `FleetError::AlreadyExists`.
#[async_trait]
pub trait ContainerRuntime: Send + Sync {
    async fn create_network(&self, name: &str) -> FleetResult<()>;

    async fn remove_network(&self, name: &str) -> FleetResult<()>;

    async fn list_networks(&self) -> FleetResult<Vec<String>>;

    /// Names of all currently running containers
    async fn list_running_units(&self) -> FleetResult<Vec<String>>;

    /// Names of all containers, running or not
    async fn list_all_units(&self) -> FleetResult<Vec<String>>;

    /// Whether the unit (project) with this name has running members
    async fn is_unit_running(&self, name: &str) -> FleetResult<bool>;

    async fn start_unit(&self, artifact: &ArtifactRef, options: StartOptions) -> FleetResult<()>;

    async fn stop_unit(&self, artifact: &ArtifactRef, options: StopOptions) -> FleetResult<()>;

    /// Force-remove a single container
    async fn remove_unit(&self, name: &str) -> FleetResult<()>;

    async fn disconnect_from_network(&self, unit: &str, network: &str) -> FleetResult<()>;

    async fn connect_to_network(&self, unit: &str, network: &str) -> FleetResult<()>;

    /// Address of `unit` inside `network`
    async fn resolve_address(&self, unit: &str, network: &str) -> FleetResult<IpAddr>;

    /// Run a command inside a unit, returning its captured output
    async fn exec_in_unit(&self, unit: &str, command: &[String]) -> FleetResult<String>;

    /// Remove unused resources of one kind
    async fn prune(&self, target: PruneTarget) -> FleetResult<()>;
}

/// Persistence for rendered unit definitions
///
/// Each stored unit is addressed by a short key (`"1"`, `"2"`, `"provider"`);
/// the store decides how keys map to artifacts.
pub trait ArtifactStore: Send + Sync {
    /// Serialize and persist a unit, replacing any previous artifact under `key`
    fn write(&self, key: &str, unit: &UnitDefinition) -> FleetResult<ArtifactRef>;

    /// Where the artifact for `key` lives, whether or not it exists yet
    fn locate(&self, key: &str) -> ArtifactRef;

    /// Every artifact currently persisted in the managed location
    fn list(&self) -> FleetResult<Vec<ArtifactRef>>;

    fn remove(&self, artifact: &ArtifactRef) -> FleetResult<()>;

    /// Logical unit name read back from a persisted artifact
    fn read_name(&self, artifact: &ArtifactRef) -> FleetResult<String>;
}
