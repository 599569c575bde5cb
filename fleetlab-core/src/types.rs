use serde::{Deserialize, Serialize};
use std::fmt;
use std::net::IpAddr;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::time::SystemTime;

use crate::error::FleetError;

/// Database backends a replica can be paired with
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DatabaseKind {
    Neo4j,
    Memgraph,
    JanusGraph,
}

impl DatabaseKind {
    pub const ALL: [DatabaseKind; 3] = [
        DatabaseKind::Neo4j,
        DatabaseKind::Memgraph,
        DatabaseKind::JanusGraph,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            DatabaseKind::Neo4j => "neo4j",
            DatabaseKind::Memgraph => "memgraph",
            DatabaseKind::JanusGraph => "janusgraph",
        }
    }
}

impl fmt::Display for DatabaseKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for DatabaseKind {
    type Err = FleetError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        DatabaseKind::ALL
            .iter()
            .copied()
            .find(|kind| kind.as_str() == s)
            .ok_or_else(|| {
                let supported: Vec<_> = DatabaseKind::ALL.iter().map(|k| k.as_str()).collect();
                FleetError::ConfigError(format!(
                    "Unsupported database '{}'. Supported databases: {}",
                    s,
                    supported.join(", ")
                ))
            })
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Credentials {
    pub user: String,
    pub password: String,
}

/// Host ports published by one replica
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct PortAssignment {
    pub website: u16,
    pub protocol: u16,
    pub app: u16,
}

impl PortAssignment {
    pub fn all(&self) -> [u16; 3] {
        [self.website, self.protocol, self.app]
    }
}

/// One desired replica: a database paired with an application instance
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReplicaSpec {
    /// 0-based position in the fleet. Index 0 is the leader.
    pub index: usize,
    pub database: DatabaseKind,
    pub credentials: Credentials,
    pub log_level: String,
    /// Private network, unique per replica
    pub network_name: String,
    /// Application container name, also used as the unit name
    pub container_name: String,
    pub app_name: String,
    pub database_name: String,
    pub leader_uri: String,
    pub self_uri: String,
    pub ports: PortAssignment,
}

impl ReplicaSpec {
    pub fn is_leader(&self) -> bool {
        self.index == 0
    }

    /// Key under which this replica's artifact is stored
    pub fn unit_key(&self) -> String {
        (self.index + 1).to_string()
    }
}

/// Optional websocket provider shared by every replica
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProviderSpec {
    pub port: u16,
    pub network_name: String,
    pub container_name: String,
    pub unit_name: String,
}

impl ProviderSpec {
    pub const UNIT_KEY: &'static str = "provider";
}

/// Desired shape of the whole fleet, derived from configuration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FleetTopology {
    /// Ordered by index; position 0 is the leader
    pub replicas: Vec<ReplicaSpec>,
    pub shared_network: String,
    pub provider: Option<ProviderSpec>,
    pub preload: bool,
}

impl FleetTopology {
    pub fn leader(&self) -> Option<&ReplicaSpec> {
        self.replicas.first()
    }

    pub fn replica_networks(&self) -> Vec<&str> {
        self.replicas.iter().map(|r| r.network_name.as_str()).collect()
    }

    pub fn len(&self) -> usize {
        self.replicas.len()
    }

    pub fn is_empty(&self) -> bool {
        self.replicas.is_empty()
    }
}

/// Structured description of one deployable unit
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UnitDefinition {
    pub name: String,
    pub services: Vec<ServiceDefinition>,
    pub networks: Vec<NetworkDefinition>,
}

impl UnitDefinition {
    pub fn service(&self, key: &str) -> Option<&ServiceDefinition> {
        self.services.iter().find(|s| s.key == key)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NetworkDefinition {
    pub name: String,
    /// Created outside of the unit and only attached to
    pub external: bool,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ServiceDefinition {
    pub key: String,
    pub container_name: String,
    pub image: Option<String>,
    pub build: Option<BuildContext>,
    pub command: Vec<String>,
    pub pull_always: bool,
    pub ports: Vec<PortMapping>,
    pub environment: Vec<EnvVar>,
    pub depends_on: Vec<Dependency>,
    pub healthcheck: Option<HealthCheck>,
    pub networks: Vec<String>,
    pub cap_add: Vec<String>,
    pub volumes: Vec<String>,
    pub ulimit_nofile: Option<u64>,
    /// One-shot services run to completion instead of staying up
    pub one_shot: bool,
}

impl ServiceDefinition {
    pub fn env(&self, name: &str) -> Option<&str> {
        self.environment
            .iter()
            .find(|e| e.name == name)
            .map(|e| e.value.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BuildContext {
    pub context: String,
    pub dockerfile: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct PortMapping {
    pub host: u16,
    pub container: u16,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EnvVar {
    pub name: String,
    pub value: String,
}

impl EnvVar {
    pub fn new(name: impl Into<String>, value: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            value: value.into(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Dependency {
    pub service: String,
    pub condition: DependencyCondition,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum DependencyCondition {
    #[serde(rename = "service_healthy")]
    Healthy,
    #[serde(rename = "service_completed_successfully")]
    CompletedSuccessfully,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HealthCheck {
    pub test: Vec<String>,
    pub interval: String,
    pub timeout: String,
    pub retries: u32,
    pub start_period: Option<String>,
}

/// Handle to a persisted unit definition
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ArtifactRef(PathBuf);

impl ArtifactRef {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self(path.into())
    }

    pub fn path(&self) -> &Path {
        &self.0
    }
}

impl fmt::Display for ArtifactRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0.display())
    }
}

/// A unit that was rendered and persisted during this pass
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GeneratedUnit {
    pub artifact: ArtifactRef,
    pub name: String,
    pub is_provider: bool,
}

/// Observed state of one unit, queried fresh on every pass
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RuntimeUnit {
    pub name: String,
    pub is_running: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StartOptions {
    pub build: bool,
    pub detach: bool,
    pub force_recreate: bool,
}

impl Default for StartOptions {
    fn default() -> Self {
        Self {
            build: true,
            detach: true,
            force_recreate: true,
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct StopOptions {
    pub remove_volumes: bool,
    pub remove_orphans: bool,
    pub remove_local_images: bool,
}

impl StopOptions {
    /// Everything a unit left behind, used by force-clean
    pub fn purge() -> Self {
        Self {
            remove_volumes: true,
            remove_orphans: true,
            remove_local_images: true,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PruneTarget {
    Containers,
    Images,
    Volumes,
}

impl fmt::Display for PruneTarget {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PruneTarget::Containers => write!(f, "container"),
            PruneTarget::Images => write!(f, "image"),
            PruneTarget::Volumes => write!(f, "volume"),
        }
    }
}

/// What an active fault is applied to
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FaultTarget {
    Node(String),
    Pair {
        src: String,
        dst: String,
        dst_address: IpAddr,
    },
}

impl fmt::Display for FaultTarget {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FaultTarget::Node(name) => write!(f, "{}", name),
            FaultTarget::Pair { src, dst, dst_address } => {
                write!(f, "{} -> {} ({})", src, dst, dst_address)
            }
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FaultPhase {
    Connected,
    Partitioned,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FaultState {
    pub target: FaultTarget,
    pub phase: FaultPhase,
    pub started_at: SystemTime,
}
