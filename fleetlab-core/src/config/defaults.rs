//! Default configuration values for fleetlab
//!
//! This module centralizes all default values and naming conventions.

use std::time::Duration;

// Naming conventions shared by the generator, the reconciler and the fault injector
pub const SHARED_NETWORK: &str = "Shared_net";
pub const PROVIDER_NETWORK: &str = "Provider_net";
pub const PROVIDER_CONTAINER: &str = "wsserver";
pub const PROVIDER_UNIT: &str = "Provider";
pub const REPLICA_PREFIX: &str = "Replica";
pub const REPLICA_NETWORK_PREFIX: &str = "Replica_net_";
pub const APP_PREFIX: &str = "app";
pub const PRELOAD_PREFIX: &str = "preload";

// Ports inside the containers
pub const APP_CONTAINER_PORT: u16 = 3000;
pub const PROVIDER_CONTAINER_PORT: u16 = 1234;

pub const DEFAULT_APP_LOG_LEVEL: &str = "info";

// Run defaults
pub const DEFAULT_CONFIG_FILE: &str = "DistributionConfig.json";
pub const DEFAULT_ARTIFACT_DIR: &str = "./Dockerfiles";
pub const DEFAULT_BUILD_CONTEXT: &str = "../";
pub const DEFAULT_APP_DOCKERFILE: &str = "./Dockerfiles/wrapperdockerfile";
pub const DEFAULT_PROVIDER_DOCKERFILE: &str = "./Dockerfiles/WSServerDockerfile";
pub const DEFAULT_PRELOAD_DIR: &str = "../scratch";

// Fault injection timing
pub const DEFAULT_FAULT_DURATION: Duration = Duration::from_secs(15);
pub const DEFAULT_FAULT_COOLDOWN: Duration = Duration::from_secs(30);
pub const DEFAULT_DISCOVERY_BACKOFF: Duration = Duration::from_secs(10);

/// Fewer live replicas than this makes a partition experiment meaningless
pub const MIN_FAULT_FLEET_SIZE: usize = 2;
