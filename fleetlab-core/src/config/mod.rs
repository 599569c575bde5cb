//! Fleet configuration
//!
//! The fleet is described by one file (JSON, or TOML when the file ends in
//! `.toml`) listing the replicas and the base ports. Parsing is strict: a
//! value of the wrong type is rejected rather than coerced.

use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;

use crate::error::{FleetError, FleetResult};

pub mod defaults;
pub mod fault;
pub mod run;

pub use defaults::*;
pub use fault::{FaultActionKind, FaultInjectionConfig};
pub use run::RunConfig;

/// One replica entry in the configuration file
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReplicaConfig {
    pub database: String,
    pub user: String,
    pub password: String,
    #[serde(default = "default_app_log_level")]
    pub app_log_level: String,
}

fn default_app_log_level() -> String {
    DEFAULT_APP_LOG_LEVEL.to_string()
}

/// Root configuration record
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FleetConfig {
    pub dbs: Vec<ReplicaConfig>,
    pub base_website_port: u16,
    pub base_protocol_port: u16,
    pub base_app_port: u16,
    #[serde(default)]
    pub provider_port: Option<u16>,
    /// Seed every database from a snapshot before its application starts
    #[serde(default)]
    pub preload_data: Option<bool>,
    #[serde(default)]
    pub fault_injection: FaultInjectionConfig,
}

impl FleetConfig {
    /// Load configuration from a file, choosing the format by extension
    pub fn from_file<P: AsRef<Path>>(path: P) -> FleetResult<Self> {
        let path = path.as_ref();
        let contents = fs::read_to_string(path).map_err(|e| {
            FleetError::ConfigError(format!(
                "Failed to read config file {}: {}",
                path.display(),
                e
            ))
        })?;

        let is_toml = path
            .extension()
            .map(|ext| ext.eq_ignore_ascii_case("toml"))
            .unwrap_or(false);

        if is_toml {
            Self::from_toml_str(&contents)
        } else {
            Self::from_json_str(&contents)
        }
    }

    pub fn from_json_str(contents: &str) -> FleetResult<Self> {
        let config: FleetConfig = serde_json::from_str(contents)
            .map_err(|e| FleetError::ConfigError(format!("Failed to parse JSON: {}", e)))?;
        config.validate()?;
        Ok(config)
    }

    pub fn from_toml_str(contents: &str) -> FleetResult<Self> {
        let config: FleetConfig = toml::from_str(contents)
            .map_err(|e| FleetError::ConfigError(format!("Failed to parse TOML: {}", e)))?;
        config.validate()?;
        Ok(config)
    }

    /// Checks that do not depend on the derived topology
    pub fn validate(&self) -> FleetResult<()> {
        if self.dbs.is_empty() {
            return Err(FleetError::ConfigError(
                "At least one database must be configured in 'dbs'".to_string(),
            ));
        }

        for (i, db) in self.dbs.iter().enumerate() {
            if db.user.is_empty() {
                return Err(FleetError::ConfigError(format!(
                    "dbs[{}]: user cannot be empty",
                    i
                )));
            }
        }

        self.fault_injection.validate()?;
        Ok(())
    }

    pub fn preload_enabled(&self) -> bool {
        self.preload_data.unwrap_or(false)
    }
}
