//! Fault injection configuration

use super::defaults::*;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use std::time::Duration;

use crate::error::FleetError;

/// Which partition primitive the injector applies
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum FaultActionKind {
    /// Detach one replica from the shared network
    Disconnect,
    /// Drop outgoing traffic from one replica to another
    PairwiseDrop,
}

impl fmt::Display for FaultActionKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FaultActionKind::Disconnect => write!(f, "disconnect"),
            FaultActionKind::PairwiseDrop => write!(f, "pairwise-drop"),
        }
    }
}

impl FromStr for FaultActionKind {
    type Err = FleetError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "disconnect" => Ok(FaultActionKind::Disconnect),
            "pairwise-drop" => Ok(FaultActionKind::PairwiseDrop),
            other => Err(FleetError::ConfigError(format!(
                "Unknown fault action '{}'. Expected 'disconnect' or 'pairwise-drop'",
                other
            ))),
        }
    }
}

/// Timing and behaviour of the fault injector
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct FaultInjectionConfig {
    /// How long a fault stays applied
    #[serde(with = "humantime_serde")]
    pub fault_duration: Duration,

    /// Pause between healing one fault and discovering the next target
    #[serde(with = "humantime_serde")]
    pub cooldown: Duration,

    /// Wait before polling again when too few replicas are running
    #[serde(with = "humantime_serde")]
    pub discovery_backoff: Duration,

    pub action: FaultActionKind,

    /// Running units whose name starts with this are fault targets
    pub unit_prefix: String,
}

impl Default for FaultInjectionConfig {
    fn default() -> Self {
        Self {
            fault_duration: DEFAULT_FAULT_DURATION,
            cooldown: DEFAULT_FAULT_COOLDOWN,
            discovery_backoff: DEFAULT_DISCOVERY_BACKOFF,
            action: FaultActionKind::Disconnect,
            unit_prefix: REPLICA_PREFIX.to_string(),
        }
    }
}

impl FaultInjectionConfig {
    pub fn validate(&self) -> Result<(), FleetError> {
        if self.fault_duration.is_zero() {
            return Err(FleetError::ConfigError(
                "fault_duration must be greater than zero".to_string(),
            ));
        }
        if self.discovery_backoff.is_zero() {
            return Err(FleetError::ConfigError(
                "discovery_backoff must be greater than zero".to_string(),
            ));
        }
        if self.unit_prefix.is_empty() {
            return Err(FleetError::ConfigError(
                "unit_prefix cannot be empty".to_string(),
            ));
        }
        Ok(())
    }
}
