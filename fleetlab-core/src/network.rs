use std::sync::Arc;
use tracing::{debug, info, warn};

use crate::error::{FleetError, FleetResult};
use crate::runtime::ContainerRuntime;

/// Creates and removes the named networks a fleet is wired into
pub struct NetworkManager {
    runtime: Arc<dyn ContainerRuntime>,
}

impl NetworkManager {
    pub fn new(runtime: Arc<dyn ContainerRuntime>) -> Self {
        Self { runtime }
    }

    /// Create a network, treating an existing one as success
    pub async fn ensure(&self, name: &str) -> FleetResult<()> {
        info!("Creating network: {}", name);
        match self.runtime.create_network(name).await {
            Ok(()) => Ok(()),
            Err(FleetError::AlreadyExists { .. }) => {
                debug!("Network {} already exists", name);
                Ok(())
            }
            Err(e) => Err(e),
        }
    }

    /// Create every network in order, continuing past failures
    pub async fn ensure_all<'a, I>(&self, names: I) -> Vec<(String, FleetError)>
    where
        I: IntoIterator<Item = &'a str>,
    {
        let mut failures = Vec::new();
        for name in names {
            if let Err(e) = self.ensure(name).await {
                warn!("Failed to create network {}: {}", name, e);
                failures.push((name.to_string(), e));
            }
        }
        failures
    }

    pub async fn remove(&self, name: &str) -> FleetResult<()> {
        info!("Removing network {}", name);
        self.runtime.remove_network(name).await
    }
}
