//! Drives the running fleet toward the configured topology
//!
//! A reconcile pass regenerates every artifact, garbage-collects artifacts that
//! no longer belong to the topology, and starts each desired unit that is not
//! already running. Units are handled strictly in index order and one failing
//! unit never prevents the others from being attempted.

use std::collections::HashSet;
use std::sync::Arc;
use tracing::{error, info, warn};

use crate::cleanup::{CleanupReport, CleanupSweep};
use crate::config::RunConfig;
use crate::error::{FleetError, FleetResult};
use crate::generator::{ArtifactGenerator, Generation};
use crate::network::NetworkManager;
use crate::runtime::{ArtifactStore, ContainerRuntime};
use crate::types::{
    ArtifactRef, FleetTopology, ProviderSpec, RuntimeUnit, StartOptions, StopOptions,
};

/// Outcome of one reconcile pass
#[derive(Debug, Default)]
pub struct ReconcileReport {
    pub started: Vec<String>,
    pub already_running: Vec<String>,
    /// Artifacts whose unit name could not be read back
    pub skipped: Vec<ArtifactRef>,
    pub failed: Vec<(String, FleetError)>,
    pub removed_artifacts: Vec<ArtifactRef>,
    /// State of every unit as it was found, before any start
    pub observed: Vec<RuntimeUnit>,
}

impl ReconcileReport {
    pub fn is_success(&self) -> bool {
        self.failed.is_empty() && self.skipped.is_empty()
    }
}

#[derive(Debug, Default)]
pub struct DownReport {
    pub stopped: usize,
    pub networks_removed: usize,
    pub failures: Vec<(String, FleetError)>,
}

pub struct FleetReconciler {
    runtime: Arc<dyn ContainerRuntime>,
    store: Arc<dyn ArtifactStore>,
    generator: ArtifactGenerator,
    networks: Arc<NetworkManager>,
    run: RunConfig,
}

impl FleetReconciler {
    pub fn new(
        runtime: Arc<dyn ContainerRuntime>,
        store: Arc<dyn ArtifactStore>,
        generator: ArtifactGenerator,
        networks: Arc<NetworkManager>,
        run: RunConfig,
    ) -> Self {
        Self {
            runtime,
            store,
            generator,
            networks,
            run,
        }
    }

    /// Regenerate artifacts and persist them without starting anything
    pub async fn generate(&self, topology: &FleetTopology) -> FleetResult<Generation> {
        let generation = self.generator.generate(topology).await;
        self.collect_garbage(&generation)?;
        Ok(generation)
    }

    pub async fn reconcile(&self, topology: &FleetTopology) -> FleetResult<ReconcileReport> {
        let generation = self.generator.generate(topology).await;
        let mut report = ReconcileReport {
            removed_artifacts: self.collect_garbage(&generation)?,
            ..Default::default()
        };
        let Generation { units, failed } = generation;
        report
            .failed
            .extend(failed.into_iter().map(|f| (f.name, f.error)));

        for unit in &units {
            if unit.is_provider && !self.run.start_provider {
                continue;
            }
            self.reconcile_unit(&unit.artifact, &mut report).await;
        }

        info!(
            "Reconcile finished: {} started, {} already running, {} skipped, {} failed",
            report.started.len(),
            report.already_running.len(),
            report.skipped.len(),
            report.failed.len()
        );
        Ok(report)
    }

    async fn reconcile_unit(&self, artifact: &ArtifactRef, report: &mut ReconcileReport) {
        let name = match self.store.read_name(artifact) {
            Ok(name) => name,
            Err(e) => {
                warn!("Skipping {}: {}", artifact, e);
                report.skipped.push(artifact.clone());
                return;
            }
        };

        let unit = match self.runtime.is_unit_running(&name).await {
            Ok(is_running) => RuntimeUnit { name, is_running },
            Err(e) => {
                error!("Failed to query state of {}: {}", name, e);
                report.failed.push((name, e));
                return;
            }
        };
        report.observed.push(unit.clone());

        if unit.is_running {
            info!("{} is already running", unit.name);
            report.already_running.push(unit.name);
            return;
        }

        info!("Starting {}", unit.name);
        match self.runtime.start_unit(artifact, StartOptions::default()).await {
            Ok(()) => report.started.push(unit.name),
            Err(e) => {
                error!("Failed to start {}: {}", unit.name, e);
                report.failed.push((unit.name, e));
            }
        }
    }

    /// Remove every stored artifact that is not part of `current`
    ///
    /// Artifacts of units that failed to generate stay, so their last good
    /// version survives.
    fn collect_garbage(&self, current: &Generation) -> FleetResult<Vec<ArtifactRef>> {
        let keep: HashSet<&ArtifactRef> = current.artifacts().collect();
        let mut removed = Vec::new();
        for artifact in self.store.list()? {
            if keep.contains(&artifact) {
                continue;
            }
            match self.store.remove(&artifact) {
                Ok(()) => {
                    info!("Removed stale artifact {}", artifact);
                    removed.push(artifact);
                }
                Err(e) => warn!("Failed to remove stale artifact {}: {}", artifact, e),
            }
        }
        Ok(removed)
    }

    /// Stop every replica unit, keeping volumes, and remove its private network
    pub async fn down(&self, topology: &FleetTopology) -> DownReport {
        let mut report = DownReport::default();
        for replica in &topology.replicas {
            let artifact = self.store.locate(&replica.unit_key());
            info!("Stopping {}", replica.container_name);
            match self.runtime.stop_unit(&artifact, StopOptions::default()).await {
                Ok(()) => report.stopped += 1,
                Err(e) => {
                    error!("Failed to stop {}: {}", replica.container_name, e);
                    report.failures.push((replica.container_name.clone(), e));
                }
            }

            match self.networks.remove(&replica.network_name).await {
                Ok(()) => report.networks_removed += 1,
                Err(e) => {
                    warn!("Failed to remove network {}: {}", replica.network_name, e);
                    report.failures.push((replica.network_name.clone(), e));
                }
            }
        }
        report
    }

    /// Tear down everything the fleet may have left behind
    pub async fn force_clean(&self, topology: &FleetTopology) -> CleanupReport {
        let mut report = CleanupReport::default();

        let mut keys: Vec<(String, String)> = topology
            .replicas
            .iter()
            .map(|r| (r.unit_key(), r.container_name.clone()))
            .collect();
        if let Some(provider) = &topology.provider {
            keys.push((ProviderSpec::UNIT_KEY.to_string(), provider.unit_name.clone()));
        }

        for (key, name) in keys {
            let artifact = self.store.locate(&key);
            info!("Purging {}", name);
            match self.runtime.stop_unit(&artifact, StopOptions::purge()).await {
                Ok(()) => report.units_stopped += 1,
                Err(e) => {
                    warn!("Failed to purge {}: {}", name, e);
                    report.failures.push((name, e));
                }
            }
        }

        CleanupSweep::new(self.runtime.clone())
            .sweep(&mut report)
            .await;
        report
    }

    /// Stop the fleet, then bring it back from freshly generated artifacts
    pub async fn rebuild(&self, topology: &FleetTopology) -> FleetResult<(DownReport, ReconcileReport)> {
        let down = self.down(topology).await;
        let up = self.reconcile(topology).await?;
        Ok((down, up))
    }
}
