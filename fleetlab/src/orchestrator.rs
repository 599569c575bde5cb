use rand::Rng;
use std::future::Future;
use std::sync::Arc;
use tokio::sync::watch;
use tracing::info;

use fleetlab_core::{
    cleanup::CleanupReport,
    config::{FaultActionKind, FleetConfig, RunConfig},
    error::{FleetError, FleetResult},
    fault_injector::FaultInjector,
    generator::{ArtifactGenerator, Generation},
    network::NetworkManager,
    reconciler::{DownReport, FleetReconciler, ReconcileReport},
    runtime::{ArtifactStore, ContainerRuntime},
    templates::TemplateRegistry,
    topology::compute_topology,
    types::FleetTopology,
};
use fleetlab_docker::{ComposeStore, DockerRuntime, SystemCommandExecutor};

/// Wires configuration, topology and a backend into the fleet operations
///
/// The topology is computed once at construction, so an invalid
/// configuration is reported before anything touches the environment.
pub struct FleetOrchestrator {
    config: FleetConfig,
    topology: FleetTopology,
    runtime: Arc<dyn ContainerRuntime>,
    reconciler: FleetReconciler,
}

impl FleetOrchestrator {
    /// Create an orchestrator driving the local docker engine
    pub fn new(config: FleetConfig, run: RunConfig) -> FleetResult<Self> {
        let executor = Arc::new(SystemCommandExecutor::new(run.verbose));
        let runtime = Arc::new(DockerRuntime::new(executor));
        let store = Arc::new(ComposeStore::new(&run.artifact_dir)?);
        info!("Compose files live in {}", store.dir().display());
        Self::with_backend(config, run, runtime, store)
    }

    pub fn with_backend(
        config: FleetConfig,
        run: RunConfig,
        runtime: Arc<dyn ContainerRuntime>,
        store: Arc<dyn ArtifactStore>,
    ) -> FleetResult<Self> {
        let topology = compute_topology(&config)?;
        info!(
            "Fleet of {} replica(s), provider {}",
            topology.len(),
            if topology.provider.is_some() { "configured" } else { "not configured" }
        );

        let networks = Arc::new(NetworkManager::new(runtime.clone()));
        let generator = ArtifactGenerator::new(
            Arc::new(TemplateRegistry::default()),
            store.clone(),
            networks.clone(),
            run.clone(),
        );
        let reconciler = FleetReconciler::new(runtime.clone(), store, generator, networks, run);

        Ok(Self {
            config,
            topology,
            runtime,
            reconciler,
        })
    }

    pub fn topology(&self) -> &FleetTopology {
        &self.topology
    }

    pub async fn generate(&self) -> FleetResult<Generation> {
        self.reconciler.generate(&self.topology).await
    }

    pub async fn up(&self) -> FleetResult<ReconcileReport> {
        self.reconciler.reconcile(&self.topology).await
    }

    pub async fn down(&self) -> DownReport {
        self.reconciler.down(&self.topology).await
    }

    pub async fn force_clean(&self) -> CleanupReport {
        self.reconciler.force_clean(&self.topology).await
    }

    pub async fn rebuild(&self) -> FleetResult<(DownReport, ReconcileReport)> {
        self.reconciler.rebuild(&self.topology).await
    }

    /// Build a fault injector for the running fleet
    pub fn fault_injector<R: Rng + Send>(
        &self,
        action: Option<FaultActionKind>,
        rng: R,
    ) -> FaultInjector<R> {
        let mut config = self.config.fault_injection.clone();
        if let Some(action) = action {
            config.action = action;
        }
        FaultInjector::new(
            self.runtime.clone(),
            config,
            self.topology.shared_network.clone(),
            rng,
        )
    }

    /// Inject faults until `stop` resolves
    ///
    /// The injector is told to shut down whether or not `stop` succeeded, and
    /// this only returns once any active fault has been healed.
    pub async fn run_fault_injection<R, F>(
        &self,
        action: Option<FaultActionKind>,
        rng: R,
        stop: F,
    ) -> FleetResult<()>
    where
        R: Rng + Send + Sync + 'static,
        F: Future<Output = FleetResult<()>>,
    {
        let injector = self.fault_injector(action, rng);
        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        let handle = tokio::spawn(injector.run(shutdown_rx));

        let stopped = stop.await;
        info!("Stopping fault injection, healing any active fault first");
        let _ = shutdown_tx.send(true);
        handle.await.map_err(|e| FleetError::Internal {
            message: format!("Fault injector task failed: {}", e),
        })?;
        stopped
    }
}
