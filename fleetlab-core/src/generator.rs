//! Rendering and persisting deployable units
//!
//! The generator turns a [`FleetTopology`] into one [`UnitDefinition`] per
//! replica, plus one for the provider when configured. The application service
//! is the same for every database kind; the database side comes from the
//! kind's template.

use std::sync::Arc;
use tracing::{error, info, warn};

use crate::config::{RunConfig, APP_CONTAINER_PORT, PROVIDER_CONTAINER_PORT};
use crate::error::{FleetError, FleetResult};
use crate::network::NetworkManager;
use crate::runtime::ArtifactStore;
use crate::templates::{RenderContext, TemplateRegistry};
use crate::types::{
    ArtifactRef, BuildContext, Dependency, DependencyCondition, EnvVar, FleetTopology, GeneratedUnit,
    NetworkDefinition, PortMapping, ProviderSpec, ReplicaSpec, ServiceDefinition, UnitDefinition,
};

/// A unit that could not be rendered or persisted
#[derive(Debug)]
pub struct FailedUnit {
    pub name: String,
    /// Where the unit would have been written; any earlier copy is kept
    pub artifact: ArtifactRef,
    pub error: FleetError,
}

/// Outcome of one generation pass
#[derive(Debug, Default)]
pub struct Generation {
    pub units: Vec<GeneratedUnit>,
    pub failed: Vec<FailedUnit>,
}

impl Generation {
    /// Artifacts that belong to the topology, written or not
    pub fn artifacts(&self) -> impl Iterator<Item = &ArtifactRef> {
        self.units
            .iter()
            .map(|u| &u.artifact)
            .chain(self.failed.iter().map(|f| &f.artifact))
    }
}

pub struct ArtifactGenerator {
    templates: Arc<TemplateRegistry>,
    store: Arc<dyn ArtifactStore>,
    networks: Arc<NetworkManager>,
    run: RunConfig,
}

impl ArtifactGenerator {
    pub fn new(
        templates: Arc<TemplateRegistry>,
        store: Arc<dyn ArtifactStore>,
        networks: Arc<NetworkManager>,
        run: RunConfig,
    ) -> Self {
        Self {
            templates,
            store,
            networks,
            run,
        }
    }

    /// Render the unit for one replica
    pub fn render_unit(
        &self,
        replica: &ReplicaSpec,
        topology: &FleetTopology,
    ) -> FleetResult<UnitDefinition> {
        let template = self.templates.get(replica.database)?;
        let ctx = RenderContext {
            preload: topology.preload,
            preload_dir: &self.run.preload_dir,
        };
        let database = template.render(replica, &ctx);

        let mut depends_on = vec![Dependency {
            service: database.primary.clone(),
            condition: DependencyCondition::Healthy,
        }];
        if let Some(preload) = &database.preload {
            depends_on.push(Dependency {
                service: preload.clone(),
                condition: DependencyCondition::CompletedSuccessfully,
            });
        }

        let app = ServiceDefinition {
            key: replica.app_name.clone(),
            container_name: replica.container_name.clone(),
            build: Some(BuildContext {
                context: self.run.build_context.clone(),
                dockerfile: self.run.app_dockerfile.clone(),
            }),
            ports: vec![PortMapping {
                host: replica.ports.app,
                container: APP_CONTAINER_PORT,
            }],
            environment: vec![
                EnvVar::new("DATABASE_URI", database.uri.clone()),
                EnvVar::new("NEO4J_USER", replica.credentials.user.clone()),
                EnvVar::new("NEO4J_PASSWORD", replica.credentials.password.clone()),
                EnvVar::new("USER", replica.credentials.user.clone()),
                EnvVar::new("DATABASE", replica.database.as_str().to_uppercase()),
                EnvVar::new("LOG_LEVEL", replica.log_level.clone()),
                EnvVar::new("LEADER_URI", replica.leader_uri.clone()),
                EnvVar::new("MY_URI", replica.self_uri.clone()),
            ],
            depends_on,
            cap_add: vec!["NET_ADMIN".to_string()],
            networks: vec![
                replica.network_name.clone(),
                topology.shared_network.clone(),
            ],
            ..Default::default()
        };

        let mut services = database.services;
        services.push(app);

        Ok(UnitDefinition {
            name: replica.container_name.clone(),
            services,
            // Both networks are created by the generator before compose runs
            networks: vec![
                NetworkDefinition {
                    name: replica.network_name.clone(),
                    external: true,
                },
                NetworkDefinition {
                    name: topology.shared_network.clone(),
                    external: true,
                },
            ],
        })
    }

    /// Render the websocket provider, attached to every replica network
    pub fn render_provider(&self, provider: &ProviderSpec, topology: &FleetTopology) -> UnitDefinition {
        let mut networks = vec![provider.network_name.clone()];
        networks.extend(topology.replica_networks().into_iter().map(String::from));

        let service = ServiceDefinition {
            key: provider.container_name.clone(),
            container_name: provider.container_name.clone(),
            build: Some(BuildContext {
                context: self.run.build_context.clone(),
                dockerfile: self.run.provider_dockerfile.clone(),
            }),
            ports: vec![PortMapping {
                host: provider.port,
                container: PROVIDER_CONTAINER_PORT,
            }],
            environment: vec![
                EnvVar::new("PORT", provider.port.to_string()),
                EnvVar::new("HOST", "0.0.0.0"),
            ],
            networks: networks.clone(),
            ..Default::default()
        };

        UnitDefinition {
            name: provider.unit_name.clone(),
            services: vec![service],
            networks: networks
                .into_iter()
                .map(|name| NetworkDefinition {
                    external: name != provider.network_name,
                    name,
                })
                .collect(),
        }
    }

    /// Create networks, then render and persist every unit
    ///
    /// Units come back in index order with the provider last. A network that
    /// cannot be created is logged and does not stop generation; the start of
    /// the affected unit will report the problem. A unit that cannot be
    /// rendered or written is recorded in [`Generation::failed`] and the rest
    /// are still generated.
    pub async fn generate(&self, topology: &FleetTopology) -> Generation {
        let network_names = std::iter::once(topology.shared_network.as_str())
            .chain(topology.replica_networks());
        for (name, e) in self.networks.ensure_all(network_names).await {
            warn!("Continuing without network {}: {}", name, e);
        }

        let mut generation = Generation {
            units: Vec::with_capacity(topology.len() + 1),
            failed: Vec::new(),
        };
        for replica in &topology.replicas {
            let key = replica.unit_key();
            let written = self
                .render_unit(replica, topology)
                .and_then(|unit| self.persist(&key, unit, false));
            self.record(&mut generation, &key, &replica.container_name, written);
        }

        if let Some(provider) = &topology.provider {
            let unit = self.render_provider(provider, topology);
            let written = self.persist(ProviderSpec::UNIT_KEY, unit, true);
            self.record(
                &mut generation,
                ProviderSpec::UNIT_KEY,
                &provider.unit_name,
                written,
            );
        }

        generation
    }

    fn persist(
        &self,
        key: &str,
        unit: UnitDefinition,
        is_provider: bool,
    ) -> FleetResult<GeneratedUnit> {
        let artifact = self.store.write(key, &unit)?;
        info!("Generated {}", artifact);
        Ok(GeneratedUnit {
            artifact,
            name: unit.name,
            is_provider,
        })
    }

    fn record(
        &self,
        generation: &mut Generation,
        key: &str,
        name: &str,
        written: FleetResult<GeneratedUnit>,
    ) {
        match written {
            Ok(unit) => generation.units.push(unit),
            Err(error) => {
                error!("Failed to generate {}: {}", name, error);
                generation.failed.push(FailedUnit {
                    name: name.to_string(),
                    artifact: self.store.locate(key),
                    error,
                });
            }
        }
    }
}
