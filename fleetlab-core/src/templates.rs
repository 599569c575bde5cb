//! Per-database unit templates
//!
//! Each supported [`DatabaseKind`] has one [`DatabaseTemplate`] describing the
//! services that make up its database side: the database itself, any sidecar
//! it ships with, and the optional one-shot preload job. Templates are looked
//! up through a [`TemplateRegistry`] keyed by kind.

use std::collections::HashMap;
use std::path::Path;
use std::sync::Arc;

use crate::config::PRELOAD_PREFIX;
use crate::error::{FleetError, FleetResult};
use crate::types::{
    DatabaseKind, Dependency, DependencyCondition, EnvVar, HealthCheck, PortMapping,
    ReplicaSpec, ServiceDefinition,
};

/// Inputs a template needs besides the replica itself
#[derive(Debug, Clone, Copy)]
pub struct RenderContext<'a> {
    pub preload: bool,
    pub preload_dir: &'a Path,
}

/// Database side of one replica unit
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RenderedDatabase {
    pub services: Vec<ServiceDefinition>,
    /// Service the application waits on to report healthy
    pub primary: String,
    /// Connection string handed to the application
    pub uri: String,
    /// One-shot service the application waits on to complete
    pub preload: Option<String>,
}

pub trait DatabaseTemplate: Send + Sync {
    fn kind(&self) -> DatabaseKind;

    fn render(&self, replica: &ReplicaSpec, ctx: &RenderContext<'_>) -> RenderedDatabase;
}

/// Registry of database templates
pub struct TemplateRegistry {
    templates: HashMap<DatabaseKind, Arc<dyn DatabaseTemplate>>,
}

impl TemplateRegistry {
    /// Create a new empty registry
    pub fn new() -> Self {
        Self {
            templates: HashMap::new(),
        }
    }

    pub fn register(&mut self, template: Arc<dyn DatabaseTemplate>) {
        let kind = template.kind();
        tracing::debug!("Registering unit template for {}", kind);
        self.templates.insert(kind, template);
    }

    pub fn get(&self, kind: DatabaseKind) -> FleetResult<Arc<dyn DatabaseTemplate>> {
        self.templates.get(&kind).cloned().ok_or_else(|| {
            FleetError::ConfigError(format!(
                "No unit template registered for database '{}'. Available: {:?}",
                kind,
                self.kinds()
            ))
        })
    }

    pub fn kinds(&self) -> Vec<DatabaseKind> {
        let mut kinds: Vec<_> = self.templates.keys().copied().collect();
        kinds.sort();
        kinds
    }
}

impl Default for TemplateRegistry {
    fn default() -> Self {
        let mut registry = Self::new();
        registry.register(Arc::new(Neo4jTemplate));
        registry.register(Arc::new(MemgraphTemplate));
        registry.register(Arc::new(JanusGraphTemplate));
        registry
    }
}

fn preload_service(
    replica: &ReplicaSpec,
    ctx: &RenderContext<'_>,
    image: &str,
    command: Vec<String>,
) -> ServiceDefinition {
    let name = format!("{}{}", PRELOAD_PREFIX, replica.index + 1);
    ServiceDefinition {
        key: name.clone(),
        container_name: name,
        image: Some(image.to_string()),
        command,
        volumes: vec![format!("{}:/import:ro", ctx.preload_dir.join("data").display())],
        depends_on: vec![Dependency {
            service: replica.database_name.clone(),
            condition: DependencyCondition::Healthy,
        }],
        networks: vec![replica.network_name.clone()],
        one_shot: true,
        ..Default::default()
    }
}

fn shell(script: String) -> Vec<String> {
    vec!["sh".to_string(), "-c".to_string(), script]
}

pub struct Neo4jTemplate;

impl Neo4jTemplate {
    const IMAGE: &'static str = "neo4j:4.4.24";
    const BOLT_PORT: u16 = 7687;
    const BROWSER_PORT: u16 = 7474;
}

impl DatabaseTemplate for Neo4jTemplate {
    fn kind(&self) -> DatabaseKind {
        DatabaseKind::Neo4j
    }

    fn render(&self, replica: &ReplicaSpec, ctx: &RenderContext<'_>) -> RenderedDatabase {
        let db = &replica.database_name;
        let password = &replica.credentials.password;

        let database = ServiceDefinition {
            key: db.clone(),
            container_name: db.clone(),
            image: Some(Self::IMAGE.to_string()),
            ports: vec![
                PortMapping {
                    host: replica.ports.website,
                    container: Self::BROWSER_PORT,
                },
                PortMapping {
                    host: replica.ports.protocol,
                    container: Self::BOLT_PORT,
                },
            ],
            environment: vec![
                EnvVar::new("NEO4JLABS_PLUGINS", r#"["apoc", "graph-data-science"]"#),
                EnvVar::new("NEO4J_AUTH", "none"),
            ],
            ulimit_nofile: Some(40000),
            healthcheck: Some(HealthCheck {
                test: vec![
                    "CMD".to_string(),
                    "bash".to_string(),
                    "-c".to_string(),
                    format!("cypher-shell -u neo4j -p {} 'RETURN 1'", password),
                ],
                interval: "10s".to_string(),
                timeout: "5s".to_string(),
                retries: 10,
                start_period: None,
            }),
            networks: vec![replica.network_name.clone()],
            ..Default::default()
        };

        let mut services = vec![database];
        let preload = ctx.preload.then(|| {
            let job = preload_service(
                replica,
                ctx,
                Self::IMAGE,
                shell(format!(
                    "cypher-shell -a bolt://{}:{} -u {} -p {} -f /import/seed.cypher",
                    db,
                    Self::BOLT_PORT,
                    replica.credentials.user,
                    password
                )),
            );
            let key = job.key.clone();
            services.push(job);
            key
        });

        RenderedDatabase {
            services,
            primary: db.clone(),
            uri: format!("bolt://{}:{}", db, Self::BOLT_PORT),
            preload,
        }
    }
}

pub struct MemgraphTemplate;

impl MemgraphTemplate {
    const IMAGE: &'static str = "memgraph/memgraph:latest";
    const LAB_IMAGE: &'static str = "memgraph/lab";
    const BOLT_PORT: u16 = 7687;
    const LAB_PORT: u16 = 3000;
}

impl DatabaseTemplate for MemgraphTemplate {
    fn kind(&self) -> DatabaseKind {
        DatabaseKind::Memgraph
    }

    fn render(&self, replica: &ReplicaSpec, ctx: &RenderContext<'_>) -> RenderedDatabase {
        let db = &replica.database_name;
        let lab = format!("lab{}", replica.index + 1);

        let database = ServiceDefinition {
            key: db.clone(),
            container_name: db.clone(),
            image: Some(Self::IMAGE.to_string()),
            command: vec!["--log-level=TRACE".to_string()],
            pull_always: true,
            ports: vec![PortMapping {
                host: replica.ports.protocol,
                container: Self::BOLT_PORT,
            }],
            healthcheck: Some(HealthCheck {
                test: vec![
                    "CMD-SHELL".to_string(),
                    "echo 'RETURN 0;' | mgconsole || exit 1".to_string(),
                ],
                interval: "10s".to_string(),
                timeout: "5s".to_string(),
                retries: 3,
                start_period: Some("0s".to_string()),
            }),
            networks: vec![replica.network_name.clone()],
            ..Default::default()
        };

        let lab_service = ServiceDefinition {
            key: lab.clone(),
            container_name: lab,
            image: Some(Self::LAB_IMAGE.to_string()),
            pull_always: true,
            depends_on: vec![Dependency {
                service: db.clone(),
                condition: DependencyCondition::Healthy,
            }],
            ports: vec![PortMapping {
                host: replica.ports.website,
                container: Self::LAB_PORT,
            }],
            environment: vec![
                EnvVar::new("QUICK_CONNECT_MG_HOST", db.clone()),
                EnvVar::new("QUICK_CONNECT_MG_PORT", Self::BOLT_PORT.to_string()),
            ],
            networks: vec![replica.network_name.clone()],
            ..Default::default()
        };

        let mut services = vec![database, lab_service];
        let preload = ctx.preload.then(|| {
            let job = preload_service(
                replica,
                ctx,
                Self::IMAGE,
                shell(format!(
                    "mgconsole --host {} --port {} < /import/seed.cypherl",
                    db,
                    Self::BOLT_PORT
                )),
            );
            let key = job.key.clone();
            services.push(job);
            key
        });

        RenderedDatabase {
            services,
            primary: db.clone(),
            uri: format!("bolt://{}:{}", db, Self::BOLT_PORT),
            preload,
        }
    }
}

pub struct JanusGraphTemplate;

impl JanusGraphTemplate {
    const IMAGE: &'static str = "docker.io/janusgraph/janusgraph:latest";
    const GREMLIN_PORT: u16 = 8182;
}

impl DatabaseTemplate for JanusGraphTemplate {
    fn kind(&self) -> DatabaseKind {
        DatabaseKind::JanusGraph
    }

    fn render(&self, replica: &ReplicaSpec, ctx: &RenderContext<'_>) -> RenderedDatabase {
        let db = &replica.database_name;

        let database = ServiceDefinition {
            key: db.clone(),
            container_name: db.clone(),
            image: Some(Self::IMAGE.to_string()),
            ports: vec![PortMapping {
                host: replica.ports.protocol,
                container: Self::GREMLIN_PORT,
            }],
            healthcheck: Some(HealthCheck {
                test: vec![
                    "CMD-SHELL".to_string(),
                    "bin/gremlin.sh -e scripts/remote-connect.groovy".to_string(),
                ],
                interval: "25s".to_string(),
                timeout: "20s".to_string(),
                retries: 3,
                start_period: None,
            }),
            networks: vec![replica.network_name.clone()],
            ..Default::default()
        };

        let mut services = vec![database];
        let preload = ctx.preload.then(|| {
            let job = preload_service(
                replica,
                ctx,
                Self::IMAGE,
                vec![
                    "bin/gremlin.sh".to_string(),
                    "-e".to_string(),
                    "/import/seed.groovy".to_string(),
                ],
            );
            let key = job.key.clone();
            services.push(job);
            key
        });

        RenderedDatabase {
            services,
            primary: db.clone(),
            uri: format!("ws://{}:{}", db, Self::GREMLIN_PORT),
            preload,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{Credentials, PortAssignment};

    fn replica(kind: DatabaseKind, index: usize) -> ReplicaSpec {
        ReplicaSpec {
            index,
            database: kind,
            credentials: Credentials {
                user: "neo4j".to_string(),
                password: "hunter2".to_string(),
            },
            log_level: "info".to_string(),
            network_name: format!("Replica_net_{}", index + 1),
            container_name: format!("Replica{}", index + 1),
            app_name: format!("app{}", index + 1),
            database_name: format!("{}{}", kind, index + 1),
            leader_uri: "http://Replica1:3000".to_string(),
            self_uri: format!("http://Replica{}:3000", index + 1),
            ports: PortAssignment {
                website: 7400 + index as u16,
                protocol: 7600 + index as u16,
                app: 3000 + index as u16,
            },
        }
    }

    fn ctx(preload: bool) -> RenderContext<'static> {
        RenderContext {
            preload,
            preload_dir: Path::new("../scratch"),
        }
    }

    #[test]
    fn test_default_registry_covers_every_kind() {
        let registry = TemplateRegistry::default();
        assert_eq!(registry.kinds(), DatabaseKind::ALL.to_vec());
        for kind in DatabaseKind::ALL {
            assert_eq!(registry.get(kind).unwrap().kind(), kind);
        }
    }

    #[test]
    fn test_empty_registry_reports_missing_kind() {
        let registry = TemplateRegistry::new();
        let err = registry.get(DatabaseKind::Memgraph).err().unwrap();
        assert!(err.is_fatal());
    }

    #[test]
    fn test_neo4j_publishes_both_ports_and_health() {
        let rendered = Neo4jTemplate.render(&replica(DatabaseKind::Neo4j, 1), &ctx(false));
        assert_eq!(rendered.primary, "neo4j2");
        assert_eq!(rendered.uri, "bolt://neo4j2:7687");
        assert!(rendered.preload.is_none());

        let db = &rendered.services[0];
        assert_eq!(
            db.ports,
            vec![
                PortMapping { host: 7401, container: 7474 },
                PortMapping { host: 7601, container: 7687 },
            ]
        );
        let health = db.healthcheck.as_ref().unwrap();
        assert!(health.test[3].contains("hunter2"));
        assert_eq!(db.networks, vec!["Replica_net_2".to_string()]);
    }

    #[test]
    fn test_memgraph_lab_waits_for_database() {
        let rendered = MemgraphTemplate.render(&replica(DatabaseKind::Memgraph, 0), &ctx(false));
        assert_eq!(rendered.services.len(), 2);
        let lab = &rendered.services[1];
        assert_eq!(lab.key, "lab1");
        assert_eq!(lab.depends_on[0].service, "memgraph1");
        assert_eq!(lab.depends_on[0].condition, DependencyCondition::Healthy);
        assert_eq!(lab.ports[0].host, 7400);
        assert_eq!(lab.env("QUICK_CONNECT_MG_HOST"), Some("memgraph1"));
    }

    #[test]
    fn test_janusgraph_uses_gremlin_websocket() {
        let rendered =
            JanusGraphTemplate.render(&replica(DatabaseKind::JanusGraph, 2), &ctx(false));
        assert_eq!(rendered.uri, "ws://janusgraph3:8182");
        assert_eq!(rendered.services[0].ports[0].host, 7602);
    }

    #[test]
    fn test_preload_adds_one_shot_job() {
        for kind in DatabaseKind::ALL {
            let template = TemplateRegistry::default().get(kind).unwrap();
            let rendered = template.render(&replica(kind, 0), &ctx(true));
            let key = rendered.preload.clone().unwrap();
            assert_eq!(key, "preload1");

            let job = rendered.services.iter().find(|s| s.key == key).unwrap();
            assert!(job.one_shot);
            assert_eq!(job.depends_on[0].service, rendered.primary);
            assert_eq!(job.volumes, vec!["../scratch/data:/import:ro".to_string()]);
        }
    }
}
