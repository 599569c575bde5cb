//! Desired fleet shape derived from configuration
//!
//! `compute_topology` is pure: the same configuration always produces the
//! same topology. Names, networks and ports are deterministic functions of a
//! replica's index, and replica 0 is the leader for the lifetime of the fleet.

use std::collections::HashSet;

use crate::config::{
    FleetConfig, APP_CONTAINER_PORT, APP_PREFIX, PROVIDER_CONTAINER, PROVIDER_NETWORK,
    PROVIDER_UNIT, REPLICA_NETWORK_PREFIX, REPLICA_PREFIX, SHARED_NETWORK,
};
use crate::error::{FleetError, FleetResult};
use crate::types::{
    Credentials, DatabaseKind, FleetTopology, PortAssignment, ProviderSpec, ReplicaSpec,
};

/// Unit and application container name of the replica at `index`
pub fn replica_name(index: usize) -> String {
    format!("{}{}", REPLICA_PREFIX, index + 1)
}

pub fn replica_network(index: usize) -> String {
    format!("{}{}", REPLICA_NETWORK_PREFIX, index + 1)
}

pub fn app_name(index: usize) -> String {
    format!("{}{}", APP_PREFIX, index + 1)
}

pub fn database_name(kind: DatabaseKind, index: usize) -> String {
    format!("{}{}", kind, index + 1)
}

/// Address of a replica's application inside the shared network
pub fn replica_uri(index: usize) -> String {
    format!("http://{}:{}", replica_name(index), APP_CONTAINER_PORT)
}

fn offset_port(base: u16, index: usize, field: &str) -> FleetResult<u16> {
    u16::try_from(index)
        .ok()
        .and_then(|i| base.checked_add(i))
        .ok_or_else(|| {
            FleetError::ConfigError(format!(
                "{} {} leaves no room for replica {}",
                field,
                base,
                index + 1
            ))
        })
}

/// Derive the desired fleet from a configuration record
pub fn compute_topology(config: &FleetConfig) -> FleetResult<FleetTopology> {
    if config.dbs.is_empty() {
        return Err(FleetError::ConfigError(
            "At least one database must be configured".to_string(),
        ));
    }

    let leader_uri = replica_uri(0);
    let mut replicas = Vec::with_capacity(config.dbs.len());

    for (index, db) in config.dbs.iter().enumerate() {
        let database: DatabaseKind = db
            .database
            .parse()
            .map_err(|e: FleetError| match e {
                FleetError::ConfigError(msg) => {
                    FleetError::ConfigError(format!("dbs[{}]: {}", index, msg))
                }
                other => other,
            })?;

        let ports = PortAssignment {
            website: offset_port(config.base_website_port, index, "base_website_port")?,
            protocol: offset_port(config.base_protocol_port, index, "base_protocol_port")?,
            app: offset_port(config.base_app_port, index, "base_app_port")?,
        };

        replicas.push(ReplicaSpec {
            index,
            database,
            credentials: Credentials {
                user: db.user.clone(),
                password: db.password.clone(),
            },
            log_level: db.app_log_level.clone(),
            network_name: replica_network(index),
            container_name: replica_name(index),
            app_name: app_name(index),
            database_name: database_name(database, index),
            leader_uri: leader_uri.clone(),
            self_uri: replica_uri(index),
            ports,
        });
    }

    let provider = config.provider_port.map(|port| ProviderSpec {
        port,
        network_name: PROVIDER_NETWORK.to_string(),
        container_name: PROVIDER_CONTAINER.to_string(),
        unit_name: PROVIDER_UNIT.to_string(),
    });

    check_port_collisions(&replicas, provider.as_ref())?;

    Ok(FleetTopology {
        replicas,
        shared_network: SHARED_NETWORK.to_string(),
        provider,
        preload: config.preload_enabled(),
    })
}

fn check_port_collisions(
    replicas: &[ReplicaSpec],
    provider: Option<&ProviderSpec>,
) -> FleetResult<()> {
    let mut seen = HashSet::new();
    let replica_ports = replicas
        .iter()
        .flat_map(|r| r.ports.all().into_iter().map(move |p| (p, r.container_name.as_str())));
    let provider_port = provider.map(|p| (p.port, p.container_name.as_str()));

    for (port, owner) in replica_ports.chain(provider_port) {
        if !seen.insert(port) {
            return Err(FleetError::ConfigError(format!(
                "Host port {} for {} collides with another unit; base ports overlap for {} replicas",
                port,
                owner,
                replicas.len()
            )));
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{FaultInjectionConfig, ReplicaConfig};

    fn config_with(databases: &[&str]) -> FleetConfig {
        FleetConfig {
            dbs: databases
                .iter()
                .map(|db| ReplicaConfig {
                    database: db.to_string(),
                    user: "neo4j".to_string(),
                    password: "password".to_string(),
                    app_log_level: "info".to_string(),
                })
                .collect(),
            base_website_port: 7400,
            base_protocol_port: 7600,
            base_app_port: 3000,
            provider_port: None,
            preload_data: None,
            fault_injection: FaultInjectionConfig::default(),
        }
    }

    #[test]
    fn test_three_replicas_named_in_order() {
        let topology = compute_topology(&config_with(&["neo4j", "neo4j", "neo4j"])).unwrap();
        let names: Vec<_> = topology.replicas.iter().map(|r| r.container_name.as_str()).collect();
        assert_eq!(names, vec!["Replica1", "Replica2", "Replica3"]);
        assert_eq!(
            topology.replica_networks(),
            vec!["Replica_net_1", "Replica_net_2", "Replica_net_3"]
        );
        assert_eq!(topology.shared_network, "Shared_net");
        assert_eq!(topology.replicas[2].database_name, "neo4j3");
        assert_eq!(topology.replicas[2].app_name, "app3");
    }

    #[test]
    fn test_leader_uri_points_at_first_replica() {
        let topology = compute_topology(&config_with(&["neo4j", "memgraph", "janusgraph"])).unwrap();
        let leader = topology.leader().unwrap();
        assert!(leader.is_leader());
        assert_eq!(leader.self_uri, "http://Replica1:3000");
        for replica in &topology.replicas {
            assert_eq!(replica.leader_uri, leader.self_uri);
        }
        assert_eq!(topology.replicas[1].self_uri, "http://Replica2:3000");
    }

    #[test]
    fn test_ports_offset_by_index() {
        let topology = compute_topology(&config_with(&["neo4j", "memgraph"])).unwrap();
        let second = &topology.replicas[1];
        assert_eq!(second.ports.website, 7401);
        assert_eq!(second.ports.protocol, 7601);
        assert_eq!(second.ports.app, 3001);
    }

    #[test]
    fn test_unsupported_database_rejected() {
        let err = compute_topology(&config_with(&["neo4j", "cassandra"])).unwrap_err();
        assert!(err.is_fatal());
        assert!(err.to_string().contains("dbs[1]"));
        assert!(err.to_string().contains("cassandra"));
    }

    #[test]
    fn test_empty_config_rejected() {
        assert!(compute_topology(&config_with(&[])).is_err());
    }

    #[test]
    fn test_port_overflow_rejected() {
        let mut config = config_with(&["neo4j", "neo4j"]);
        config.base_app_port = u16::MAX;
        let err = compute_topology(&config).unwrap_err();
        assert!(err.to_string().contains("base_app_port"));
    }

    #[test]
    fn test_overlapping_port_ranges_rejected() {
        let mut config = config_with(&["neo4j", "neo4j", "neo4j"]);
        config.base_protocol_port = 7402;
        let err = compute_topology(&config).unwrap_err();
        assert!(err.to_string().contains("collides"));
    }

    #[test]
    fn test_provider_port_collision_rejected() {
        let mut config = config_with(&["neo4j"]);
        config.provider_port = Some(3000);
        assert!(compute_topology(&config).is_err());
    }

    #[test]
    fn test_provider_and_preload() {
        let mut config = config_with(&["memgraph"]);
        config.provider_port = Some(1234);
        config.preload_data = Some(true);
        let topology = compute_topology(&config).unwrap();
        let provider = topology.provider.as_ref().unwrap();
        assert_eq!(provider.port, 1234);
        assert_eq!(provider.network_name, "Provider_net");
        assert_eq!(provider.unit_name, "Provider");
        assert!(topology.preload);
    }

    #[test]
    fn test_compute_is_deterministic() {
        let config = config_with(&["neo4j", "memgraph", "janusgraph"]);
        assert_eq!(compute_topology(&config).unwrap(), compute_topology(&config).unwrap());
    }
}
