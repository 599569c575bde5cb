//! Reconciler behaviour against the in-memory runtime
#![cfg(feature = "test-helpers")]

use fleetlab_core::{
    config::{FaultInjectionConfig, FleetConfig, ReplicaConfig, RunConfig},
    error::FleetError,
    generator::ArtifactGenerator,
    network::NetworkManager,
    reconciler::FleetReconciler,
    runtime::ArtifactStore,
    templates::TemplateRegistry,
    test_helpers::{FakeRuntime, MemoryArtifactStore, RuntimeCall},
    topology::compute_topology,
    types::{FleetTopology, PruneTarget, RuntimeUnit, StopOptions},
};
use pretty_assertions::assert_eq;
use std::sync::Arc;

struct Harness {
    runtime: Arc<FakeRuntime>,
    store: Arc<MemoryArtifactStore>,
    reconciler: FleetReconciler,
}

fn harness(run: RunConfig) -> Harness {
    let store = Arc::new(MemoryArtifactStore::new());
    let runtime = Arc::new(FakeRuntime::with_store(store.clone()));
    let networks = Arc::new(NetworkManager::new(runtime.clone()));
    let generator = ArtifactGenerator::new(
        Arc::new(TemplateRegistry::default()),
        store.clone(),
        networks.clone(),
        run.clone(),
    );
    let reconciler = FleetReconciler::new(runtime.clone(), store.clone(), generator, networks, run);
    Harness {
        runtime,
        store,
        reconciler,
    }
}

fn topology(databases: &[&str], provider_port: Option<u16>) -> FleetTopology {
    let config = FleetConfig {
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
        provider_port,
        preload_data: None,
        fault_injection: FaultInjectionConfig::default(),
    };
    compute_topology(&config).unwrap()
}

fn started_names(h: &Harness) -> Vec<String> {
    h.runtime
        .started()
        .iter()
        .map(|a| h.store.read_name(a).unwrap())
        .collect()
}

#[tokio::test]
async fn test_three_replicas_start_in_order() {
    let h = harness(RunConfig::default());
    let topology = topology(&["neo4j", "neo4j", "neo4j"], None);

    let report = h.reconciler.reconcile(&topology).await.unwrap();

    assert_eq!(report.started, vec!["Replica1", "Replica2", "Replica3"]);
    assert!(report.is_success());
    assert_eq!(started_names(&h), vec!["Replica1", "Replica2", "Replica3"]);
    assert_eq!(h.store.len(), 3);
    for key in ["1", "2", "3"] {
        let unit = h.store.get(key).unwrap();
        assert_eq!(unit.name, format!("Replica{}", key));
    }
}

#[tokio::test]
async fn test_second_reconcile_starts_nothing() {
    let h = harness(RunConfig::default());
    let topology = topology(&["neo4j", "memgraph"], None);

    h.reconciler.reconcile(&topology).await.unwrap();
    h.runtime.clear_calls();
    let report = h.reconciler.reconcile(&topology).await.unwrap();

    assert!(report.started.is_empty());
    assert_eq!(report.already_running, vec!["Replica1", "Replica2"]);
    assert!(h.runtime.started().is_empty());
}

#[tokio::test]
async fn test_only_missing_replicas_are_started() {
    let h = harness(RunConfig::default());
    h.runtime.set_running("Replica2");
    let topology = topology(&["neo4j", "neo4j", "neo4j"], None);

    let report = h.reconciler.reconcile(&topology).await.unwrap();

    assert_eq!(report.started, vec!["Replica1", "Replica3"]);
    assert_eq!(report.already_running, vec!["Replica2"]);
    assert_eq!(started_names(&h), vec!["Replica1", "Replica3"]);
}

#[tokio::test]
async fn test_observed_state_is_recorded_before_starting() {
    let h = harness(RunConfig::default());
    h.runtime.set_running("Replica1");
    let topology = topology(&["neo4j", "memgraph"], None);

    let report = h.reconciler.reconcile(&topology).await.unwrap();

    assert_eq!(
        report.observed,
        vec![
            RuntimeUnit {
                name: "Replica1".to_string(),
                is_running: true,
            },
            RuntimeUnit {
                name: "Replica2".to_string(),
                is_running: false,
            },
        ]
    );
    assert_eq!(report.started, vec!["Replica2"]);
}

#[tokio::test]
async fn test_shrinking_fleet_removes_stale_artifacts() {
    let h = harness(RunConfig::default());
    h.reconciler
        .reconcile(&topology(&["neo4j", "neo4j", "neo4j"], None))
        .await
        .unwrap();

    let report = h
        .reconciler
        .reconcile(&topology(&["neo4j", "neo4j"], None))
        .await
        .unwrap();

    assert_eq!(report.removed_artifacts, vec![h.store.locate("3")]);
    assert_eq!(h.store.len(), 2);
    assert!(h.store.get("3").is_none());
}

#[tokio::test]
async fn test_provider_generated_but_not_started_by_default() {
    let h = harness(RunConfig::default());
    let topology = topology(&["neo4j", "neo4j"], Some(1234));

    let report = h.reconciler.reconcile(&topology).await.unwrap();

    assert_eq!(h.store.len(), 3);
    assert!(h.store.get("provider").is_some());
    assert_eq!(report.started, vec!["Replica1", "Replica2"]);
}

#[tokio::test]
async fn test_dropping_provider_removes_its_artifact() {
    let h = harness(RunConfig::default());
    h.reconciler
        .reconcile(&topology(&["neo4j", "neo4j"], Some(1234)))
        .await
        .unwrap();
    assert_eq!(h.store.len(), 3);

    let report = h
        .reconciler
        .reconcile(&topology(&["neo4j", "neo4j"], None))
        .await
        .unwrap();

    assert_eq!(report.removed_artifacts, vec![h.store.locate("provider")]);
    assert_eq!(h.store.len(), 2);
    assert!(h.store.get("provider").is_none());
}

#[tokio::test]
async fn test_unwritable_unit_keeps_previous_artifact() {
    let h = harness(RunConfig::default());
    let topology = topology(&["neo4j", "neo4j", "neo4j"], None);
    h.reconciler.generate(&topology).await.unwrap();
    h.store.fail_write("2");

    let report = h.reconciler.reconcile(&topology).await.unwrap();

    assert_eq!(report.started, vec!["Replica1", "Replica3"]);
    assert!(report.removed_artifacts.is_empty());
    assert_eq!(report.failed.len(), 1);
    let (name, err) = &report.failed[0];
    assert_eq!(name, "Replica2");
    assert!(matches!(err, FleetError::IoError(_)));
    assert!(h.store.get("2").is_some());
    assert!(!report.is_success());
}

#[tokio::test]
async fn test_provider_started_last_when_enabled() {
    let h = harness(RunConfig::default().with_start_provider(true));
    let topology = topology(&["neo4j", "neo4j"], Some(1234));

    let report = h.reconciler.reconcile(&topology).await.unwrap();

    assert_eq!(report.started, vec!["Replica1", "Replica2", "Provider"]);
    assert!(h.runtime.networks().contains(&"Shared_net".to_string()));
}

#[tokio::test]
async fn test_unreadable_artifact_is_skipped() {
    let h = harness(RunConfig::default());
    h.store.make_unreadable("2");
    let topology = topology(&["neo4j", "neo4j", "neo4j"], None);

    let report = h.reconciler.reconcile(&topology).await.unwrap();

    assert_eq!(report.skipped, vec![h.store.locate("2")]);
    assert_eq!(report.started, vec!["Replica1", "Replica3"]);
    assert!(!report.is_success());
}

#[tokio::test]
async fn test_failed_start_does_not_stop_the_pass() {
    let h = harness(RunConfig::default());
    h.runtime.fail_start("Replica1");
    let topology = topology(&["neo4j", "neo4j", "neo4j"], None);

    let report = h.reconciler.reconcile(&topology).await.unwrap();

    assert_eq!(report.started, vec!["Replica2", "Replica3"]);
    assert_eq!(report.failed.len(), 1);
    let (name, err) = &report.failed[0];
    assert_eq!(name, "Replica1");
    assert!(matches!(err, FleetError::Execution { exit_code: Some(1), .. }));
    assert!(!err.is_fatal());
}

#[tokio::test]
async fn test_reconcile_creates_every_network() {
    let h = harness(RunConfig::default());
    let topology = topology(&["neo4j", "janusgraph"], None);

    h.reconciler.reconcile(&topology).await.unwrap();

    assert_eq!(
        h.runtime.networks(),
        vec!["Replica_net_1", "Replica_net_2", "Shared_net"]
    );
}

#[tokio::test]
async fn test_generate_does_not_start_units() {
    let h = harness(RunConfig::default());
    let topology = topology(&["neo4j", "neo4j"], None);

    let generation = h.reconciler.generate(&topology).await.unwrap();

    assert_eq!(generation.units.len(), 2);
    assert!(generation.failed.is_empty());
    assert!(h.runtime.started().is_empty());
}

#[tokio::test]
async fn test_down_stops_units_and_removes_private_networks() {
    let h = harness(RunConfig::default());
    let topology = topology(&["neo4j", "neo4j", "neo4j"], None);
    h.reconciler.reconcile(&topology).await.unwrap();

    let report = h.reconciler.down(&topology).await;

    assert_eq!(report.stopped, 3);
    assert_eq!(report.networks_removed, 3);
    assert!(report.failures.is_empty());
    assert_eq!(h.runtime.networks(), vec!["Shared_net"]);
    assert!(h.runtime.running_projects().is_empty());

    let stops = h
        .runtime
        .calls_matching(|c| matches!(c, RuntimeCall::StopUnit(_, _)));
    assert_eq!(stops.len(), 3);
    for call in stops {
        if let RuntimeCall::StopUnit(_, options) = call {
            assert_eq!(options, StopOptions::default());
            assert!(!options.remove_volumes);
        }
    }
}

#[tokio::test]
async fn test_down_continues_past_missing_networks() {
    let h = harness(RunConfig::default());
    let topology = topology(&["neo4j", "neo4j"], None);

    let report = h.reconciler.down(&topology).await;

    assert_eq!(report.stopped, 2);
    assert_eq!(report.networks_removed, 0);
    assert_eq!(report.failures.len(), 2);
}

#[tokio::test]
async fn test_force_clean_purges_units_and_leftovers() {
    let h = harness(RunConfig::default());
    let topology = topology(&["neo4j", "memgraph"], Some(1234));
    h.reconciler.reconcile(&topology).await.unwrap();
    h.runtime.add_container("neo4j1", true);
    h.runtime.add_container("memgraph2", true);
    h.runtime.add_container("lab2", false);
    h.runtime.add_container("Replica7", false);
    h.runtime.add_container("postgres", true);
    h.runtime.add_network("Provider_net");
    h.runtime.clear_calls();

    let report = h.reconciler.force_clean(&topology).await;

    assert_eq!(report.units_stopped, 3);
    let stops = h
        .runtime
        .calls_matching(|c| matches!(c, RuntimeCall::StopUnit(_, _)));
    assert_eq!(
        stops,
        vec![
            RuntimeCall::StopUnit(h.store.locate("1"), StopOptions::purge()),
            RuntimeCall::StopUnit(h.store.locate("2"), StopOptions::purge()),
            RuntimeCall::StopUnit(h.store.locate("provider"), StopOptions::purge()),
        ]
    );
    assert_eq!(
        report.containers_removed,
        vec!["Replica7", "lab2", "memgraph2", "neo4j1"]
    );
    assert_eq!(h.runtime.containers(), vec!["postgres"]);
    assert_eq!(h.runtime.networks(), vec!["Shared_net"]);
    assert_eq!(
        report.pruned,
        vec![PruneTarget::Containers, PruneTarget::Images, PruneTarget::Volumes]
    );
}

#[tokio::test]
async fn test_rebuild_restarts_every_replica() {
    let h = harness(RunConfig::default());
    let topology = topology(&["neo4j", "neo4j"], None);
    h.reconciler.reconcile(&topology).await.unwrap();
    h.runtime.clear_calls();

    let (down, up) = h.reconciler.rebuild(&topology).await.unwrap();

    assert_eq!(down.stopped, 2);
    assert_eq!(up.started, vec!["Replica1", "Replica2"]);
    assert_eq!(
        h.runtime.networks(),
        vec!["Replica_net_1", "Replica_net_2", "Shared_net"]
    );
}
