//! End-to-end artifact generation into compose files on disk

use fleetlab_core::{
    config::{FleetConfig, RunConfig},
    generator::ArtifactGenerator,
    network::NetworkManager,
    reconciler::FleetReconciler,
    runtime::ArtifactStore,
    templates::TemplateRegistry,
    test_helpers::FakeRuntime,
    topology::compute_topology,
};
use fleetlab_docker::ComposeStore;
use pretty_assertions::assert_eq;
use serde_yaml::Value;
use std::fs;
use std::sync::Arc;
use tempfile::TempDir;

const CONFIG: &str = r#"{
    "dbs": [
        {"database": "neo4j", "user": "neo4j", "password": "password"},
        {"database": "memgraph", "user": "memgraph", "password": "password", "app_log_level": "debug"},
        {"database": "janusgraph", "user": "janus", "password": "password"}
    ],
    "base_website_port": 7400,
    "base_protocol_port": 7600,
    "base_app_port": 3000,
    "provider_port": 1234,
    "preload_data": true
}"#;

struct Setup {
    _dir: TempDir,
    store: Arc<ComposeStore>,
    reconciler: FleetReconciler,
}

fn setup() -> Setup {
    let dir = TempDir::new().unwrap();
    let run = RunConfig::default().with_artifact_dir(dir.path());
    let store = Arc::new(ComposeStore::new(dir.path()).unwrap());
    let runtime = Arc::new(FakeRuntime::new());
    let networks = Arc::new(NetworkManager::new(runtime.clone()));
    let generator = ArtifactGenerator::new(
        Arc::new(TemplateRegistry::default()),
        store.clone(),
        networks.clone(),
        run.clone(),
    );
    let reconciler = FleetReconciler::new(runtime, store.clone(), generator, networks, run);
    Setup {
        _dir: dir,
        store,
        reconciler,
    }
}

fn load(store: &ComposeStore, key: &str) -> Value {
    let contents = fs::read_to_string(store.locate(key).path()).unwrap();
    serde_yaml::from_str(&contents).unwrap()
}

#[tokio::test]
async fn test_generated_files_are_valid_compose() {
    let setup = setup();
    let config = FleetConfig::from_json_str(CONFIG).unwrap();
    let topology = compute_topology(&config).unwrap();

    let units = setup.reconciler.generate(&topology).await.unwrap().units;
    assert_eq!(units.len(), 4);

    for unit in &units {
        assert_eq!(setup.store.read_name(&unit.artifact).unwrap(), unit.name);
    }

    let second = load(&setup.store, "2");
    assert_eq!(second["name"], "Replica2");
    let app = &second["services"]["app2"];
    assert_eq!(app["container_name"], "Replica2");
    assert_eq!(app["ports"][0], "3001:3000");
    assert_eq!(app["environment"]["DATABASE"], "MEMGRAPH");
    assert_eq!(app["environment"]["LOG_LEVEL"], "debug");
    assert_eq!(app["environment"]["LEADER_URI"], "http://Replica1:3000");
    assert_eq!(app["environment"]["MY_URI"], "http://Replica2:3000");
    assert_eq!(app["depends_on"]["memgraph2"]["condition"], "service_healthy");
    assert_eq!(
        app["depends_on"]["preload2"]["condition"],
        "service_completed_successfully"
    );
    assert_eq!(second["networks"]["Shared_net"]["external"], true);
    assert_eq!(second["networks"]["Replica_net_2"]["external"], true);
    assert!(second["networks"]["Replica_net_2"].get("driver").is_none());

    let provider = load(&setup.store, "provider");
    assert_eq!(provider["name"], "Provider");
    assert_eq!(provider["services"]["wsserver"]["ports"][0], "1234:1234");
    assert_eq!(provider["networks"]["Replica_net_3"]["external"], true);
}

#[tokio::test]
async fn test_regeneration_removes_stale_files() {
    let setup = setup();
    let config = FleetConfig::from_json_str(CONFIG).unwrap();
    setup
        .reconciler
        .generate(&compute_topology(&config).unwrap())
        .await
        .unwrap();

    let mut smaller = config.clone();
    smaller.dbs.truncate(1);
    smaller.provider_port = None;
    setup
        .reconciler
        .generate(&compute_topology(&smaller).unwrap())
        .await
        .unwrap();

    let remaining = setup.store.list().unwrap();
    assert_eq!(remaining, vec![setup.store.locate("1")]);
}
