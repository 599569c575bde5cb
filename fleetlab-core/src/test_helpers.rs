//! In-memory fakes for the runtime and the artifact store
//!
//! `FakeRuntime` models just enough of a container engine to drive the
//! reconciler, the cleanup sweep and the fault injector: networks, containers,
//! running projects, per-unit addresses and iptables drop rules. Every call is
//! recorded so tests can assert on exactly what was issued.

use async_trait::async_trait;
use parking_lot::Mutex;
use std::collections::{BTreeMap, BTreeSet, HashMap, HashSet, VecDeque};
use std::net::IpAddr;
use std::sync::Arc;

use crate::error::{FleetError, FleetResult};
use crate::runtime::{ArtifactStore, ContainerRuntime};
use crate::types::{ArtifactRef, PruneTarget, StartOptions, StopOptions, UnitDefinition};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RuntimeCall {
    CreateNetwork(String),
    RemoveNetwork(String),
    ListNetworks,
    ListRunningUnits,
    ListAllUnits,
    IsUnitRunning(String),
    StartUnit(ArtifactRef, StartOptions),
    StopUnit(ArtifactRef, StopOptions),
    RemoveUnit(String),
    Disconnect { unit: String, network: String },
    Connect { unit: String, network: String },
    ResolveAddress { unit: String, network: String },
    Exec { unit: String, command: Vec<String> },
    Prune(PruneTarget),
}

#[derive(Default)]
struct FakeState {
    networks: BTreeSet<String>,
    containers: BTreeMap<String, bool>,
    running_projects: BTreeSet<String>,
    addresses: HashMap<String, IpAddr>,
    disconnected: BTreeSet<(String, String)>,
    drop_rules: BTreeSet<(String, String)>,
    scripted_running: VecDeque<Vec<String>>,
    calls: Vec<RuntimeCall>,
    failing_networks: HashSet<String>,
    failing_starts: HashSet<String>,
    fail_disconnect: bool,
    fail_connect: bool,
    fail_rule_insert: bool,
    fail_rule_delete: bool,
    fail_list: bool,
}

pub struct FakeRuntime {
    state: Mutex<FakeState>,
    store: Option<Arc<MemoryArtifactStore>>,
}

fn simulated_failure(command: &str) -> FleetError {
    FleetError::Execution {
        command: command.to_string(),
        exit_code: Some(1),
        stdout: String::new(),
        stderr: format!("simulated failure: {}", command),
    }
}

impl Default for FakeRuntime {
    fn default() -> Self {
        Self::new()
    }
}

impl FakeRuntime {
    pub fn new() -> Self {
        Self {
            state: Mutex::new(FakeState::default()),
            store: None,
        }
    }

    /// Resolve unit names for start/stop through a store, like the real engine reading the file
    pub fn with_store(store: Arc<MemoryArtifactStore>) -> Self {
        Self {
            state: Mutex::new(FakeState::default()),
            store: Some(store),
        }
    }

    /// Mark a unit as running, both as a project and as a container
    pub fn set_running(&self, name: &str) {
        let mut state = self.state.lock();
        state.running_projects.insert(name.to_string());
        state.containers.insert(name.to_string(), true);
    }

    pub fn add_container(&self, name: &str, running: bool) {
        self.state.lock().containers.insert(name.to_string(), running);
    }

    pub fn add_network(&self, name: &str) {
        self.state.lock().networks.insert(name.to_string());
    }

    pub fn set_address(&self, unit: &str, address: IpAddr) {
        self.state.lock().addresses.insert(unit.to_string(), address);
    }

    /// Queue responses for successive `list_running_units` calls
    pub fn script_running(&self, rounds: Vec<Vec<&str>>) {
        let mut state = self.state.lock();
        for round in rounds {
            state
                .scripted_running
                .push_back(round.into_iter().map(String::from).collect());
        }
    }

    pub fn fail_network(&self, name: &str) {
        self.state.lock().failing_networks.insert(name.to_string());
    }

    pub fn fail_start(&self, unit: &str) {
        self.state.lock().failing_starts.insert(unit.to_string());
    }

    pub fn set_fail_disconnect(&self, fail: bool) {
        self.state.lock().fail_disconnect = fail;
    }

    pub fn set_fail_connect(&self, fail: bool) {
        self.state.lock().fail_connect = fail;
    }

    pub fn set_fail_rule_insert(&self, fail: bool) {
        self.state.lock().fail_rule_insert = fail;
    }

    pub fn set_fail_rule_delete(&self, fail: bool) {
        self.state.lock().fail_rule_delete = fail;
    }

    pub fn set_fail_list(&self, fail: bool) {
        self.state.lock().fail_list = fail;
    }

    pub fn calls(&self) -> Vec<RuntimeCall> {
        self.state.lock().calls.clone()
    }

    pub fn calls_matching<F>(&self, predicate: F) -> Vec<RuntimeCall>
    where
        F: Fn(&RuntimeCall) -> bool,
    {
        self.state
            .lock()
            .calls
            .iter()
            .filter(|c| predicate(c))
            .cloned()
            .collect()
    }

    /// Artifacts passed to `start_unit`, in call order
    pub fn started(&self) -> Vec<ArtifactRef> {
        self.state
            .lock()
            .calls
            .iter()
            .filter_map(|c| match c {
                RuntimeCall::StartUnit(artifact, _) => Some(artifact.clone()),
                _ => None,
            })
            .collect()
    }

    pub fn clear_calls(&self) {
        self.state.lock().calls.clear();
    }

    pub fn networks(&self) -> Vec<String> {
        self.state.lock().networks.iter().cloned().collect()
    }

    pub fn containers(&self) -> Vec<String> {
        self.state.lock().containers.keys().cloned().collect()
    }

    pub fn running_projects(&self) -> Vec<String> {
        self.state.lock().running_projects.iter().cloned().collect()
    }

    pub fn disconnected(&self) -> Vec<(String, String)> {
        self.state.lock().disconnected.iter().cloned().collect()
    }

    pub fn drop_rules(&self) -> Vec<(String, String)> {
        self.state.lock().drop_rules.iter().cloned().collect()
    }

    fn record(&self, call: RuntimeCall) {
        self.state.lock().calls.push(call);
    }

    fn unit_name(&self, artifact: &ArtifactRef) -> String {
        match &self.store {
            Some(store) => store
                .read_name(artifact)
                .unwrap_or_else(|_| artifact.to_string()),
            None => artifact.to_string(),
        }
    }
}

#[async_trait]
impl ContainerRuntime for FakeRuntime {
    async fn create_network(&self, name: &str) -> FleetResult<()> {
        self.record(RuntimeCall::CreateNetwork(name.to_string()));
        let mut state = self.state.lock();
        if state.failing_networks.contains(name) {
            return Err(simulated_failure(&format!("network create {}", name)));
        }
        if !state.networks.insert(name.to_string()) {
            return Err(FleetError::AlreadyExists {
                resource: format!("network {}", name),
            });
        }
        Ok(())
    }

    async fn remove_network(&self, name: &str) -> FleetResult<()> {
        self.record(RuntimeCall::RemoveNetwork(name.to_string()));
        let mut state = self.state.lock();
        if state.failing_networks.contains(name) {
            return Err(simulated_failure(&format!("network rm {}", name)));
        }
        if state.networks.remove(name) {
            Ok(())
        } else {
            Err(FleetError::NotFound {
                resource: format!("network {}", name),
            })
        }
    }

    async fn list_networks(&self) -> FleetResult<Vec<String>> {
        self.record(RuntimeCall::ListNetworks);
        let state = self.state.lock();
        if state.fail_list {
            return Err(simulated_failure("network ls"));
        }
        Ok(state.networks.iter().cloned().collect())
    }

    async fn list_running_units(&self) -> FleetResult<Vec<String>> {
        self.record(RuntimeCall::ListRunningUnits);
        let mut state = self.state.lock();
        if state.fail_list {
            return Err(simulated_failure("ps"));
        }
        if let Some(round) = state.scripted_running.pop_front() {
            return Ok(round);
        }
        Ok(state
            .containers
            .iter()
            .filter(|(_, running)| **running)
            .map(|(name, _)| name.clone())
            .collect())
    }

    async fn list_all_units(&self) -> FleetResult<Vec<String>> {
        self.record(RuntimeCall::ListAllUnits);
        let state = self.state.lock();
        if state.fail_list {
            return Err(simulated_failure("ps -a"));
        }
        Ok(state.containers.keys().cloned().collect())
    }

    async fn is_unit_running(&self, name: &str) -> FleetResult<bool> {
        self.record(RuntimeCall::IsUnitRunning(name.to_string()));
        Ok(self.state.lock().running_projects.contains(name))
    }

    async fn start_unit(&self, artifact: &ArtifactRef, options: StartOptions) -> FleetResult<()> {
        self.record(RuntimeCall::StartUnit(artifact.clone(), options));
        let name = self.unit_name(artifact);
        let mut state = self.state.lock();
        if state.failing_starts.contains(&name) {
            return Err(simulated_failure(&format!("compose -f {} up", artifact)));
        }
        state.running_projects.insert(name.clone());
        state.containers.insert(name, true);
        Ok(())
    }

    async fn stop_unit(&self, artifact: &ArtifactRef, options: StopOptions) -> FleetResult<()> {
        self.record(RuntimeCall::StopUnit(artifact.clone(), options));
        let name = self.unit_name(artifact);
        let mut state = self.state.lock();
        state.running_projects.remove(&name);
        state.containers.remove(&name);
        Ok(())
    }

    async fn remove_unit(&self, name: &str) -> FleetResult<()> {
        self.record(RuntimeCall::RemoveUnit(name.to_string()));
        let mut state = self.state.lock();
        state.running_projects.remove(name);
        match state.containers.remove(name) {
            Some(_) => Ok(()),
            None => Err(FleetError::NotFound {
                resource: format!("container {}", name),
            }),
        }
    }

    async fn disconnect_from_network(&self, unit: &str, network: &str) -> FleetResult<()> {
        self.record(RuntimeCall::Disconnect {
            unit: unit.to_string(),
            network: network.to_string(),
        });
        let mut state = self.state.lock();
        if state.fail_disconnect {
            return Err(simulated_failure(&format!("network disconnect {} {}", network, unit)));
        }
        state
            .disconnected
            .insert((unit.to_string(), network.to_string()));
        Ok(())
    }

    async fn connect_to_network(&self, unit: &str, network: &str) -> FleetResult<()> {
        self.record(RuntimeCall::Connect {
            unit: unit.to_string(),
            network: network.to_string(),
        });
        let mut state = self.state.lock();
        if state.fail_connect {
            return Err(simulated_failure(&format!("network connect {} {}", network, unit)));
        }
        state
            .disconnected
            .remove(&(unit.to_string(), network.to_string()));
        Ok(())
    }

    async fn resolve_address(&self, unit: &str, network: &str) -> FleetResult<IpAddr> {
        self.record(RuntimeCall::ResolveAddress {
            unit: unit.to_string(),
            network: network.to_string(),
        });
        self.state
            .lock()
            .addresses
            .get(unit)
            .copied()
            .ok_or_else(|| FleetError::NotFound {
                resource: format!("address of {} in {}", unit, network),
            })
    }

    async fn exec_in_unit(&self, unit: &str, command: &[String]) -> FleetResult<String> {
        self.record(RuntimeCall::Exec {
            unit: unit.to_string(),
            command: command.to_vec(),
        });
        let mut state = self.state.lock();
        let args: Vec<&str> = command.iter().map(String::as_str).collect();
        match args.as_slice() {
            ["iptables", "-A", "OUTPUT", "-d", addr, "-j", "DROP"] => {
                if state.fail_rule_insert {
                    return Err(simulated_failure("iptables -A"));
                }
                state.drop_rules.insert((unit.to_string(), addr.to_string()));
                Ok(String::new())
            }
            ["iptables", "-D", "OUTPUT", "-d", addr, "-j", "DROP"] => {
                if state.fail_rule_delete {
                    return Err(simulated_failure("iptables -D"));
                }
                if state.drop_rules.remove(&(unit.to_string(), addr.to_string())) {
                    Ok(String::new())
                } else {
                    Err(simulated_failure("iptables -D: no such rule"))
                }
            }
            _ => Ok(String::new()),
        }
    }

    async fn prune(&self, target: PruneTarget) -> FleetResult<()> {
        self.record(RuntimeCall::Prune(target));
        if target == PruneTarget::Containers {
            self.state.lock().containers.retain(|_, running| *running);
        }
        Ok(())
    }
}

/// Artifact store keeping unit definitions in memory
#[derive(Default)]
pub struct MemoryArtifactStore {
    units: Mutex<BTreeMap<ArtifactRef, UnitDefinition>>,
    unreadable: Mutex<HashSet<ArtifactRef>>,
    unwritable: Mutex<HashSet<ArtifactRef>>,
}

impl MemoryArtifactStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make `read_name` fail for this key, as for a file with no name field
    pub fn make_unreadable(&self, key: &str) {
        self.unreadable.lock().insert(self.locate(key));
    }

    /// Make `write` fail for this key, as for a read-only file
    pub fn fail_write(&self, key: &str) {
        self.unwritable.lock().insert(self.locate(key));
    }

    pub fn get(&self, key: &str) -> Option<UnitDefinition> {
        self.units.lock().get(&self.locate(key)).cloned()
    }

    pub fn len(&self) -> usize {
        self.units.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.units.lock().is_empty()
    }
}

impl ArtifactStore for MemoryArtifactStore {
    fn write(&self, key: &str, unit: &UnitDefinition) -> FleetResult<ArtifactRef> {
        let artifact = self.locate(key);
        if self.unwritable.lock().contains(&artifact) {
            return Err(FleetError::IoError(std::io::Error::new(
                std::io::ErrorKind::PermissionDenied,
                format!("{} is read-only", artifact),
            )));
        }
        self.units.lock().insert(artifact.clone(), unit.clone());
        Ok(artifact)
    }

    fn locate(&self, key: &str) -> ArtifactRef {
        ArtifactRef::new(format!("memory/docker-compose.{}.yml", key))
    }

    fn list(&self) -> FleetResult<Vec<ArtifactRef>> {
        Ok(self.units.lock().keys().cloned().collect())
    }

    fn remove(&self, artifact: &ArtifactRef) -> FleetResult<()> {
        match self.units.lock().remove(artifact) {
            Some(_) => Ok(()),
            None => Err(FleetError::NotFound {
                resource: artifact.to_string(),
            }),
        }
    }

    fn read_name(&self, artifact: &ArtifactRef) -> FleetResult<String> {
        if self.unreadable.lock().contains(artifact) {
            return Err(FleetError::ArtifactLookup {
                artifact: artifact.to_string(),
                reason: "no 'name' field".to_string(),
            });
        }
        self.units
            .lock()
            .get(artifact)
            .map(|unit| unit.name.clone())
            .ok_or_else(|| FleetError::ArtifactLookup {
                artifact: artifact.to_string(),
                reason: "artifact does not exist".to_string(),
            })
    }
}
