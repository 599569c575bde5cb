//! Scripted network partitions against a live fleet
//!
//! The injector runs one fault at a time, fleet-wide:
//!
//! 1. discover running replicas (fresh on every cycle)
//! 2. pick a target at random
//! 3. apply the fault and hold it for `fault_duration`
//! 4. heal with the exact inverse of what was applied
//! 5. cool down before the next cycle
//!
//! A shutdown signal interrupts waiting, never healing: a fault that was
//! applied is always healed before the loop returns.

use rand::seq::index;
use rand::Rng;
use std::net::IpAddr;
use std::sync::Arc;
use std::time::{Duration, SystemTime};
use tokio::sync::watch;
use tracing::{debug, error, info, warn};

use crate::config::{FaultActionKind, FaultInjectionConfig, MIN_FAULT_FLEET_SIZE};
use crate::error::{FleetError, FleetResult};
use crate::runtime::ContainerRuntime;
use crate::types::{FaultPhase, FaultState, FaultTarget};

/// A concrete, reversible fault
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FaultAction {
    /// Detach `unit` from `network`
    Disconnect { unit: String, network: String },
    /// Drop everything `src` sends to `dst_address`
    DropTraffic {
        src: String,
        dst: String,
        dst_address: IpAddr,
    },
}

fn drop_rule(flag: &str, address: IpAddr) -> Vec<String> {
    ["iptables", flag, "OUTPUT", "-d", &address.to_string(), "-j", "DROP"]
        .iter()
        .map(|s| s.to_string())
        .collect()
}

impl FaultAction {
    pub fn target(&self) -> FaultTarget {
        match self {
            FaultAction::Disconnect { unit, .. } => FaultTarget::Node(unit.clone()),
            FaultAction::DropTraffic {
                src,
                dst,
                dst_address,
            } => FaultTarget::Pair {
                src: src.clone(),
                dst: dst.clone(),
                dst_address: *dst_address,
            },
        }
    }

    pub async fn apply(&self, runtime: &dyn ContainerRuntime) -> FleetResult<()> {
        match self {
            FaultAction::Disconnect { unit, network } => {
                runtime.disconnect_from_network(unit, network).await
            }
            FaultAction::DropTraffic {
                src, dst_address, ..
            } => runtime
                .exec_in_unit(src, &drop_rule("-A", *dst_address))
                .await
                .map(|_| ()),
        }
    }

    /// Undo exactly what `apply` did
    pub async fn heal(&self, runtime: &dyn ContainerRuntime) -> FleetResult<()> {
        match self {
            FaultAction::Disconnect { unit, network } => {
                runtime.connect_to_network(unit, network).await
            }
            FaultAction::DropTraffic {
                src, dst_address, ..
            } => runtime
                .exec_in_unit(src, &drop_rule("-D", *dst_address))
                .await
                .map(|_| ()),
        }
    }
}

/// How a single injection cycle ended
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CycleOutcome {
    /// Too few replicas were running; waited `discovery_backoff`
    InsufficientReplicas { found: usize },
    /// Listing running units failed; waited `discovery_backoff`
    DiscoveryFailed,
    /// The pair target's address could not be resolved
    LookupFailed,
    /// The fault could not be applied, so nothing needed healing
    ApplyFailed,
    Healed { target: FaultTarget },
    HealFailed { target: FaultTarget },
    /// Shutdown was requested before a fault was applied
    Shutdown,
}

/// Whether `name` follows `{prefix}{number}`
fn is_replica_name(name: &str, prefix: &str) -> bool {
    name.strip_prefix(prefix)
        .map(|rest| !rest.is_empty() && rest.chars().all(|c| c.is_ascii_digit()))
        .unwrap_or(false)
}

/// Sleep for `duration` unless shutdown is signalled first
///
/// Returns true when interrupted. A dropped sender means no signal can
/// arrive any more, so the full duration is waited out.
async fn pause(duration: Duration, shutdown: &mut watch::Receiver<bool>) -> bool {
    if *shutdown.borrow() {
        return true;
    }
    let sleep = tokio::time::sleep(duration);
    tokio::pin!(sleep);
    loop {
        tokio::select! {
            _ = &mut sleep => return false,
            changed = shutdown.changed() => match changed {
                Ok(()) => {
                    if *shutdown.borrow() {
                        return true;
                    }
                }
                Err(_) => {
                    (&mut sleep).await;
                    return false;
                }
            },
        }
    }
}

pub struct FaultInjector<R> {
    runtime: Arc<dyn ContainerRuntime>,
    config: FaultInjectionConfig,
    shared_network: String,
    rng: R,
    last: Option<FaultState>,
}

impl<R: Rng + Send> FaultInjector<R> {
    pub fn new(
        runtime: Arc<dyn ContainerRuntime>,
        config: FaultInjectionConfig,
        shared_network: impl Into<String>,
        rng: R,
    ) -> Self {
        Self {
            runtime,
            config,
            shared_network: shared_network.into(),
            rng,
            last: None,
        }
    }

    /// The most recently applied fault
    ///
    /// Its phase stays `Partitioned` while held and when healing failed.
    pub fn last_fault(&self) -> Option<&FaultState> {
        self.last.as_ref()
    }

    /// Inject faults until shutdown is signalled
    pub async fn run(mut self, mut shutdown: watch::Receiver<bool>) {
        info!(
            "Fault injector started: action={}, hold={:?}, cooldown={:?}",
            self.config.action, self.config.fault_duration, self.config.cooldown
        );
        loop {
            let outcome = self.run_cycle(&mut shutdown).await;
            debug!("Fault cycle finished: {:?}", outcome);
            if outcome == CycleOutcome::Shutdown || *shutdown.borrow() {
                break;
            }
        }
        info!("Fault injector stopped");
    }

    /// One discover, apply, hold, heal and cooldown iteration
    pub async fn run_cycle(&mut self, shutdown: &mut watch::Receiver<bool>) -> CycleOutcome {
        if *shutdown.borrow() {
            return CycleOutcome::Shutdown;
        }

        let members = match self.discover().await {
            Ok(members) => members,
            Err(e) => {
                warn!("Failed to list running units: {}", e);
                return self.back_off(CycleOutcome::DiscoveryFailed, shutdown).await;
            }
        };

        if members.len() < MIN_FAULT_FLEET_SIZE {
            info!(
                "Only {} replica(s) running, waiting {:?} before polling again",
                members.len(),
                self.config.discovery_backoff
            );
            let found = members.len();
            return self
                .back_off(CycleOutcome::InsufficientReplicas { found }, shutdown)
                .await;
        }

        let action = match self.select(&members).await {
            Ok(action) => action,
            Err(e) => {
                warn!("Failed to resolve fault target: {}", e);
                return self.back_off(CycleOutcome::LookupFailed, shutdown).await;
            }
        };
        let target = action.target();

        info!("Injecting fault: {}", target);
        if let Err(e) = action.apply(self.runtime.as_ref()).await {
            warn!("Failed to apply fault to {}: {}", target, e);
            pause(self.config.cooldown, shutdown).await;
            return CycleOutcome::ApplyFailed;
        }
        self.last = Some(FaultState {
            target: target.clone(),
            phase: FaultPhase::Partitioned,
            started_at: SystemTime::now(),
        });

        let interrupted = pause(self.config.fault_duration, shutdown).await;
        if interrupted {
            info!("Shutdown requested, healing {} early", target);
        }

        let outcome = match action.heal(self.runtime.as_ref()).await {
            Ok(()) => {
                info!("Healed fault: {}", target);
                if let Some(state) = self.last.as_mut() {
                    state.phase = FaultPhase::Connected;
                }
                CycleOutcome::Healed { target }
            }
            Err(e) => {
                let failure = FleetError::HealFailure {
                    target: target.to_string(),
                    details: e.to_string(),
                };
                error!("{}", failure);
                CycleOutcome::HealFailed { target }
            }
        };

        if !interrupted {
            pause(self.config.cooldown, shutdown).await;
        }
        outcome
    }

    async fn back_off(
        &self,
        outcome: CycleOutcome,
        shutdown: &mut watch::Receiver<bool>,
    ) -> CycleOutcome {
        if pause(self.config.discovery_backoff, shutdown).await {
            CycleOutcome::Shutdown
        } else {
            outcome
        }
    }

    async fn discover(&self) -> FleetResult<Vec<String>> {
        let running = self.runtime.list_running_units().await?;
        Ok(running
            .into_iter()
            .filter(|name| is_replica_name(name, &self.config.unit_prefix))
            .collect())
    }

    async fn select(&mut self, members: &[String]) -> FleetResult<FaultAction> {
        match self.config.action {
            FaultActionKind::Disconnect => {
                let unit = members[self.rng.gen_range(0..members.len())].clone();
                Ok(FaultAction::Disconnect {
                    unit,
                    network: self.shared_network.clone(),
                })
            }
            FaultActionKind::PairwiseDrop => {
                let picked = index::sample(&mut self.rng, members.len(), 2);
                let src = members[picked.index(0)].clone();
                let dst = members[picked.index(1)].clone();
                let dst_address = self
                    .runtime
                    .resolve_address(&dst, &self.shared_network)
                    .await?;
                Ok(FaultAction::DropTraffic {
                    src,
                    dst,
                    dst_address,
                })
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_helpers::FakeRuntime;

    #[test]
    fn test_replica_name_filter() {
        assert!(is_replica_name("Replica1", "Replica"));
        assert!(is_replica_name("Replica12", "Replica"));
        assert!(!is_replica_name("Replica", "Replica"));
        assert!(!is_replica_name("Replica_net_1", "Replica"));
        assert!(!is_replica_name("wsserver", "Replica"));
        assert!(!is_replica_name("neo4j1", "Replica"));
    }

    #[test]
    fn test_drop_rule_arguments() {
        let addr: IpAddr = "172.18.0.3".parse().unwrap();
        assert_eq!(
            drop_rule("-A", addr),
            vec!["iptables", "-A", "OUTPUT", "-d", "172.18.0.3", "-j", "DROP"]
        );
    }

    #[tokio::test]
    async fn test_heal_is_inverse_of_apply() {
        let runtime = FakeRuntime::new();
        let disconnect = FaultAction::Disconnect {
            unit: "Replica2".to_string(),
            network: "Shared_net".to_string(),
        };
        disconnect.apply(&runtime).await.unwrap();
        assert_eq!(
            runtime.disconnected(),
            vec![("Replica2".to_string(), "Shared_net".to_string())]
        );
        disconnect.heal(&runtime).await.unwrap();
        assert!(runtime.disconnected().is_empty());

        let drop = FaultAction::DropTraffic {
            src: "Replica1".to_string(),
            dst: "Replica3".to_string(),
            dst_address: "172.18.0.4".parse().unwrap(),
        };
        drop.apply(&runtime).await.unwrap();
        assert_eq!(
            runtime.drop_rules(),
            vec![("Replica1".to_string(), "172.18.0.4".to_string())]
        );
        drop.heal(&runtime).await.unwrap();
        assert!(runtime.drop_rules().is_empty());
    }
}
