//! Pattern-based discovery and removal of fleet leftovers
//!
//! Stopping units through their artifacts misses anything whose artifact is
//! gone. The sweep lists what the runtime actually has and removes every
//! container and network whose name follows the fleet's naming scheme.

use once_cell::sync::Lazy;
use regex::Regex;
use std::sync::Arc;
use tracing::{debug, info, warn};

use crate::error::FleetError;
use crate::runtime::ContainerRuntime;
use crate::types::PruneTarget;

static CONTAINER_PATTERNS: Lazy<Vec<Regex>> = Lazy::new(|| {
    [
        r"^(neo4j|memgraph|janusgraph)\d+$",
        r"^lab\d+$",
        r"^Replica\d+$",
        r"^preload\d+$",
    ]
    .iter()
    .filter_map(|p| Regex::new(p).ok())
    .collect()
});

static NETWORK_PATTERNS: Lazy<Vec<Regex>> = Lazy::new(|| {
    [r"^Replica_net_\d+$", r"^Provider_net$"]
        .iter()
        .filter_map(|p| Regex::new(p).ok())
        .collect()
});

pub fn is_fleet_container(name: &str) -> bool {
    CONTAINER_PATTERNS.iter().any(|re| re.is_match(name))
}

pub fn is_fleet_network(name: &str) -> bool {
    NETWORK_PATTERNS.iter().any(|re| re.is_match(name))
}

/// What a force-clean removed and what it could not
#[derive(Debug, Default)]
pub struct CleanupReport {
    pub units_stopped: usize,
    pub containers_removed: Vec<String>,
    pub networks_removed: Vec<String>,
    pub pruned: Vec<PruneTarget>,
    pub failures: Vec<(String, FleetError)>,
}

impl CleanupReport {
    pub fn is_clean(&self) -> bool {
        self.failures.is_empty()
    }
}

pub struct CleanupSweep {
    runtime: Arc<dyn ContainerRuntime>,
}

impl CleanupSweep {
    pub fn new(runtime: Arc<dyn ContainerRuntime>) -> Self {
        Self { runtime }
    }

    /// Remove matching containers and networks, then prune dangling resources
    ///
    /// Every step runs regardless of earlier failures.
    pub async fn sweep(&self, report: &mut CleanupReport) {
        match self.runtime.list_all_units().await {
            Ok(names) => {
                for name in names.into_iter().filter(|n| is_fleet_container(n)) {
                    debug!("Removing leftover container {}", name);
                    match self.runtime.remove_unit(&name).await {
                        Ok(()) => report.containers_removed.push(name),
                        Err(e) => {
                            warn!("Failed to remove container {}: {}", name, e);
                            report.failures.push((name, e));
                        }
                    }
                }
            }
            Err(e) => {
                warn!("Failed to list containers: {}", e);
                report.failures.push(("containers".to_string(), e));
            }
        }

        match self.runtime.list_networks().await {
            Ok(names) => {
                for name in names.into_iter().filter(|n| is_fleet_network(n)) {
                    debug!("Removing leftover network {}", name);
                    match self.runtime.remove_network(&name).await {
                        Ok(()) => report.networks_removed.push(name),
                        Err(e) => {
                            warn!("Failed to remove network {}: {}", name, e);
                            report.failures.push((name, e));
                        }
                    }
                }
            }
            Err(e) => {
                warn!("Failed to list networks: {}", e);
                report.failures.push(("networks".to_string(), e));
            }
        }

        for target in [PruneTarget::Containers, PruneTarget::Images, PruneTarget::Volumes] {
            match self.runtime.prune(target).await {
                Ok(()) => report.pruned.push(target),
                Err(e) => {
                    warn!("Failed to prune {}s: {}", target, e);
                    report.failures.push((format!("{} prune", target), e));
                }
            }
        }

        info!(
            "Sweep removed {} containers and {} networks",
            report.containers_removed.len(),
            report.networks_removed.len()
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_helpers::{FakeRuntime, RuntimeCall};

    #[test]
    fn test_container_patterns() {
        for name in ["neo4j1", "memgraph12", "janusgraph3", "lab2", "Replica10", "preload1"] {
            assert!(is_fleet_container(name), "{} should match", name);
        }
        for name in ["neo4j", "Replica", "Replica1-old", "postgres1", "wsserver", "myneo4j1"] {
            assert!(!is_fleet_container(name), "{} should not match", name);
        }
    }

    #[test]
    fn test_network_patterns() {
        assert!(is_fleet_network("Replica_net_1"));
        assert!(is_fleet_network("Provider_net"));
        assert!(!is_fleet_network("Shared_net"));
        assert!(!is_fleet_network("Provider_net2"));
        assert!(!is_fleet_network("bridge"));
    }

    #[tokio::test]
    async fn test_sweep_removes_only_fleet_resources() {
        let runtime = Arc::new(FakeRuntime::new());
        runtime.add_container("neo4j1", false);
        runtime.add_container("lab1", true);
        runtime.add_container("Replica1", true);
        runtime.add_container("unrelated", true);
        runtime.add_network("Replica_net_1");
        runtime.add_network("Provider_net");
        runtime.add_network("Shared_net");
        runtime.add_network("bridge");

        let mut report = CleanupReport::default();
        CleanupSweep::new(runtime.clone()).sweep(&mut report).await;

        assert!(report.is_clean());
        assert_eq!(report.containers_removed, vec!["Replica1", "lab1", "neo4j1"]);
        assert_eq!(report.networks_removed, vec!["Provider_net", "Replica_net_1"]);
        assert_eq!(
            report.pruned,
            vec![PruneTarget::Containers, PruneTarget::Images, PruneTarget::Volumes]
        );
        assert_eq!(runtime.containers(), vec!["unrelated"]);
        assert_eq!(runtime.networks(), vec!["Shared_net", "bridge"]);
    }

    #[tokio::test]
    async fn test_sweep_prunes_even_when_listing_fails() {
        let runtime = Arc::new(FakeRuntime::new());
        runtime.set_fail_list(true);

        let mut report = CleanupReport::default();
        CleanupSweep::new(runtime.clone()).sweep(&mut report).await;

        assert_eq!(report.failures.len(), 2);
        assert_eq!(
            runtime
                .calls_matching(|c| matches!(c, RuntimeCall::Prune(_)))
                .len(),
            3
        );
    }
}
