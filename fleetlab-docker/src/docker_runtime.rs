use async_trait::async_trait;
use std::net::IpAddr;
use std::sync::Arc;
use tracing::{debug, warn};

use fleetlab_core::error::{FleetError, FleetResult};
use fleetlab_core::runtime::ContainerRuntime;
use fleetlab_core::types::{ArtifactRef, PruneTarget, StartOptions, StopOptions};

use crate::command::{CommandExecutor, CommandOutput};

const DOCKER: &str = "docker";

/// `ContainerRuntime` backed by the docker CLI and docker compose
pub struct DockerRuntime {
    executor: Arc<dyn CommandExecutor>,
}

fn args<I, S>(parts: I) -> Vec<String>
where
    I: IntoIterator<Item = S>,
    S: Into<String>,
{
    parts.into_iter().map(Into::into).collect()
}

fn lines(stdout: &str) -> Vec<String> {
    stdout
        .lines()
        .map(str::trim)
        .filter(|l| !l.is_empty())
        .map(String::from)
        .collect()
}

impl DockerRuntime {
    pub fn new(executor: Arc<dyn CommandExecutor>) -> Self {
        Self { executor }
    }

    fn command_line(args: &[String]) -> String {
        format!("{} {}", DOCKER, args.join(" "))
    }

    fn check(args: &[String], output: CommandOutput) -> FleetResult<String> {
        if output.success() {
            return Ok(output.stdout_string());
        }
        Err(FleetError::Execution {
            command: Self::command_line(args),
            exit_code: output.code,
            stdout: output.stdout_string(),
            stderr: output.stderr_string(),
        })
    }

    fn spawn_failure(args: &[String], e: std::io::Error) -> FleetError {
        FleetError::Execution {
            command: Self::command_line(args),
            exit_code: None,
            stdout: String::new(),
            stderr: format!("failed to run {}: {}", DOCKER, e),
        }
    }

    async fn docker(&self, args: Vec<String>) -> FleetResult<String> {
        let output = self
            .executor
            .execute(DOCKER, &args)
            .await
            .map_err(|e| Self::spawn_failure(&args, e))?;
        Self::check(&args, output)
    }

    async fn docker_long(&self, args: Vec<String>, label: &str) -> FleetResult<String> {
        let output = self
            .executor
            .execute_long(DOCKER, &args, label)
            .await
            .map_err(|e| Self::spawn_failure(&args, e))?;
        let result = Self::check(&args, output);
        if let Err(FleetError::Execution { stdout, stderr, .. }) = &result {
            warn!("{} failed\n{}{}", label, stdout, stderr);
        }
        result
    }

    fn compose_file(artifact: &ArtifactRef) -> Vec<String> {
        args(["compose".to_string(), "-f".to_string(), artifact.to_string()])
    }
}

#[async_trait]
impl ContainerRuntime for DockerRuntime {
    async fn create_network(&self, name: &str) -> FleetResult<()> {
        match self.docker(args(["network", "create", name])).await {
            Ok(_) => Ok(()),
            Err(FleetError::Execution { stderr, .. }) if stderr.contains("already exists") => {
                Err(FleetError::AlreadyExists {
                    resource: format!("network {}", name),
                })
            }
            Err(e) => Err(e),
        }
    }

    async fn remove_network(&self, name: &str) -> FleetResult<()> {
        self.docker(args(["network", "rm", name])).await.map(|_| ())
    }

    async fn list_networks(&self) -> FleetResult<Vec<String>> {
        let stdout = self
            .docker(args(["network", "ls", "--format", "{{.Name}}"]))
            .await?;
        Ok(lines(&stdout))
    }

    async fn list_running_units(&self) -> FleetResult<Vec<String>> {
        let stdout = self.docker(args(["ps", "--format", "{{.Names}}"])).await?;
        Ok(lines(&stdout))
    }

    async fn list_all_units(&self) -> FleetResult<Vec<String>> {
        let stdout = self
            .docker(args(["ps", "-a", "--format", "{{.Names}}"]))
            .await?;
        Ok(lines(&stdout))
    }

    async fn is_unit_running(&self, name: &str) -> FleetResult<bool> {
        let stdout = self
            .docker(args([
                "compose", "-p", name, "ps", "--status", "running", "--quiet",
            ]))
            .await?;
        let running = !stdout.trim().is_empty();
        debug!("Unit {} running: {}", name, running);
        Ok(running)
    }

    async fn start_unit(&self, artifact: &ArtifactRef, options: StartOptions) -> FleetResult<()> {
        let mut cmd = Self::compose_file(artifact);
        cmd.push("up".to_string());
        if options.build {
            cmd.push("--build".to_string());
        }
        if options.detach {
            cmd.push("-d".to_string());
        }
        if options.force_recreate {
            cmd.push("--force-recreate".to_string());
        }
        self.docker_long(cmd, &format!("Starting {}", artifact))
            .await
            .map(|_| ())
    }

    async fn stop_unit(&self, artifact: &ArtifactRef, options: StopOptions) -> FleetResult<()> {
        let mut cmd = Self::compose_file(artifact);
        cmd.push("down".to_string());
        if options.remove_volumes {
            cmd.push("--volumes".to_string());
        }
        if options.remove_orphans {
            cmd.push("--remove-orphans".to_string());
        }
        if options.remove_local_images {
            cmd.extend(args(["--rmi", "local"]));
        }
        self.docker_long(cmd, &format!("Stopping {}", artifact))
            .await
            .map(|_| ())
    }

    async fn remove_unit(&self, name: &str) -> FleetResult<()> {
        self.docker(args(["rm", "-f", name])).await.map(|_| ())
    }

    async fn disconnect_from_network(&self, unit: &str, network: &str) -> FleetResult<()> {
        self.docker(args(["network", "disconnect", network, unit]))
            .await
            .map(|_| ())
    }

    async fn connect_to_network(&self, unit: &str, network: &str) -> FleetResult<()> {
        self.docker(args(["network", "connect", network, unit]))
            .await
            .map(|_| ())
    }

    async fn resolve_address(&self, unit: &str, network: &str) -> FleetResult<IpAddr> {
        let format = format!(
            "{{{{(index .NetworkSettings.Networks \"{}\").IPAddress}}}}",
            network
        );
        let stdout = self
            .docker(args(["inspect".to_string(), "-f".to_string(), format, unit.to_string()]))
            .await?;
        let address = stdout.trim();
        if address.is_empty() || address == "<no value>" {
            return Err(FleetError::NotFound {
                resource: format!("address of {} in {}", unit, network),
            });
        }
        address.parse().map_err(|e| FleetError::Internal {
            message: format!("Unexpected address '{}' for {}: {}", address, unit, e),
        })
    }

    async fn exec_in_unit(&self, unit: &str, command: &[String]) -> FleetResult<String> {
        let mut cmd = args(["exec", unit]);
        cmd.extend(command.iter().cloned());
        self.docker(cmd).await
    }

    async fn prune(&self, target: PruneTarget) -> FleetResult<()> {
        self.docker(args([target.to_string(), "prune".to_string(), "-f".to_string()]))
            .await
            .map(|_| ())
    }
}
