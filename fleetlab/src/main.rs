use clap::Parser;
use rand::rngs::StdRng;
use rand::SeedableRng;
use tracing::{error, info, warn};

use fleetlab::cli::{Cli, Commands};
use fleetlab::signal::ShutdownSignals;
use fleetlab::{logging, FleetConfig, FleetError, FleetOrchestrator, FleetResult};
use fleetlab_core::reconciler::{DownReport, ReconcileReport};

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    // Initialize logging
    if let Err(e) = logging::init(cli.verbose) {
        eprintln!("{}", e);
        std::process::exit(2);
    }

    if let Err(e) = run(cli).await {
        error!("{}", e);
        if e.is_fatal() {
            std::process::exit(2);
        }
        std::process::exit(e.exit_code().filter(|code| *code != 0).unwrap_or(1));
    }
}

async fn run(cli: Cli) -> FleetResult<()> {
    let config = FleetConfig::from_file(&cli.config)?;
    let orchestrator = FleetOrchestrator::new(config, cli.run_config())?;

    match cli.command {
        Commands::Generate => {
            let generation = orchestrator.generate().await?;
            for unit in &generation.units {
                info!("{} -> {}", unit.name, unit.artifact);
            }
            if let Some(first) = generation.failed.into_iter().next() {
                return Err(first.error);
            }
        }
        Commands::Up => {
            let report = orchestrator.up().await?;
            check_up(report)?;
        }
        Commands::Down => {
            let report = orchestrator.down().await;
            log_down(&report);
        }
        Commands::ForceClean => {
            let report = orchestrator.force_clean().await;
            info!(
                "Force clean stopped {} unit(s), removed {} container(s) and {} network(s)",
                report.units_stopped,
                report.containers_removed.len(),
                report.networks_removed.len()
            );
            if !report.is_clean() {
                for (what, e) in &report.failures {
                    warn!("{}: {}", what, e);
                }
                warn!("Some resources may need to be removed by hand");
            }
        }
        Commands::Rebuild => {
            let (down, up) = orchestrator.rebuild().await?;
            log_down(&down);
            check_up(up)?;
        }
        Commands::InjectFaults { action, seed } => {
            let rng = match seed {
                Some(seed) => StdRng::seed_from_u64(seed),
                None => StdRng::from_entropy(),
            };
            let mut signals = ShutdownSignals::install()?;
            orchestrator
                .run_fault_injection(action, rng, signals.recv())
                .await?;
        }
    }

    Ok(())
}

/// Fails with the first failed unit's error, so its exit code is kept
fn check_up(report: ReconcileReport) -> FleetResult<()> {
    if report.is_success() {
        return Ok(());
    }
    for (name, e) in &report.failed {
        error!("{}: {}", name, e);
    }
    for artifact in &report.skipped {
        error!("{} could not be read", artifact);
    }
    let summary = format!(
        "{} unit(s) failed to start and {} could not be read",
        report.failed.len(),
        report.skipped.len()
    );
    match report.failed.into_iter().next() {
        Some((_, e)) => {
            error!("{}", summary);
            Err(e)
        }
        None => Err(FleetError::Internal { message: summary }),
    }
}

fn log_down(report: &DownReport) {
    info!(
        "Stopped {} unit(s), removed {} network(s)",
        report.stopped, report.networks_removed
    );
    for (what, e) in &report.failures {
        warn!("{}: {}", what, e);
    }
}
