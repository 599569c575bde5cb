//! Log filter setup for the fleetlab binary

use tracing_subscriber::EnvFilter;

use fleetlab_core::error::{FleetError, FleetResult};

const TARGETS: [&str; 3] = ["fleetlab", "fleetlab_core", "fleetlab_docker"];

/// Filter used when `RUST_LOG` is not set
pub fn default_filter(verbose: bool) -> FleetResult<EnvFilter> {
    let level = if verbose { "debug" } else { "info" };
    let mut filter = EnvFilter::new("warn");
    for target in TARGETS {
        filter = filter.add_directive(format!("{}={}", target, level).parse().map_err(|e| {
            FleetError::ConfigError(format!("Invalid log directive: {}", e))
        })?);
    }
    Ok(filter)
}

/// A non-empty `rust_log` replaces the defaults entirely
pub fn build_filter(rust_log: Option<&str>, verbose: bool) -> FleetResult<EnvFilter> {
    match rust_log.map(str::trim).filter(|s| !s.is_empty()) {
        Some(directives) => EnvFilter::try_new(directives).map_err(|e| {
            FleetError::ConfigError(format!("Invalid RUST_LOG '{}': {}", directives, e))
        }),
        None => default_filter(verbose),
    }
}

pub fn init(verbose: bool) -> FleetResult<()> {
    let rust_log = std::env::var(EnvFilter::DEFAULT_ENV).ok();
    tracing_subscriber::fmt()
        .with_env_filter(build_filter(rust_log.as_deref(), verbose)?)
        .with_writer(std::io::stderr)
        .init();
    Ok(())
}
