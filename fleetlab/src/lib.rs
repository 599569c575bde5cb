pub mod cli;
pub mod logging;
pub mod orchestrator;
pub mod signal;

pub use orchestrator::FleetOrchestrator;

// Re-export commonly used types
pub use fleetlab_core::{
    config::{FleetConfig, RunConfig},
    error::{FleetError, FleetResult},
};
