use clap::{Parser, Subcommand};
use std::path::PathBuf;

use fleetlab_core::config::{
    FaultActionKind, RunConfig, DEFAULT_ARTIFACT_DIR, DEFAULT_CONFIG_FILE,
};

#[derive(Parser, Debug)]
#[command(name = "fleetlab")]
#[command(about = "Provision replica fleets and run network partition experiments", long_about = None)]
pub struct Cli {
    /// Stream docker output live instead of showing a progress ticker
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// Fleet configuration file (JSON, or TOML with a .toml extension)
    #[arg(short, long, global = true, default_value = DEFAULT_CONFIG_FILE)]
    pub config: PathBuf,

    /// Directory the compose files are written to
    #[arg(long, global = true, default_value = DEFAULT_ARTIFACT_DIR)]
    pub artifact_dir: PathBuf,

    /// Also start the websocket provider when bringing the fleet up
    #[arg(long, global = true)]
    pub start_provider: bool,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand, Debug, Clone, PartialEq, Eq)]
pub enum Commands {
    /// Write compose files and create networks without starting anything
    Generate,
    /// Generate, then start every replica that is not running
    Up,
    /// Stop every replica and remove its private network
    Down,
    /// Remove everything the fleet left behind, including volumes and images
    ForceClean,
    /// Down, then up
    Rebuild,
    /// Partition the running fleet until interrupted
    InjectFaults {
        /// Fault to inject (disconnect or pairwise-drop)
        #[arg(long)]
        action: Option<FaultActionKind>,

        /// Seed for target selection, for reproducible experiments
        #[arg(long)]
        seed: Option<u64>,
    },
}

impl Cli {
    pub fn run_config(&self) -> RunConfig {
        RunConfig::default()
            .with_verbose(self.verbose)
            .with_artifact_dir(&self.artifact_dir)
            .with_start_provider(self.start_provider)
    }
}
