//! Per-invocation settings handed to every component at construction

use super::defaults::*;
use std::path::PathBuf;

/// Immutable settings for one run of the tool
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RunConfig {
    /// Stream subprocess output live instead of capturing it
    pub verbose: bool,
    /// Directory holding the persisted unit definitions
    pub artifact_dir: PathBuf,
    /// Build context for locally built images, relative to `artifact_dir`
    pub build_context: String,
    pub app_dockerfile: String,
    pub provider_dockerfile: String,
    /// Snapshot data mounted into the preload services
    pub preload_dir: PathBuf,
    /// Start the provider unit during reconciliation
    pub start_provider: bool,
}

impl Default for RunConfig {
    fn default() -> Self {
        Self {
            verbose: false,
            artifact_dir: PathBuf::from(DEFAULT_ARTIFACT_DIR),
            build_context: DEFAULT_BUILD_CONTEXT.to_string(),
            app_dockerfile: DEFAULT_APP_DOCKERFILE.to_string(),
            provider_dockerfile: DEFAULT_PROVIDER_DOCKERFILE.to_string(),
            preload_dir: PathBuf::from(DEFAULT_PRELOAD_DIR),
            start_provider: false,
        }
    }
}

impl RunConfig {
    pub fn with_verbose(mut self, verbose: bool) -> Self {
        self.verbose = verbose;
        self
    }

    pub fn with_artifact_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.artifact_dir = dir.into();
        self
    }

    pub fn with_start_provider(mut self, start: bool) -> Self {
        self.start_provider = start;
        self
    }
}
