//! Compose files on disk as the artifact store
//!
//! Every unit is written to `<dir>/docker-compose.<key>.yml`. Only files
//! following that naming scheme are considered managed; anything else in the
//! directory (Dockerfiles, notes) is left alone.

use serde::Deserialize;
use std::fs;
use std::path::{Path, PathBuf};
use tracing::debug;

use fleetlab_core::error::{FleetError, FleetResult};
use fleetlab_core::runtime::ArtifactStore;
use fleetlab_core::types::{ArtifactRef, UnitDefinition};

use crate::compose_generator::ComposeGenerator;

const FILE_PREFIX: &str = "docker-compose.";

#[derive(Deserialize)]
struct ComposeHeader {
    name: Option<String>,
}

pub struct ComposeStore {
    dir: PathBuf,
    generator: ComposeGenerator,
}

impl ComposeStore {
    pub fn new(dir: impl Into<PathBuf>) -> FleetResult<Self> {
        Ok(Self {
            dir: dir.into(),
            generator: ComposeGenerator::new()?,
        })
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    fn is_managed(path: &Path) -> bool {
        let name = match path.file_name().and_then(|n| n.to_str()) {
            Some(name) => name,
            None => return false,
        };
        name.starts_with(FILE_PREFIX) && (name.ends_with(".yml") || name.ends_with(".yaml"))
    }

    fn lookup_error(artifact: &ArtifactRef, reason: impl Into<String>) -> FleetError {
        FleetError::ArtifactLookup {
            artifact: artifact.to_string(),
            reason: reason.into(),
        }
    }
}

impl ArtifactStore for ComposeStore {
    fn write(&self, key: &str, unit: &UnitDefinition) -> FleetResult<ArtifactRef> {
        let contents = self.generator.render(unit)?;
        fs::create_dir_all(&self.dir)?;
        let artifact = self.locate(key);
        fs::write(artifact.path(), contents)?;
        debug!("Wrote {} for unit {}", artifact, unit.name);
        Ok(artifact)
    }

    fn locate(&self, key: &str) -> ArtifactRef {
        ArtifactRef::new(self.dir.join(format!("{}{}.yml", FILE_PREFIX, key)))
    }

    fn list(&self) -> FleetResult<Vec<ArtifactRef>> {
        if !self.dir.exists() {
            return Ok(Vec::new());
        }

        let mut artifacts = Vec::new();
        for entry in fs::read_dir(&self.dir)? {
            let path = entry?.path();
            if path.is_file() && Self::is_managed(&path) {
                artifacts.push(ArtifactRef::new(path));
            }
        }
        artifacts.sort();
        Ok(artifacts)
    }

    fn remove(&self, artifact: &ArtifactRef) -> FleetResult<()> {
        fs::remove_file(artifact.path())?;
        Ok(())
    }

    fn read_name(&self, artifact: &ArtifactRef) -> FleetResult<String> {
        let contents = fs::read_to_string(artifact.path())
            .map_err(|e| Self::lookup_error(artifact, e.to_string()))?;
        let header: ComposeHeader = serde_yaml::from_str(&contents)
            .map_err(|e| Self::lookup_error(artifact, format!("invalid YAML: {}", e)))?;
        match header.name {
            Some(name) if !name.is_empty() => Ok(name),
            _ => Err(Self::lookup_error(artifact, "no 'name' field")),
        }
    }
}
