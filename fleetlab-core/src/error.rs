use thiserror::Error;

#[derive(Error, Debug)]
pub enum FleetError {
    /// Invalid configuration. Fatal, raised before any side effect.
    #[error("Configuration error: {0}")]
    ConfigError(String),

    #[error("Artifact lookup failed for {artifact}: {reason}")]
    ArtifactLookup { artifact: String, reason: String },

    #[error("Command '{command}' failed with exit code {}: {}", display_code(*exit_code), stderr.trim())]
    Execution {
        command: String,
        exit_code: Option<i32>,
        stdout: String,
        stderr: String,
    },

    /// A fault could not be reversed and is still active in the fleet.
    #[error("Failed to heal fault on {target}: {details}")]
    HealFailure { target: String, details: String },

    #[error("Already exists: {resource}")]
    AlreadyExists { resource: String },

    #[error("Resource not found: {resource}")]
    NotFound { resource: String },

    #[error("Template error: {message}")]
    Template { message: String },

    #[error("Internal error: {message}")]
    Internal { message: String },

    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    JsonError(#[from] serde_json::Error),

    #[error("TOML error: {0}")]
    TomlError(#[from] toml::de::Error),
}

fn display_code(code: Option<i32>) -> String {
    match code {
        Some(code) => code.to_string(),
        None => "none (terminated by signal)".to_string(),
    }
}

impl FleetError {
    /// Only configuration errors abort a whole run.
    pub fn is_fatal(&self) -> bool {
        matches!(self, FleetError::ConfigError(_))
    }

    pub fn exit_code(&self) -> Option<i32> {
        match self {
            FleetError::Execution { exit_code, .. } => *exit_code,
            _ => None,
        }
    }
}

pub type FleetResult<T> = std::result::Result<T, FleetError>;
