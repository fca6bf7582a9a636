//! Configuration loading from disk.

use std::fs;
use std::path::Path;

use thiserror::Error;

use crate::config::schema::LauncherConfig;
use crate::config::validation::ValidationError;
use crate::environment::TimezoneError;

/// Error type for configuration loading and resolution.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("IO error reading {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("Parse error: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("PORT environment variable is not set")]
    MissingPort,

    #[error("PORT must be a TCP port between 1 and 65535, got '{0}'")]
    InvalidPort(String),

    #[error(transparent)]
    Timezone(#[from] TimezoneError),

    #[error("Validation failed: {}", join(.0))]
    Validation(Vec<ValidationError>),
}

fn join(errors: &[ValidationError]) -> String {
    errors
        .iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join(", ")
}

/// Load configuration from a TOML file.
///
/// Semantic validation happens during topology resolution, once the
/// environment is known.
pub fn load_config(path: &Path) -> Result<LauncherConfig, ConfigError> {
    let content = fs::read_to_string(path).map_err(|source| ConfigError::Io {
        path: path.display().to_string(),
        source,
    })?;
    let config: LauncherConfig = toml::from_str(&content)?;
    Ok(config)
}

/// Load from `path` if given, defaults otherwise.
pub fn load_or_default(path: Option<&Path>) -> Result<LauncherConfig, ConfigError> {
    match path {
        Some(path) => load_config(path),
        None => Ok(LauncherConfig::default()),
    }
}
