//! Configuration loading and validation.

use std::fs;
use std::path::Path;

use thiserror::Error;

use crate::{GroundplanConfig, StoreSpec, StoresConfig};

/// Configuration loading errors.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("YAML parse error: {0}")]
    Parse(#[from] serde_yaml::Error),
    #[error("Invalid config: {0}")]
    Invalid(String),
}

/// Load full Groundplan configuration from YAML file.
pub fn load_config(path: &Path) -> Result<GroundplanConfig, ConfigError> {
    let content = fs::read_to_string(path)?;
    let config: GroundplanConfig = serde_yaml::from_str(&content)?;
    validate_config(&config)?;
    Ok(config)
}

fn validate_config(config: &GroundplanConfig) -> Result<(), ConfigError> {
    if config.version == 0 {
        return Err(ConfigError::Invalid(
            "version must be greater than 0".to_string(),
        ));
    }

    if config.app.name.trim().is_empty() {
        return Err(ConfigError::Invalid(
            "app.name must not be empty".to_string(),
        ));
    }

    if config.executor.kind == "http" && config.executor.endpoint.is_none() {
        return Err(ConfigError::Invalid(
            "executor.endpoint is required when executor.kind is 'http'".to_string(),
        ));
    }

    validate_stores(&config.stores)?;
    Ok(())
}

fn validate_stores(config: &StoresConfig) -> Result<(), ConfigError> {
    validate_store("stores.history", &config.history)?;
    validate_store("stores.artifacts", &config.artifacts)?;
    validate_store("stores.runs", &config.runs)?;
    Ok(())
}

fn validate_store(section: &str, spec: &StoreSpec) -> Result<(), ConfigError> {
    match spec.backend.as_str() {
        "in_memory" => Ok(()),
        "redis" => {
            if spec.connection_url.is_none() {
                return Err(ConfigError::Invalid(format!(
                    "{}.connection_url is required when backend is 'redis'",
                    section
                )));
            }
            Ok(())
        }
        other => Err(ConfigError::Invalid(format!(
            "{}.backend '{}' is not supported",
            section, other
        ))),
    }
}
