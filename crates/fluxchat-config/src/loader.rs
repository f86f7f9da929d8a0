//! Configuration loading and validation.

use std::fs;
use std::path::Path;

use thiserror::Error;

use crate::FluxchatConfig;

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

/// Load and validate configuration from a YAML file.
pub fn load_config(path: &Path) -> Result<FluxchatConfig, ConfigError> {
    let content = fs::read_to_string(path)?;
    parse_config(&content)
}

/// Parse and validate configuration from YAML text.
pub fn parse_config(content: &str) -> Result<FluxchatConfig, ConfigError> {
    let config: FluxchatConfig = serde_yaml::from_str(content)?;
    validate_config(&config)?;
    Ok(config)
}

fn validate_config(config: &FluxchatConfig) -> Result<(), ConfigError> {
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

    if config.provider.backend.trim().is_empty() {
        return Err(ConfigError::Invalid(
            "provider.backend must not be empty".to_string(),
        ));
    }

    if config.provider.model.trim().is_empty() {
        return Err(ConfigError::Invalid(
            "provider.model must not be empty".to_string(),
        ));
    }

    if config.provider.request_timeout_secs == 0 {
        return Err(ConfigError::Invalid(
            "provider.request_timeout_secs must be > 0".to_string(),
        ));
    }

    if config.credentials.api_key_name.trim().is_empty() {
        return Err(ConfigError::Invalid(
            "credentials.api_key_name must not be empty".to_string(),
        ));
    }

    if !config.routing.initial_route.starts_with('/') {
        return Err(ConfigError::Invalid(
            "routing.initial_route must be an absolute path".to_string(),
        ));
    }

    Ok(())
}
