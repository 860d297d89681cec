//! Configuration loading and validation.

use std::fs;
use std::path::Path;

use thiserror::Error;

use crate::WaypointConfig;

const KNOWN_TASK_STORE_BACKENDS: [&str; 1] = ["in_memory"];

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

/// Load full Waypoint configuration from YAML file.
pub fn load_config(path: &Path) -> Result<WaypointConfig, ConfigError> {
    let content = fs::read_to_string(path)?;
    parse_config(&content)
}

/// Parse and validate configuration from YAML text.
pub fn parse_config(content: &str) -> Result<WaypointConfig, ConfigError> {
    let config: WaypointConfig = serde_yaml::from_str(content)?;
    validate_config(&config)?;
    Ok(config)
}

pub fn validate_config(config: &WaypointConfig) -> Result<(), ConfigError> {
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

    if config.worker.concurrency == 0 {
        return Err(ConfigError::Invalid(
            "worker.concurrency must be > 0".to_string(),
        ));
    }

    if config.worker.queue_name.trim().is_empty() {
        return Err(ConfigError::Invalid(
            "worker.queue_name must not be empty".to_string(),
        ));
    }

    if config.worker.queue_capacity == 0 {
        return Err(ConfigError::Invalid(
            "worker.queue_capacity must be > 0".to_string(),
        ));
    }

    if config.executor.default_timeout_ms == 0 {
        return Err(ConfigError::Invalid(
            "executor.default_timeout_ms must be > 0".to_string(),
        ));
    }

    if config.executor.retry_base_delay_ms > config.executor.retry_max_delay_ms {
        return Err(ConfigError::Invalid(format!(
            "executor.retry_base_delay_ms ({}) must not exceed executor.retry_max_delay_ms ({})",
            config.executor.retry_base_delay_ms, config.executor.retry_max_delay_ms
        )));
    }

    if !(0.0..=2.0).contains(&config.planner.temperature) {
        return Err(ConfigError::Invalid(
            "planner.temperature must be within 0.0..=2.0".to_string(),
        ));
    }

    let backend = config.stores.task.backend.as_str();
    if !KNOWN_TASK_STORE_BACKENDS.contains(&backend) {
        return Err(ConfigError::Invalid(format!(
            "stores.task.backend '{}' is not supported",
            backend
        )));
    }

    Ok(())
}
