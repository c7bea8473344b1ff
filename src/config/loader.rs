//! Configuration loading from disk and environment.

use std::fs;
use std::path::Path;

use thiserror::Error;

use crate::config::schema::IntegrityConfig;
use crate::config::validation::{validate_config, ValidationError};

/// Error type for configuration loading.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config: {0}")]
    Io(#[from] std::io::Error),
    #[error("failed to parse config: {0}")]
    Parse(#[from] toml::de::Error),
    #[error("invalid config: {}", join_errors(.0))]
    Validation(Vec<ValidationError>),
}

fn join_errors(errors: &[ValidationError]) -> String {
    errors
        .iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join(", ")
}

/// Load, override from environment, and validate configuration from a TOML file.
pub fn load_config(path: &Path) -> Result<IntegrityConfig, ConfigError> {
    let content = fs::read_to_string(path)?;
    let mut config: IntegrityConfig = toml::from_str(&content)?;

    apply_env_overrides(&mut config, |key| std::env::var(key).ok());
    validate_config(&config).map_err(ConfigError::Validation)?;

    Ok(config)
}

/// Build configuration from defaults plus environment, for runs without a file.
pub fn load_from_env() -> Result<IntegrityConfig, ConfigError> {
    let mut config = IntegrityConfig::default();
    apply_env_overrides(&mut config, |key| std::env::var(key).ok());
    validate_config(&config).map_err(ConfigError::Validation)?;
    Ok(config)
}

/// Apply environment overrides using the given lookup.
///
/// Setting `WALACOR_HOST` turns on sealing against that host.
pub fn apply_env_overrides<F>(config: &mut IntegrityConfig, lookup: F)
where
    F: Fn(&str) -> Option<String>,
{
    if let Some(bind) = lookup("INTEGRITYX_BIND") {
        config.listener.bind_address = bind;
    }
    if let Some(url) = lookup("DATABASE_URL") {
        config.database.path = url
            .strip_prefix("sqlite://")
            .or_else(|| url.strip_prefix("sqlite:"))
            .unwrap_or(&url)
            .to_string();
    }
    if let Some(host) = lookup("WALACOR_HOST") {
        config.sealing.host = host;
        config.sealing.enabled = true;
    }
    if let Some(user) = lookup("WALACOR_USERNAME") {
        config.sealing.username = user;
    }
    if let Some(password) = lookup("WALACOR_PASSWORD") {
        config.sealing.password = password;
    }
    if let Some(level) = lookup("INTEGRITYX_LOG") {
        config.observability.log_level = level;
    }
}
