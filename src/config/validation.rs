//! Configuration validation.
//!
//! # Responsibilities
//! - Semantic validation (serde handles syntactic)
//! - Validate value ranges (timeouts > 0, limits > 0)
//! - Check that enabled subsystems have what they need to run
//!
//! # Design Decisions
//! - Returns all validation errors, not just first
//! - Validation is pure function: IntegrityConfig → Result<(), Vec<ValidationError>>

use std::collections::HashSet;
use std::fmt;

use crate::config::schema::IntegrityConfig;

/// A single semantic problem with a configuration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ValidationError {
    pub field: &'static str,
    pub message: String,
}

impl ValidationError {
    fn new(field: &'static str, message: impl Into<String>) -> Self {
        Self {
            field,
            message: message.into(),
        }
    }
}

impl fmt::Display for ValidationError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.field, self.message)
    }
}

/// Check a configuration, collecting every error found.
pub fn validate_config(config: &IntegrityConfig) -> Result<(), Vec<ValidationError>> {
    let mut errors = Vec::new();

    if config.listener.bind_address.trim().is_empty() {
        errors.push(ValidationError::new("listener.bind_address", "must not be empty"));
    }

    if config.database.path.trim().is_empty() {
        errors.push(ValidationError::new("database.path", "must not be empty"));
    }

    if config.timeouts.request_secs == 0 {
        errors.push(ValidationError::new("timeouts.request_secs", "must be greater than 0"));
    }

    if config.timeouts.sealing_secs == 0 {
        errors.push(ValidationError::new("timeouts.sealing_secs", "must be greater than 0"));
    }

    if config.security.max_body_size == 0 {
        errors.push(ValidationError::new("security.max_body_size", "must be greater than 0"));
    }

    if config.retries.max_attempts == 0 {
        errors.push(ValidationError::new("retries.max_attempts", "must be at least 1"));
    }

    if config.retries.base_delay_ms > config.retries.max_delay_ms {
        errors.push(ValidationError::new(
            "retries.base_delay_ms",
            "must not exceed retries.max_delay_ms",
        ));
    }

    if config.sealing.enabled {
        if config.sealing.host.trim().is_empty() {
            errors.push(ValidationError::new("sealing.host", "required when sealing is enabled"));
        } else if url::Url::parse(&config.sealing.host).is_err() {
            errors.push(ValidationError::new("sealing.host", "is not a valid URL"));
        }
        if config.sealing.username.is_empty() {
            errors.push(ValidationError::new(
                "sealing.username",
                "required when sealing is enabled",
            ));
        }
    }

    if config.auth.enabled && config.auth.tokens.is_empty() {
        errors.push(ValidationError::new(
            "auth.tokens",
            "at least one token is required when auth is enabled",
        ));
    }

    let mut seen = HashSet::new();
    for token in &config.auth.tokens {
        if token.token.is_empty() {
            errors.push(ValidationError::new("auth.tokens", "token must not be empty"));
        } else if !seen.insert(token.token.as_str()) {
            errors.push(ValidationError::new(
                "auth.tokens",
                format!("duplicate token for subject '{}'", token.subject),
            ));
        }
    }

    if config.rate_limit.enabled
        && (config.rate_limit.requests_per_second == 0 || config.rate_limit.burst_size == 0)
    {
        errors.push(ValidationError::new(
            "rate_limit",
            "requests_per_second and burst_size must be greater than 0",
        ));
    }

    if config.forensics.rapid_threshold == 0 || config.forensics.rapid_window_secs == 0 {
        errors.push(ValidationError::new(
            "forensics",
            "rapid_threshold and rapid_window_secs must be greater than 0",
        ));
    }

    if errors.is_empty() {
        Ok(())
    } else {
        Err(errors)
    }
}
