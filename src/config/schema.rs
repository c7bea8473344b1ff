//! Configuration schema definitions.
//!
//! This module defines the complete configuration structure for the service.
//! All types derive Serde traits for deserialization from config files.

use serde::{Deserialize, Serialize};

/// Root configuration for IntegrityX.
#[derive(Debug, Clone, Deserialize, Serialize, Default)]
#[serde(default)]
pub struct IntegrityConfig {
    /// Listener configuration (bind address, connection cap).
    pub listener: ListenerConfig,

    /// SQLite storage settings.
    pub database: DatabaseConfig,

    /// External sealing service (Walacor) settings.
    pub sealing: SealingConfig,

    /// Bearer token authentication.
    pub auth: AuthConfig,

    /// Timeout configuration.
    pub timeouts: TimeoutConfig,

    /// Retry configuration for outbound sealing calls.
    pub retries: RetryConfig,

    /// Rate limiting configuration.
    pub rate_limit: RateLimitConfig,

    /// Observability settings.
    pub observability: ObservabilityConfig,

    /// Request limits and input validation.
    pub security: SecurityConfig,

    /// Forensic pattern detection thresholds.
    pub forensics: ForensicsConfig,
}

/// Listener configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ListenerConfig {
    /// Bind address (e.g., "0.0.0.0:8000").
    pub bind_address: String,
}

impl Default for ListenerConfig {
    fn default() -> Self {
        Self {
            bind_address: "0.0.0.0:8000".to_string(),
        }
    }
}

/// SQLite storage configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct DatabaseConfig {
    /// Path to the database file. `:memory:` opens a private in-memory database.
    pub path: String,
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            path: "integrityx.db".to_string(),
        }
    }
}

/// Sealing service configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct SealingConfig {
    /// Talk to a real Walacor instance. When false, seals are issued locally.
    pub enabled: bool,

    /// Base URL of the Walacor instance (e.g., "https://walacor.example.com").
    pub host: String,

    /// Login user name.
    pub username: String,

    /// Login password. Never logged.
    pub password: String,

    /// Schema ETID documents are submitted under.
    pub schema_etid: u64,
}

impl Default for SealingConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            host: String::new(),
            username: String::new(),
            password: String::new(),
            schema_etid: 100_001,
        }
    }
}

/// Roles a bearer token can carry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Deserialize, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Role {
    Admin,
    Underwriter,
    Auditor,
    Viewer,
}

impl Role {
    pub fn as_str(&self) -> &'static str {
        match self {
            Role::Admin => "admin",
            Role::Underwriter => "underwriter",
            Role::Auditor => "auditor",
            Role::Viewer => "viewer",
        }
    }
}

/// A single accepted bearer token.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct TokenConfig {
    /// Opaque token value presented as `Authorization: Bearer <token>`.
    pub token: String,

    /// Subject recorded as the actor on writes.
    pub subject: String,

    /// Role granted to the subject.
    pub role: Role,
}

/// Authentication configuration.
#[derive(Debug, Clone, Deserialize, Serialize, Default)]
#[serde(default)]
pub struct AuthConfig {
    /// Require bearer tokens on non-public routes.
    pub enabled: bool,

    /// Accepted tokens.
    pub tokens: Vec<TokenConfig>,
}

/// Timeout configuration for various operations.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct TimeoutConfig {
    /// Request timeout (total time for request/response) in seconds.
    pub request_secs: u64,

    /// Per-call timeout for the sealing service in seconds.
    pub sealing_secs: u64,
}

impl Default for TimeoutConfig {
    fn default() -> Self {
        Self {
            request_secs: 30,
            sealing_secs: 10,
        }
    }
}

/// Retry configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct RetryConfig {
    /// Maximum number of attempts per sealing call (1 disables retries).
    pub max_attempts: u32,

    /// Base delay for exponential backoff in milliseconds.
    pub base_delay_ms: u64,

    /// Maximum delay for exponential backoff in milliseconds.
    pub max_delay_ms: u64,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            base_delay_ms: 100,
            max_delay_ms: 2000,
        }
    }
}

/// Rate limiting configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct RateLimitConfig {
    /// Enable rate limiting.
    pub enabled: bool,

    /// Maximum requests per second per client.
    pub requests_per_second: u32,

    /// Burst capacity.
    pub burst_size: u32,
}

impl Default for RateLimitConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            requests_per_second: 20,
            burst_size: 40,
        }
    }
}

/// Observability configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ObservabilityConfig {
    /// Log level (trace, debug, info, warn, error).
    pub log_level: String,

    /// Emit JSON log lines instead of the human-readable format.
    pub json_logs: bool,

    /// Enable metrics endpoint.
    pub metrics_enabled: bool,

    /// Metrics endpoint bind address.
    pub metrics_address: String,
}

impl Default for ObservabilityConfig {
    fn default() -> Self {
        Self {
            log_level: "info".to_string(),
            json_logs: false,
            metrics_enabled: false,
            metrics_address: "0.0.0.0:9090".to_string(),
        }
    }
}

/// Security hardening configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct SecurityConfig {
    /// Maximum body size in bytes.
    pub max_body_size: usize,
    /// Enable strict loan document validation.
    pub strict_validation: bool,
}

impl Default for SecurityConfig {
    fn default() -> Self {
        Self {
            max_body_size: 10 * 1024 * 1024, // 10MB
            strict_validation: true,
        }
    }
}

/// Forensic pattern detection thresholds.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ForensicsConfig {
    /// Number of uploads by one subject inside the window that counts as rapid.
    pub rapid_threshold: usize,

    /// Window for rapid submission detection, in seconds.
    pub rapid_window_secs: u64,
}

impl Default for ForensicsConfig {
    fn default() -> Self {
        Self {
            rapid_threshold: 10,
            rapid_window_secs: 60,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_minimal_toml_uses_defaults() {
        let config: IntegrityConfig = toml::from_str("").unwrap();
        assert_eq!(config.listener.bind_address, "0.0.0.0:8000");
        assert!(!config.sealing.enabled);
        assert_eq!(config.sealing.schema_etid, 100_001);
        assert!(!config.rate_limit.enabled);
    }

    #[test]
    fn test_tokens_parse_with_roles() {
        let config: IntegrityConfig = toml::from_str(
            r#"
            [auth]
            enabled = true

            [[auth.tokens]]
            token = "abc"
            subject = "alice"
            role = "underwriter"
            "#,
        )
        .unwrap();
        assert!(config.auth.enabled);
        assert_eq!(config.auth.tokens[0].role, Role::Underwriter);
        assert_eq!(config.auth.tokens[0].subject, "alice");
    }
}
