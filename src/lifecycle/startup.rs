//! Startup orchestration.
//!
//! # Order
//! 1. Load and validate configuration
//! 2. Metrics exporter (when enabled)
//! 3. Database (migrations applied on open)
//! 4. Sealer, with a reachability probe that only logs
//! 5. Bind the listener last, so traffic arrives only once everything is ready

use std::net::SocketAddr;
use std::path::Path;
use std::sync::Arc;

use thiserror::Error;
use tokio::net::TcpListener;

use crate::config::{load_config, load_from_env, ConfigError, IntegrityConfig};
use crate::http::HttpServer;
use crate::lifecycle::Shutdown;
use crate::observability::metrics;
use crate::sealing::{build_sealer, SealError};
use crate::storage::{Database, DbError};

/// Environment variable naming the TOML config file.
pub const CONFIG_ENV: &str = "INTEGRITYX_CONFIG";

#[derive(Debug, Error)]
pub enum StartupError {
    #[error("configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("database error: {0}")]
    Database(#[from] DbError),

    #[error("sealing setup failed: {0}")]
    Sealing(#[from] SealError),

    #[error("invalid metrics address '{0}'")]
    MetricsAddress(String),

    #[error("failed to bind {address}: {source}")]
    Bind {
        address: String,
        source: std::io::Error,
    },

    #[error("server error: {0}")]
    Serve(std::io::Error),
}

/// Config from the file named by `INTEGRITYX_CONFIG`, or defaults plus environment.
pub fn load_configuration() -> Result<IntegrityConfig, ConfigError> {
    match std::env::var_os(CONFIG_ENV) {
        Some(path) => load_config(Path::new(&path)),
        None => load_from_env(),
    }
}

/// Bind the configured address and serve until shutdown.
pub async fn run(config: IntegrityConfig, shutdown: Shutdown) -> Result<(), StartupError> {
    let signal = shutdown.subscribe();
    let address = config.listener.bind_address.clone();
    let server = build_server(config).await?;
    let listener = TcpListener::bind(&address)
        .await
        .map_err(|source| StartupError::Bind { address, source })?;
    server
        .run(listener, signal)
        .await
        .map_err(StartupError::Serve)
}

/// Serve on an already bound listener.
pub async fn serve(
    config: IntegrityConfig,
    listener: TcpListener,
    shutdown: Shutdown,
) -> Result<(), StartupError> {
    let signal = shutdown.subscribe();
    let server = build_server(config).await?;
    server
        .run(listener, signal)
        .await
        .map_err(StartupError::Serve)
}

async fn build_server(config: IntegrityConfig) -> Result<HttpServer, StartupError> {
    if config.observability.metrics_enabled {
        let addr: SocketAddr = config
            .observability
            .metrics_address
            .parse()
            .map_err(|_| StartupError::MetricsAddress(config.observability.metrics_address.clone()))?;
        metrics::init_metrics(addr);
    }

    let db = Arc::new(Database::open(&config.database.path)?);
    tracing::info!(path = %config.database.path, "Database ready");

    let sealer = build_sealer(&config)?;
    if sealer.health().await {
        tracing::info!(mode = ?sealer.mode(), "Sealing service reachable");
    } else {
        tracing::warn!(
            mode = ?sealer.mode(),
            "Sealing service unreachable, uploads will wait in pending_seal"
        );
    }

    Ok(HttpServer::new(config, db, sealer))
}
