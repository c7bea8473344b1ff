//! IntegrityX server.
//!
//! # Architecture Overview
//!
//! ```text
//!     Client ──▶ http (axum router, middleware, handlers)
//!                  │
//!                  ▼
//!               services (ingest, verification, attestations,
//!                  │      provenance, analytics, forensics)
//!          ┌───────┴────────┐
//!          ▼                ▼
//!      storage           sealing ──▶ Walacor (or simulated)
//!      (SQLite)
//!
//!   cross-cutting: config, auth, observability, resilience, lifecycle
//! ```
//!
//! Configuration comes from the TOML file named by `INTEGRITYX_CONFIG`, or
//! from defaults plus environment variables when it is unset.

use std::process::ExitCode;

use integrityx::lifecycle::{self, Shutdown};
use integrityx::observability::logging;

#[tokio::main]
async fn main() -> ExitCode {
    let config = match lifecycle::load_configuration() {
        Ok(config) => config,
        Err(e) => {
            eprintln!("integrityx: {e}");
            return ExitCode::FAILURE;
        }
    };

    logging::init_logging(&config.observability);

    tracing::info!(
        version = env!("CARGO_PKG_VERSION"),
        bind_address = %config.listener.bind_address,
        database = %config.database.path,
        sealing_enabled = config.sealing.enabled,
        auth_enabled = config.auth.enabled,
        "integrityx starting"
    );

    let shutdown = Shutdown::new();
    shutdown.trigger_on_signal();

    match lifecycle::run(config, shutdown).await {
        Ok(()) => {
            tracing::info!("Shutdown complete");
            ExitCode::SUCCESS
        }
        Err(e) => {
            tracing::error!(error = %e, "integrityx failed");
            ExitCode::FAILURE
        }
    }
}
