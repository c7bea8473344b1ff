//! Sealing subsystem.
//!
//! # Data Flow
//! ```text
//! Environment / config (host, credentials)
//!     → client.rs (Walacor login, submit, query with timeouts and retries)
//!     → local.rs  (in-process seals when no Walacor instance is configured)
//!     → Sealer trait object shared by the services
//! ```
//!
//! # Security Constraints
//! - Only hashes and identifiers leave the service, never document bodies
//! - Credentials are never logged
//! - Sealing failures never lose an upload; artifacts stay `pending_seal`

pub mod client;
pub mod local;
pub mod types;

use async_trait::async_trait;
use std::sync::Arc;

use crate::config::IntegrityConfig;

pub use client::WalacorClient;
pub use local::LocalSealer;
pub use types::{SealError, SealMode, SealReceipt, SealRequest, SealResult, SealedRecord};

/// Something that can seal document hashes and read seals back.
#[async_trait]
pub trait Sealer: Send + Sync {
    /// Submit a hash for sealing.
    async fn seal(&self, request: &SealRequest) -> SealResult<SealReceipt>;

    /// Look a sealed record up. `Ok(None)` when the service does not know the ETID.
    async fn fetch(&self, etid: &str) -> SealResult<Option<SealedRecord>>;

    /// Whether the service is reachable.
    async fn health(&self) -> bool;

    fn mode(&self) -> SealMode;
}

/// Build the sealer selected by configuration.
pub fn build_sealer(config: &IntegrityConfig) -> SealResult<Arc<dyn Sealer>> {
    if config.sealing.enabled {
        let client = WalacorClient::new(
            config.sealing.clone(),
            config.retries.clone(),
            config.timeouts.sealing_secs,
        )?;
        Ok(Arc::new(client))
    } else {
        tracing::warn!("Sealing service disabled, issuing simulated seals");
        Ok(Arc::new(LocalSealer::new()))
    }
}
