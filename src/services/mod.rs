//! Application services.
//!
//! # Data Flow
//! ```text
//! HTTP handler (principal, request body)
//!     → service (validation, hashing, sealing, analysis)
//!     → storage repositories (one transaction per write)
//!     → Sealer (Walacor or simulated)
//! ```
//!
//! # Design Decisions
//! - The database lock is never held across an await
//! - Every state change on an artifact appends a timeline event in the same transaction

pub mod analytics;
pub mod attestations;
pub mod error;
pub mod forensics;
pub mod ingest;
pub mod provenance;
pub mod verification;

use std::sync::Arc;

use crate::config::IntegrityConfig;
use crate::domain::Artifact;
use crate::sealing::Sealer;
use crate::storage::{ArtifactRepo, Database};

pub use analytics::{AnalyticsService, AnalyticsSummary};
pub use attestations::{AttestationService, CreateAttestation};
pub use error::{ServiceError, ServiceResult};
pub use forensics::{DocumentDiff, ForensicsService, PatternFinding};
pub use ingest::{IngestFile, IngestJson, IngestOutcome, IngestService};
pub use provenance::{LinkRequest, ProvenanceChain, ProvenanceService};
pub use verification::{DocumentVerification, VerificationReport, VerificationService};

/// Shared dependencies handed to every service.
#[derive(Clone)]
pub struct ServiceContext {
    pub db: Arc<Database>,
    pub sealer: Arc<dyn Sealer>,
    pub config: Arc<IntegrityConfig>,
}

impl ServiceContext {
    pub fn new(db: Arc<Database>, sealer: Arc<dyn Sealer>, config: Arc<IntegrityConfig>) -> Self {
        Self { db, sealer, config }
    }

    /// Load an artifact by ETID or id, or fail with `NotFound`.
    pub(crate) fn resolve_artifact(&self, key: &str) -> ServiceResult<Artifact> {
        self.db
            .read(|conn| ArtifactRepo::new(conn).resolve(key.trim()))?
            .ok_or_else(|| ServiceError::NotFound(format!("artifact '{}'", key.trim())))
    }
}

/// All services, cloned into the HTTP state.
#[derive(Clone)]
pub struct Services {
    pub ingest: IngestService,
    pub verification: VerificationService,
    pub attestations: AttestationService,
    pub provenance: ProvenanceService,
    pub analytics: AnalyticsService,
    pub forensics: ForensicsService,
    pub context: ServiceContext,
}

impl Services {
    pub fn new(context: ServiceContext) -> Self {
        Self {
            ingest: IngestService::new(context.clone()),
            verification: VerificationService::new(context.clone()),
            attestations: AttestationService::new(context.clone()),
            provenance: ProvenanceService::new(context.clone()),
            analytics: AnalyticsService::new(context.clone()),
            forensics: ForensicsService::new(context.clone()),
            context,
        }
    }
}

#[cfg(test)]
pub(crate) mod testing {
    use super::*;
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicBool, Ordering};

    use crate::auth::Principal;
    use crate::config::Role;
    use crate::sealing::{
        LocalSealer, SealError, SealMode, SealReceipt, SealRequest, SealResult, SealedRecord,
    };

    /// Sealer that fails until switched on, then delegates to a local sealer.
    #[derive(Default)]
    pub struct FlakySealer {
        pub available: AtomicBool,
        pub inner: LocalSealer,
    }

    #[async_trait]
    impl Sealer for FlakySealer {
        async fn seal(&self, request: &SealRequest) -> SealResult<SealReceipt> {
            if self.available.load(Ordering::SeqCst) {
                self.inner.seal(request).await
            } else {
                Err(SealError::Transport("connection refused".into()))
            }
        }

        async fn fetch(&self, etid: &str) -> SealResult<Option<SealedRecord>> {
            self.inner.fetch(etid).await
        }

        async fn health(&self) -> bool {
            self.available.load(Ordering::SeqCst)
        }

        fn mode(&self) -> SealMode {
            SealMode::Walacor
        }
    }

    pub fn context_with(sealer: Arc<dyn Sealer>) -> ServiceContext {
        ServiceContext::new(
            Arc::new(Database::open_in_memory().unwrap()),
            sealer,
            Arc::new(IntegrityConfig::default()),
        )
    }

    pub fn context() -> ServiceContext {
        context_with(Arc::new(LocalSealer::new()))
    }

    pub fn underwriter() -> Principal {
        Principal::new("uma", Role::Underwriter)
    }
}
