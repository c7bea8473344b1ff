//! Route handlers.
//!
//! Handlers only translate HTTP into service calls. Authorization lives in
//! the services; protected routes get their `Principal` from the auth
//! middleware, public routes act as `Principal::public()`.

pub mod analytics;
pub mod artifacts;
pub mod attestations;
pub mod forensics;
pub mod health;
pub mod provenance;
pub mod verify;

use axum::http::StatusCode;

use crate::services::IngestOutcome;

/// `201` for a new artifact, `200` when an existing one was returned.
pub(crate) fn ingest_status(outcome: &IngestOutcome) -> StatusCode {
    if outcome.duplicate {
        StatusCode::OK
    } else {
        StatusCode::CREATED
    }
}
