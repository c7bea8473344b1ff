use axum::{extract::State, http::StatusCode, response::IntoResponse, Json};
use serde::Serialize;

use crate::http::server::AppState;
use crate::sealing::SealMode;

#[derive(Debug, Serialize)]
pub struct SealingHealth {
    pub mode: SealMode,
    pub reachable: bool,
}

#[derive(Debug, Serialize)]
pub struct HealthStatus {
    pub status: &'static str,
    pub version: &'static str,
    pub database: bool,
    pub sealing: SealingHealth,
}

/// Liveness plus dependency status. Only a dead database makes this fail;
/// an unreachable sealing service degrades it.
pub async fn health(State(state): State<AppState>) -> impl IntoResponse {
    let context = &state.services.context;
    let database = context.db.ping();
    let sealing = SealingHealth {
        mode: context.sealer.mode(),
        reachable: context.sealer.health().await,
    };

    let (code, status) = match (database, sealing.reachable) {
        (false, _) => (StatusCode::SERVICE_UNAVAILABLE, "unavailable"),
        (true, false) => (StatusCode::OK, "degraded"),
        (true, true) => (StatusCode::OK, "ok"),
    };

    (
        code,
        Json(HealthStatus {
            status,
            version: env!("CARGO_PKG_VERSION"),
            database,
            sealing,
        }),
    )
}
