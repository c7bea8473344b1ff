//! Reporting endpoint.

use axum::{extract::State, Extension, Json};

use crate::auth::Principal;
use crate::http::response::ApiResult;
use crate::http::server::AppState;
use crate::services::AnalyticsSummary;

pub async fn summary(
    State(state): State<AppState>,
    Extension(principal): Extension<Principal>,
) -> ApiResult<Json<AnalyticsSummary>> {
    Ok(Json(state.services.analytics.summary(&principal)?))
}
