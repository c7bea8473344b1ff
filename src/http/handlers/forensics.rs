//! Forensic endpoints: document diffs and cross-artifact patterns.

use axum::{
    extract::{rejection::QueryRejection, Query, State},
    Extension, Json,
};
use serde::{Deserialize, Serialize};

use crate::auth::Principal;
use crate::domain::now_millis;
use crate::http::response::ApiResult;
use crate::http::server::AppState;
use crate::services::{DocumentDiff, PatternFinding};

/// Either side may be an artifact id or an ETID.
#[derive(Debug, Deserialize)]
pub struct DiffQuery {
    pub left: String,
    pub right: String,
}

#[derive(Debug, Serialize)]
pub struct PatternReport {
    pub findings: Vec<PatternFinding>,
    pub count: usize,
    pub generated_at: i64,
}

pub async fn diff(
    State(state): State<AppState>,
    Extension(principal): Extension<Principal>,
    query: Result<Query<DiffQuery>, QueryRejection>,
) -> ApiResult<Json<DocumentDiff>> {
    let Query(query) = query?;
    Ok(Json(
        state
            .services
            .forensics
            .diff(&principal, &query.left, &query.right)?,
    ))
}

pub async fn patterns(
    State(state): State<AppState>,
    Extension(principal): Extension<Principal>,
) -> ApiResult<Json<PatternReport>> {
    let findings = state.services.forensics.detect_patterns(&principal)?;
    Ok(Json(PatternReport {
        count: findings.len(),
        findings,
        generated_at: now_millis(),
    }))
}
