use axum::{
    body::Bytes,
    extract::{
        rejection::{BytesRejection, JsonRejection, QueryRejection},
        Path, Query, State,
    },
    http::HeaderMap,
    response::IntoResponse,
    Extension, Json,
};
use serde::{Deserialize, Serialize};

use crate::auth::{Permission, Principal};
use crate::domain::{Artifact, SealStatus};
use crate::http::handlers::ingest_status;
use crate::http::response::ApiResult;
use crate::http::server::AppState;
use crate::services::{IngestFile, IngestJson};
use crate::storage::ArtifactFilter;

pub const X_FILENAME: &str = "x-filename";

#[derive(Debug, Deserialize)]
pub struct IngestFileQuery {
    pub loan_id: String,
    #[serde(default)]
    pub filename: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
pub struct ArtifactQuery {
    pub loan_id: Option<String>,
    pub status: Option<SealStatus>,
    pub created_by: Option<String>,
    pub limit: Option<u32>,
    #[serde(default)]
    pub offset: u32,
}

#[derive(Debug, Serialize)]
pub struct ArtifactList {
    pub artifacts: Vec<Artifact>,
    pub count: usize,
}

pub async fn ingest_json(
    State(state): State<AppState>,
    Extension(principal): Extension<Principal>,
    payload: Result<Json<IngestJson>, JsonRejection>,
) -> ApiResult<impl IntoResponse> {
    let Json(request) = payload?;
    let outcome = state.services.ingest.ingest_json(&principal, request).await?;
    Ok((ingest_status(&outcome), Json(outcome)))
}

/// Raw upload; the body is the file.
pub async fn ingest_file(
    State(state): State<AppState>,
    Extension(principal): Extension<Principal>,
    query: Result<Query<IngestFileQuery>, QueryRejection>,
    headers: HeaderMap,
    body: Result<Bytes, BytesRejection>,
) -> ApiResult<impl IntoResponse> {
    let Query(query) = query?;
    let bytes = body?;
    let filename = headers
        .get(X_FILENAME)
        .and_then(|v| v.to_str().ok())
        .map(str::to_string)
        .or(query.filename);

    let outcome = state
        .services
        .ingest
        .ingest_file(
            &principal,
            IngestFile {
                loan_id: query.loan_id,
                filename,
                bytes: bytes.to_vec(),
                metadata: None,
            },
        )
        .await?;
    Ok((ingest_status(&outcome), Json(outcome)))
}

pub async fn list_artifacts(
    State(state): State<AppState>,
    Extension(principal): Extension<Principal>,
    query: Result<Query<ArtifactQuery>, QueryRejection>,
) -> ApiResult<Json<ArtifactList>> {
    principal.require(Permission::Read)?;
    let Query(query) = query?;
    let artifacts = state.services.ingest.list(&ArtifactFilter {
        loan_id: query.loan_id,
        status: query.status,
        created_by: query.created_by,
        limit: query.limit,
        offset: query.offset,
    })?;
    Ok(Json(ArtifactList {
        count: artifacts.len(),
        artifacts,
    }))
}

pub async fn get_artifact(
    State(state): State<AppState>,
    Extension(principal): Extension<Principal>,
    Path(id): Path<String>,
) -> ApiResult<Json<Artifact>> {
    principal.require(Permission::Read)?;
    Ok(Json(state.services.ingest.get(&id)?))
}

/// Retry sealing for a pending or failed artifact.
pub async fn reseal(
    State(state): State<AppState>,
    Extension(principal): Extension<Principal>,
    Path(id): Path<String>,
) -> ApiResult<Json<Artifact>> {
    Ok(Json(state.services.ingest.reseal(&principal, &id).await?))
}
