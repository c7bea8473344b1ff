use axum::{
    extract::{
        rejection::{JsonRejection, QueryRejection},
        Path, Query, State,
    },
    http::StatusCode,
    response::IntoResponse,
    Extension, Json,
};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::auth::Principal;
use crate::domain::{Attestation, AttestationStatus};
use crate::http::response::{ApiError, ApiResult};
use crate::http::server::AppState;
use crate::services::CreateAttestation;
use crate::storage::AttestationFilter;

#[derive(Debug, Default, Deserialize)]
pub struct AttestationQuery {
    pub artifact_id: Option<Uuid>,
    pub status: Option<AttestationStatus>,
    pub limit: Option<u32>,
    #[serde(default)]
    pub offset: u32,
}

#[derive(Debug, Deserialize)]
pub struct StatusUpdate {
    pub status: AttestationStatus,
}

#[derive(Debug, Serialize)]
pub struct AttestationList {
    pub attestations: Vec<Attestation>,
    pub count: usize,
}

pub async fn create_attestation(
    State(state): State<AppState>,
    Extension(principal): Extension<Principal>,
    payload: Result<Json<CreateAttestation>, JsonRejection>,
) -> ApiResult<impl IntoResponse> {
    let Json(request) = payload?;
    let attestation = state.services.attestations.create(&principal, request)?;
    Ok((StatusCode::CREATED, Json(attestation)))
}

pub async fn list_attestations(
    State(state): State<AppState>,
    Extension(principal): Extension<Principal>,
    query: Result<Query<AttestationQuery>, QueryRejection>,
) -> ApiResult<Json<AttestationList>> {
    let Query(query) = query?;
    let attestations = state.services.attestations.list(
        &principal,
        &AttestationFilter {
            artifact_id: query.artifact_id,
            status: query.status,
            limit: query.limit,
            offset: query.offset,
        },
    )?;
    Ok(Json(AttestationList {
        count: attestations.len(),
        attestations,
    }))
}

pub async fn update_attestation(
    State(state): State<AppState>,
    Extension(principal): Extension<Principal>,
    Path(id): Path<String>,
    payload: Result<Json<StatusUpdate>, JsonRejection>,
) -> ApiResult<Json<Attestation>> {
    let id = Uuid::parse_str(&id)
        .map_err(|_| ApiError::bad_request(format!("'{id}' is not an attestation id")))?;
    let Json(update) = payload?;
    Ok(Json(
        state
            .services
            .attestations
            .update_status(&principal, id, update.status)?,
    ))
}
