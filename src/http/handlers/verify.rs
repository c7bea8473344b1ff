use axum::{
    body::Bytes,
    extract::{
        rejection::{BytesRejection, JsonRejection, QueryRejection},
        Path, Query, State,
    },
    response::{IntoResponse, Response},
    Extension, Json,
};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::auth::{Permission, Principal};
use crate::http::response::{ApiError, ApiResult};
use crate::http::server::AppState;
use crate::services::verification::{Check, DocumentInput, DocumentVerification, Verdict};

/// Body of `POST /verify`: either an ETID (with an optional hash to compare)
/// or the document content itself.
#[derive(Debug, Default, Deserialize)]
pub struct VerifyRequest {
    #[serde(default)]
    pub etid: Option<String>,
    #[serde(default)]
    pub hash: Option<String>,
    #[serde(default)]
    pub document: Option<Value>,
}

#[derive(Debug, Deserialize)]
pub struct PublicVerifyQuery {
    #[serde(default)]
    pub hash: Option<String>,
}

/// What unauthenticated callers learn about a seal.
#[derive(Debug, Serialize)]
pub struct PublicVerification {
    pub etid: String,
    pub is_valid: bool,
    pub verdict: Verdict,
    pub payload_sha256: String,
    pub sealed_at: Option<i64>,
    pub checks: Vec<Check>,
    pub verified_at: i64,
}

pub async fn verify(
    State(state): State<AppState>,
    Extension(principal): Extension<Principal>,
    payload: Result<Json<VerifyRequest>, JsonRejection>,
) -> ApiResult<Response> {
    principal.require(Permission::Read)?;
    let Json(request) = payload?;
    let verification = &state.services.verification;

    let response = match request {
        VerifyRequest { etid: Some(etid), hash, .. } => Json(
            verification
                .verify_by_etid(&principal.subject, &etid, hash.as_deref())
                .await?,
        )
        .into_response(),
        VerifyRequest { document: Some(document), .. } => Json(
            verification.verify_document(&principal.subject, DocumentInput::Json(document))?,
        )
        .into_response(),
        VerifyRequest { hash: Some(hash), .. } => Json(
            verification.verify_document(&principal.subject, DocumentInput::Hash(hash))?,
        )
        .into_response(),
        _ => {
            return Err(ApiError::bad_request(
                "request needs an etid, a document or a hash",
            ))
        }
    };
    Ok(response)
}

/// Verify an uploaded file by content; the body is the file.
pub async fn verify_file(
    State(state): State<AppState>,
    Extension(principal): Extension<Principal>,
    body: Result<Bytes, BytesRejection>,
) -> ApiResult<Json<DocumentVerification>> {
    principal.require(Permission::Read)?;
    let bytes = body?;
    Ok(Json(
        state
            .services
            .verification
            .verify_document(&principal.subject, DocumentInput::Bytes(bytes.to_vec()))?,
    ))
}

/// Unauthenticated verification by ETID. Loan details are not disclosed.
pub async fn public_verify(
    State(state): State<AppState>,
    Path(etid): Path<String>,
    query: Result<Query<PublicVerifyQuery>, QueryRejection>,
) -> ApiResult<Json<PublicVerification>> {
    let Query(query) = query?;
    let public = Principal::public();
    let report = state
        .services
        .verification
        .verify_by_etid(&public.subject, &etid, query.hash.as_deref())
        .await?;

    Ok(Json(PublicVerification {
        etid: report.etid.unwrap_or(etid),
        is_valid: report.is_valid,
        verdict: report.verdict,
        payload_sha256: report.payload_sha256,
        sealed_at: report.sealed_at,
        checks: report.checks,
        verified_at: report.verified_at,
    }))
}
