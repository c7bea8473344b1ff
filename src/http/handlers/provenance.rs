use axum::{
    extract::{rejection::JsonRejection, Path, State},
    http::StatusCode,
    response::IntoResponse,
    Extension, Json,
};

use crate::auth::Principal;
use crate::http::response::ApiResult;
use crate::http::server::AppState;
use crate::services::{LinkRequest, ProvenanceChain};

pub async fn create_link(
    State(state): State<AppState>,
    Extension(principal): Extension<Principal>,
    payload: Result<Json<LinkRequest>, JsonRejection>,
) -> ApiResult<impl IntoResponse> {
    let Json(request) = payload?;
    let link = state.services.provenance.link(&principal, request)?;
    Ok((StatusCode::CREATED, Json(link)))
}

pub async fn get_chain(
    State(state): State<AppState>,
    Extension(principal): Extension<Principal>,
    Path(etid): Path<String>,
) -> ApiResult<Json<ProvenanceChain>> {
    Ok(Json(state.services.provenance.chain(&principal, &etid)?))
}
