//! Bearer token authentication.

use axum::{
    body::Body,
    extract::State,
    http::{header, Request},
    middleware::Next,
    response::{IntoResponse, Response},
};

use crate::http::request::request_id;
use crate::http::response::ApiError;
use crate::http::server::AppState;

/// Resolve the caller and attach its `Principal` to the request.
///
/// With authentication disabled every request becomes the anonymous admin.
pub async fn auth_middleware(
    State(state): State<AppState>,
    mut request: Request<Body>,
    next: Next,
) -> Response {
    let authorization = request
        .headers()
        .get(header::AUTHORIZATION)
        .and_then(|v| v.to_str().ok());

    match state.tokens.authenticate(authorization) {
        Ok(principal) => {
            tracing::debug!(
                request_id = %request_id(request.headers()),
                subject = %principal.subject,
                role = principal.role.as_str(),
                "Request authenticated"
            );
            request.extensions_mut().insert(principal);
            next.run(request).await
        }
        Err(e) => {
            tracing::warn!(
                request_id = %request_id(request.headers()),
                path = %request.uri().path(),
                error = %e,
                "Authentication failed"
            );
            ApiError::from(e).into_response()
        }
    }
}
