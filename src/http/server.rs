//! HTTP server setup and configuration.
//!
//! # Responsibilities
//! - Create Axum Router with all handlers
//! - Wire up middleware (request ID, tracing, timeout, metrics, limits, auth)
//! - Bind server to listener
//! - Stop accepting on shutdown and drain in-flight requests

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use axum::{
    extract::DefaultBodyLimit,
    middleware,
    routing::{get, patch, post},
    Router,
};
use tokio::net::TcpListener;
use tokio::sync::broadcast;
use tower_http::{timeout::TimeoutLayer, trace::TraceLayer};

use crate::auth::TokenStore;
use crate::config::IntegrityConfig;
use crate::http::handlers::{
    analytics, artifacts, attestations, forensics, health, provenance, verify,
};
use crate::http::middleware::{auth_middleware, track_metrics};
use crate::http::request::{make_span, propagate_request_id_layer, set_request_id_layer};
use crate::sealing::Sealer;
use crate::security::{rate_limit_middleware, RateLimiterState};
use crate::services::{ServiceContext, Services};
use crate::storage::Database;

/// Application state injected into handlers.
#[derive(Clone)]
pub struct AppState {
    pub services: Services,
    pub tokens: Arc<TokenStore>,
    pub config: Arc<IntegrityConfig>,
}

/// HTTP server for the IntegrityX API.
pub struct HttpServer {
    router: Router,
    config: Arc<IntegrityConfig>,
}

impl HttpServer {
    pub fn new(config: IntegrityConfig, db: Arc<Database>, sealer: Arc<dyn Sealer>) -> Self {
        let config = Arc::new(config);
        let context = ServiceContext::new(db, sealer, config.clone());
        let state = AppState {
            services: Services::new(context),
            tokens: Arc::new(TokenStore::from_config(&config.auth)),
            config: config.clone(),
        };

        if !state.tokens.enabled() {
            tracing::warn!("Authentication disabled, all requests act as anonymous admin");
        }

        let router = Self::build_router(&config, state);
        Self { router, config }
    }

    /// Build the Axum router with all middleware layers.
    #[allow(deprecated)]
    fn build_router(config: &IntegrityConfig, state: AppState) -> Router {
        let public = Router::new()
            .route("/health", get(health::health))
            .route("/public/verify/{etid}", get(verify::public_verify));

        let protected = Router::new()
            .route("/ingest-json", post(artifacts::ingest_json))
            .route("/ingest-file", post(artifacts::ingest_file))
            .route("/artifacts", get(artifacts::list_artifacts))
            .route("/artifacts/{id}", get(artifacts::get_artifact))
            .route("/artifacts/{id}/seal", post(artifacts::reseal))
            .route("/verify", post(verify::verify))
            .route("/verify-file", post(verify::verify_file))
            .route(
                "/attestations",
                post(attestations::create_attestation).get(attestations::list_attestations),
            )
            .route("/attestations/{id}", patch(attestations::update_attestation))
            .route("/provenance/link", post(provenance::create_link))
            .route("/provenance/{etid}", get(provenance::get_chain))
            .route("/analytics/summary", get(analytics::summary))
            .route("/forensics/diff", get(forensics::diff))
            .route("/forensics/patterns", get(forensics::patterns))
            .route_layer(middleware::from_fn_with_state(state.clone(), auth_middleware));

        let mut router = public
            .merge(protected)
            .with_state(state)
            .layer(DefaultBodyLimit::max(config.security.max_body_size));

        if config.rate_limit.enabled {
            let limiter = Arc::new(RateLimiterState::new(&config.rate_limit));
            router = router.layer(middleware::from_fn_with_state(limiter, rate_limit_middleware));
        }

        router
            .layer(middleware::from_fn(track_metrics))
            .layer(TimeoutLayer::new(Duration::from_secs(config.timeouts.request_secs)))
            .layer(TraceLayer::new_for_http().make_span_with(make_span))
            .layer(propagate_request_id_layer())
            .layer(set_request_id_layer())
    }

    /// The router with all layers, for in-process use.
    pub fn router(&self) -> Router {
        self.router.clone()
    }

    /// Run the server until `shutdown` fires, then drain in-flight requests.
    pub async fn run(
        self,
        listener: TcpListener,
        mut shutdown: broadcast::Receiver<()>,
    ) -> Result<(), std::io::Error> {
        let addr = listener.local_addr()?;
        tracing::info!(
            address = %addr,
            max_body_size = self.config.security.max_body_size,
            rate_limit = self.config.rate_limit.enabled,
            "HTTP server starting"
        );

        let app = self.router.into_make_service_with_connect_info::<SocketAddr>();

        axum::serve(listener, app)
            .with_graceful_shutdown(async move {
                let _ = shutdown.recv().await;
                tracing::info!("Shutdown signal received");
            })
            .await?;

        tracing::info!("HTTP server stopped");
        Ok(())
    }

    pub fn config(&self) -> &IntegrityConfig {
        &self.config
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::body::Body;
    use axum::http::{header, Request, StatusCode};
    use serde_json::{json, Value};
    use tower::ServiceExt;

    use crate::config::{Role, TokenConfig};
    use crate::sealing::LocalSealer;

    fn server(config: IntegrityConfig) -> Router {
        HttpServer::new(
            config,
            Arc::new(Database::open_in_memory().unwrap()),
            Arc::new(LocalSealer::new()),
        )
        .router()
    }

    fn auth_config() -> IntegrityConfig {
        let mut config = IntegrityConfig::default();
        config.auth.enabled = true;
        config.auth.tokens = vec![
            TokenConfig { token: "uw".into(), subject: "uma".into(), role: Role::Underwriter },
            TokenConfig { token: "view".into(), subject: "vic".into(), role: Role::Viewer },
            TokenConfig { token: "audit".into(), subject: "ada".into(), role: Role::Auditor },
        ];
        config
    }

    async fn send(app: &Router, request: Request<Body>) -> (StatusCode, Value) {
        let response = app.clone().oneshot(request).await.unwrap();
        let status = response.status();
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX).await.unwrap();
        let body = if bytes.is_empty() {
            Value::Null
        } else {
            serde_json::from_slice(&bytes).unwrap()
        };
        (status, body)
    }

    fn json_request(method: &str, uri: &str, token: Option<&str>, body: Value) -> Request<Body> {
        let mut builder = Request::builder()
            .method(method)
            .uri(uri)
            .header(header::CONTENT_TYPE, "application/json");
        if let Some(token) = token {
            builder = builder.header(header::AUTHORIZATION, format!("Bearer {token}"));
        }
        builder.body(Body::from(body.to_string())).unwrap()
    }

    #[tokio::test]
    async fn test_health_is_public_and_has_request_id() {
        let app = server(auth_config());
        let response = app
            .clone()
            .oneshot(Request::get("/health").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        assert!(response.headers().contains_key("x-request-id"));
    }

    #[tokio::test]
    async fn test_auth_required_and_roles_enforced() {
        let app = server(auth_config());
        let doc = json!({"loan_id": "LN-1", "document": {"loan_amount": 10}});

        let (status, body) = send(&app, json_request("POST", "/ingest-json", None, doc.clone())).await;
        assert_eq!(status, StatusCode::UNAUTHORIZED);
        assert_eq!(body["error"]["code"], "unauthorized");

        let (status, _) =
            send(&app, json_request("POST", "/ingest-json", Some("view"), doc.clone())).await;
        assert_eq!(status, StatusCode::FORBIDDEN);

        let (status, body) = send(&app, json_request("POST", "/ingest-json", Some("uw"), doc)).await;
        assert_eq!(status, StatusCode::CREATED);
        assert_eq!(body["artifact"]["status"], "sealed");
    }

    #[tokio::test]
    async fn test_forensics_routes_need_forensics_role() {
        let app = server(auth_config());
        let get = |token: &str| {
            Request::get("/forensics/patterns")
                .header(header::AUTHORIZATION, format!("Bearer {token}"))
                .body(Body::empty())
                .unwrap()
        };

        let (status, _) = send(&app, get("view")).await;
        assert_eq!(status, StatusCode::FORBIDDEN);

        let (status, body) = send(&app, get("audit")).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["count"], 0);

        let diff = Request::get("/forensics/diff?left=local-a")
            .header(header::AUTHORIZATION, "Bearer audit")
            .body(Body::empty())
            .unwrap();
        let (status, body) = send(&app, diff).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["error"]["code"], "validation_error");
    }

    #[tokio::test]
    async fn test_malformed_body_uses_error_envelope() {
        let app = server(IntegrityConfig::default());
        let request = Request::post("/ingest-json")
            .header(header::CONTENT_TYPE, "application/json")
            .body(Body::from("{not json"))
            .unwrap();
        let (status, body) = send(&app, request).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["error"]["code"], "validation_error");
    }

    #[tokio::test]
    async fn test_rate_limit_rejects_over_burst() {
        let mut config = IntegrityConfig::default();
        config.rate_limit.enabled = true;
        config.rate_limit.requests_per_second = 1;
        config.rate_limit.burst_size = 2;
        let app = server(config);

        let mut statuses = Vec::new();
        for _ in 0..3 {
            let (status, _) = send(&app, Request::get("/health").body(Body::empty()).unwrap()).await;
            statuses.push(status);
        }
        assert_eq!(
            statuses,
            vec![StatusCode::OK, StatusCode::OK, StatusCode::TOO_MANY_REQUESTS]
        );
    }
}
