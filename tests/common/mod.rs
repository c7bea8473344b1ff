//! Shared utilities for integration tests.

#![allow(dead_code)]

use std::collections::HashMap;
use std::net::SocketAddr;
use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use axum::{
    extract::State,
    http::{HeaderMap, StatusCode},
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use serde_json::{json, Value};
use tempfile::TempDir;
use tokio::net::TcpListener;

use integrityx::config::{IntegrityConfig, Role, TokenConfig};
use integrityx::lifecycle::{serve, Shutdown};

pub const ADMIN: &str = "tok-admin";
pub const UNDERWRITER: &str = "tok-underwriter";
pub const AUDITOR: &str = "tok-auditor";
pub const VIEWER: &str = "tok-viewer";

/// Config with auth on and one token per role.
pub fn auth_config() -> IntegrityConfig {
    let mut config = IntegrityConfig::default();
    config.auth.enabled = true;
    config.auth.tokens = [
        (ADMIN, "root", Role::Admin),
        (UNDERWRITER, "uma", Role::Underwriter),
        (AUDITOR, "aldo", Role::Auditor),
        (VIEWER, "vera", Role::Viewer),
    ]
    .into_iter()
    .map(|(token, subject, role)| TokenConfig {
        token: token.into(),
        subject: subject.into(),
        role,
    })
    .collect();
    config.retries.base_delay_ms = 5;
    config.retries.max_delay_ms = 20;
    config
}

/// A running server on an ephemeral port with its own database file.
pub struct TestServer {
    pub addr: SocketAddr,
    pub shutdown: Shutdown,
    _dir: TempDir,
}

impl TestServer {
    pub fn url(&self, path: &str) -> String {
        format!("http://{}{}", self.addr, path)
    }
}

impl Drop for TestServer {
    fn drop(&mut self) {
        self.shutdown.trigger();
    }
}

pub fn client() -> reqwest::Client {
    reqwest::Client::builder()
        .pool_max_idle_per_host(0)
        .no_proxy()
        .build()
        .unwrap()
}

pub async fn start_server(mut config: IntegrityConfig) -> TestServer {
    let dir = tempfile::tempdir().unwrap();
    config.database.path = dir.path().join("integrityx.db").display().to_string();

    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let shutdown = Shutdown::new();
    tokio::spawn(serve(config, listener, shutdown.clone()));

    let server = TestServer {
        addr,
        shutdown,
        _dir: dir,
    };
    wait_until_ready(&server).await;
    server
}

async fn wait_until_ready(server: &TestServer) {
    let client = client();
    for _ in 0..100 {
        if client.get(server.url("/health")).send().await.is_ok() {
            return;
        }
        tokio::time::sleep(Duration::from_millis(20)).await;
    }
    panic!("server at {} did not come up", server.addr);
}

/// Programmable stand-in for the Walacor API.
#[derive(Default)]
pub struct MockWalacor {
    pub logins: AtomicU32,
    pub submits: AtomicU32,
    pub queries: AtomicU32,
    /// Next N submits answer 503.
    pub fail_submits: AtomicU32,
    /// Submits answer 400 while set.
    pub reject_submits: AtomicBool,
    /// Next N authenticated calls answer 401.
    pub expire_tokens: AtomicU32,
    /// Query answers report this hash instead of the sealed one while set.
    pub tamper_records: AtomicBool,
    pub schema_headers: Mutex<Vec<String>>,
    records: Mutex<HashMap<String, Value>>,
}

impl MockWalacor {
    pub fn record_count(&self) -> usize {
        self.records.lock().unwrap().len()
    }

    pub fn record(&self, etid: &str) -> Option<Value> {
        self.records.lock().unwrap().get(etid).cloned()
    }
}

pub struct MockWalacorServer {
    pub addr: SocketAddr,
    pub state: Arc<MockWalacor>,
}

impl MockWalacorServer {
    pub fn url(&self) -> String {
        format!("http://{}", self.addr)
    }
}

pub async fn start_mock_walacor() -> MockWalacorServer {
    let state = Arc::new(MockWalacor::default());
    let app = Router::new()
        .route("/api/auth/login", post(mock_login))
        .route("/api/envelopes/submit", post(mock_submit))
        .route("/api/query/get", post(mock_query))
        .route("/api/health", get(|| async { StatusCode::OK }))
        .with_state(state.clone());

    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        let _ = axum::serve(listener, app).await;
    });

    MockWalacorServer { addr, state }
}

/// Config that seals against `mock`.
pub fn walacor_config(mock: &MockWalacorServer) -> IntegrityConfig {
    let mut config = auth_config();
    config.sealing.enabled = true;
    config.sealing.host = mock.url();
    config.sealing.username = "svc".into();
    config.sealing.password = "secret".into();
    config
}

async fn mock_login(State(state): State<Arc<MockWalacor>>, Json(body): Json<Value>) -> Response {
    if body["userName"] != "svc" || body["password"] != "secret" {
        return StatusCode::UNAUTHORIZED.into_response();
    }
    let n = state.logins.fetch_add(1, Ordering::SeqCst) + 1;
    Json(json!({ "api_token": format!("Bearer mock-{n}") })).into_response()
}

fn authorized(state: &MockWalacor, headers: &HeaderMap) -> bool {
    let bearer = headers
        .get("authorization")
        .and_then(|v| v.to_str().ok())
        .is_some_and(|v| v.starts_with("Bearer mock-"));
    if !bearer {
        return false;
    }
    if let Some(etid) = headers.get("etid").and_then(|v| v.to_str().ok()) {
        state.schema_headers.lock().unwrap().push(etid.to_string());
    }
    state
        .expire_tokens
        .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
        .is_err()
}

async fn mock_submit(
    State(state): State<Arc<MockWalacor>>,
    headers: HeaderMap,
    Json(body): Json<Value>,
) -> Response {
    if !authorized(&state, &headers) {
        return StatusCode::UNAUTHORIZED.into_response();
    }
    let n = state.submits.fetch_add(1, Ordering::SeqCst) + 1;

    if state
        .fail_submits
        .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
        .is_ok()
    {
        return (StatusCode::SERVICE_UNAVAILABLE, "busy").into_response();
    }
    if state.reject_submits.load(Ordering::SeqCst) {
        return (StatusCode::BAD_REQUEST, "schema mismatch").into_response();
    }

    let record = body["Data"][0].clone();
    if !record["hash"].is_string() {
        return (StatusCode::BAD_REQUEST, "missing hash").into_response();
    }

    let etid = format!("wal-{n}");
    state.records.lock().unwrap().insert(etid.clone(), record);
    Json(json!({ "success": true, "data": { "EId": etid, "UID": [format!("tx-{n}")] } }))
        .into_response()
}

async fn mock_query(
    State(state): State<Arc<MockWalacor>>,
    headers: HeaderMap,
    Json(body): Json<Value>,
) -> Response {
    if !authorized(&state, &headers) {
        return StatusCode::UNAUTHORIZED.into_response();
    }
    state.queries.fetch_add(1, Ordering::SeqCst);

    let etid = body["EId"].as_str().unwrap_or_default();
    let record = state.records.lock().unwrap().get(etid).cloned();
    match record {
        Some(mut record) => {
            if state.tamper_records.load(Ordering::SeqCst) {
                record["hash"] = json!("0".repeat(64));
            }
            Json(json!({ "success": true, "data": [record] })).into_response()
        }
        None => (StatusCode::NOT_FOUND, "unknown EId").into_response(),
    }
}
