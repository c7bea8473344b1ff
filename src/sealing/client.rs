//! Walacor HTTP client with login, timeouts, and retries.
//!
//! # Responsibilities
//! - Log in and cache the bearer token; log in again once when it is refused
//! - Submit document hashes under the configured schema ETID
//! - Look sealed records up by ETID
//! - Provide a health probe for the sealing service

use async_trait::async_trait;
use reqwest::{Method, StatusCode};
use serde_json::{json, Value};
use std::time::Duration;
use tokio::sync::RwLock;
use url::Url;

use crate::config::{RetryConfig, SealingConfig};
use crate::resilience::retry_with_backoff;
use crate::sealing::types::{
    SealError, SealMode, SealReceipt, SealRequest, SealResult, SealedRecord,
};
use crate::sealing::Sealer;

const LOGIN_PATH: &str = "/api/auth/login";
const SUBMIT_PATH: &str = "/api/envelopes/submit";
const QUERY_PATH: &str = "/api/query/get";
const HEALTH_PATH: &str = "/api/health";

/// Client for a remote Walacor instance.
pub struct WalacorClient {
    http: reqwest::Client,
    base: Url,
    config: SealingConfig,
    retries: RetryConfig,
    timeout_secs: u64,
    token: RwLock<Option<String>>,
}

impl WalacorClient {
    /// Build a client. Does not contact the service.
    pub fn new(config: SealingConfig, retries: RetryConfig, timeout_secs: u64) -> SealResult<Self> {
        if !config.enabled {
            return Err(SealError::Disabled);
        }
        let base: Url = config
            .host
            .parse()
            .map_err(|e| SealError::Transport(format!("invalid host '{}': {}", config.host, e)))?;

        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(timeout_secs))
            .build()
            .map_err(|e| SealError::Transport(e.to_string()))?;

        tracing::info!(host = %base, schema_etid = config.schema_etid, "Walacor client initialized");

        Ok(Self {
            http,
            base,
            config,
            retries,
            timeout_secs,
            token: RwLock::new(None),
        })
    }

    fn url(&self, path: &str) -> SealResult<Url> {
        self.base
            .join(path)
            .map_err(|e| SealError::Transport(format!("invalid path '{path}': {e}")))
    }

    fn map_transport(&self, err: reqwest::Error) -> SealError {
        if err.is_timeout() {
            SealError::Timeout(self.timeout_secs)
        } else {
            SealError::Transport(err.to_string())
        }
    }

    async fn login(&self) -> SealResult<String> {
        let response = self
            .http
            .post(self.url(LOGIN_PATH)?)
            .json(&json!({
                "userName": self.config.username,
                "password": self.config.password,
            }))
            .send()
            .await
            .map_err(|e| self.map_transport(e))?;

        let status = response.status();
        if !status.is_success() {
            return Err(SealError::Auth(format!("login returned {}", status.as_u16())));
        }

        let body: Value = response
            .json()
            .await
            .map_err(|e| SealError::Malformed(e.to_string()))?;
        let raw = body
            .get("api_token")
            .or_else(|| body.get("token"))
            .and_then(Value::as_str)
            .ok_or_else(|| SealError::Malformed("login response has no token".to_string()))?;
        let token = raw.strip_prefix("Bearer ").unwrap_or(raw).to_string();

        *self.token.write().await = Some(token.clone());
        tracing::debug!("Walacor login succeeded");
        Ok(token)
    }

    async fn bearer(&self) -> SealResult<String> {
        if let Some(token) = self.token.read().await.clone() {
            return Ok(token);
        }
        self.login().await
    }

    /// One authenticated call; a 401 triggers a single fresh login.
    async fn call(&self, method: Method, path: &str, body: Option<&Value>) -> SealResult<Value> {
        let mut relogged = false;
        loop {
            let token = self.bearer().await?;
            let mut request = self
                .http
                .request(method.clone(), self.url(path)?)
                .bearer_auth(&token)
                .header("ETId", self.config.schema_etid.to_string());
            if let Some(body) = body {
                request = request.json(body);
            }

            let response = request.send().await.map_err(|e| self.map_transport(e))?;
            let status = response.status();

            if status == StatusCode::UNAUTHORIZED {
                *self.token.write().await = None;
                if relogged {
                    return Err(SealError::Auth("token refused after fresh login".to_string()));
                }
                relogged = true;
                continue;
            }

            let text = response.text().await.map_err(|e| self.map_transport(e))?;
            if !status.is_success() {
                return Err(SealError::Rejected {
                    status: status.as_u16(),
                    body: text,
                });
            }
            if text.trim().is_empty() {
                return Ok(Value::Null);
            }
            return serde_json::from_str(&text).map_err(|e| SealError::Malformed(e.to_string()));
        }
    }

    async fn submit_once(&self, request: &SealRequest) -> SealResult<SealReceipt> {
        let body = json!({
            "Data": [{
                "hash": request.payload_sha256,
                "artifact_id": request.artifact_id.to_string(),
                "loan_id": request.loan_id,
                "kind": request.kind,
                "sealed_at": request.submitted_at,
            }]
        });
        let response = self.call(Method::POST, SUBMIT_PATH, Some(&body)).await?;
        parse_submit_response(&response, request.submitted_at)
    }
}

/// Read `{"success": true, "data": {"EId": ..., "UID": ...}}`.
fn parse_submit_response(response: &Value, sealed_at: i64) -> SealResult<SealReceipt> {
    if response.get("success").and_then(Value::as_bool) == Some(false) {
        return Err(SealError::Rejected {
            status: 200,
            body: response.to_string(),
        });
    }
    let data = response.get("data").unwrap_or(response);

    let etid = data
        .get("EId")
        .and_then(scalar_to_string)
        .ok_or_else(|| SealError::Malformed("submit response has no EId".to_string()))?;

    let tx_id = data.get("UID").and_then(|uid| match uid {
        Value::Array(items) => items.first().and_then(scalar_to_string),
        other => scalar_to_string(other),
    });

    Ok(SealReceipt {
        etid,
        tx_id,
        sealed_at,
    })
}

/// Read a query response; `data` may be a single record or a list.
fn parse_query_response(etid: &str, response: &Value) -> Option<SealedRecord> {
    let data = response.get("data").unwrap_or(response);
    let record = match data {
        Value::Array(items) => items.first()?,
        Value::Object(_) => data,
        _ => return None,
    };

    let hash = record
        .get("hash")
        .or_else(|| record.get("payload_sha256"))
        .and_then(Value::as_str)?;

    Some(SealedRecord {
        etid: etid.to_string(),
        payload_sha256: hash.to_ascii_lowercase(),
        artifact_id: record
            .get("artifact_id")
            .and_then(Value::as_str)
            .map(str::to_string),
        sealed_at: record.get("sealed_at").and_then(Value::as_i64),
    })
}

fn scalar_to_string(value: &Value) -> Option<String> {
    match value {
        Value::String(s) if !s.is_empty() => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        _ => None,
    }
}

#[async_trait]
impl Sealer for WalacorClient {
    async fn seal(&self, request: &SealRequest) -> SealResult<SealReceipt> {
        retry_with_backoff(&self.retries, "walacor_seal", |_| self.submit_once(request)).await
    }

    async fn fetch(&self, etid: &str) -> SealResult<Option<SealedRecord>> {
        let body = json!({ "EId": etid });
        let result = retry_with_backoff(&self.retries, "walacor_fetch", |_| {
            self.call(Method::POST, QUERY_PATH, Some(&body))
        })
        .await;

        match result {
            Ok(response) => Ok(parse_query_response(etid, &response)),
            Err(SealError::Rejected { status: 404, .. }) => Ok(None),
            Err(e) => Err(e),
        }
    }

    async fn health(&self) -> bool {
        match self.url(HEALTH_PATH) {
            Ok(url) => match self.http.get(url).send().await {
                Ok(response) => response.status().is_success(),
                Err(e) => {
                    tracing::warn!(error = %e, "Walacor health probe failed");
                    false
                }
            },
            Err(_) => false,
        }
    }

    fn mode(&self) -> SealMode {
        SealMode::Walacor
    }
}

impl std::fmt::Debug for WalacorClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WalacorClient")
            .field("host", &self.base.as_str())
            .field("schema_etid", &self.config.schema_etid)
            .field("timeout_secs", &self.timeout_secs)
            .finish()
    }
}
