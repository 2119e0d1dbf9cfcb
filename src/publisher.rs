// ABOUTME: HTTP publisher that creates users, categories and listings on Kreezalid
// ABOUTME: Returns a typed outcome so callers only mark rows when a remote id came back

use anyhow::{Context, Result};
use async_trait::async_trait;
use base64::Engine;
use reqwest::{Certificate, Client, StatusCode};
use serde_json::Value;
use std::time::Duration;
use thiserror::Error;
use url::Url;

use crate::config::{ApiConfig, TlsPolicy};
use crate::entity::EntityKind;
use crate::models::RemoteId;
use crate::utils::truncate_for_log;

const REQUEST_TIMEOUT: Duration = Duration::from_secs(30);
const MAX_LOGGED_BODY: usize = 500;

/// Why a create request did not yield a remote id.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum PublishError {
    #[error("failed to encode payload: {0}")]
    Encode(String),
    #[error("request failed: {0}")]
    Transport(String),
    #[error("API returned {status}: {body}")]
    Status { status: u16, body: String },
    #[error("response is not valid JSON: {0}")]
    Decode(String),
    #[error("response has no usable `id` field: {0}")]
    MissingId(String),
}

/// Result of one create request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PublishOutcome {
    Created(RemoteId),
    Failed(PublishError),
}

impl From<std::result::Result<RemoteId, PublishError>> for PublishOutcome {
    fn from(result: std::result::Result<RemoteId, PublishError>) -> Self {
        match result {
            Ok(id) => PublishOutcome::Created(id),
            Err(e) => PublishOutcome::Failed(e),
        }
    }
}

/// Creates one remote object per call.
#[async_trait]
pub trait Publisher: Send + Sync {
    async fn publish(&self, kind: EntityKind, payload: &Value) -> PublishOutcome;
}

/// `Authorization` header value for HTTP Basic auth.
pub fn basic_auth_header(username: &str, password: &str) -> String {
    let encoded = base64::engine::general_purpose::STANDARD
        .encode(format!("{}:{}", username, password).as_bytes());
    format!("Basic {}", encoded)
}

/// Pull the remote identifier out of a create response.
///
/// Accepts `{"id": 555}` and `{"id": "555"}`. Zero is not an identifier.
pub fn extract_remote_id(body: &Value) -> std::result::Result<RemoteId, PublishError> {
    match body.get("id") {
        Some(Value::Number(n)) => n
            .as_u64()
            .filter(|id| *id > 0)
            .map(RemoteId)
            .ok_or_else(|| PublishError::MissingId(format!("id {} is not a positive integer", n))),
        Some(Value::String(s)) => s
            .trim()
            .parse::<u64>()
            .ok()
            .filter(|id| *id > 0)
            .map(RemoteId)
            .ok_or_else(|| PublishError::MissingId(format!("id '{}' is not a positive integer", s))),
        Some(other) => Err(PublishError::MissingId(format!("id has type {}", json_type(other)))),
        None => Err(PublishError::MissingId(truncate_for_log(
            &body.to_string(),
            MAX_LOGGED_BODY,
        ))),
    }
}

fn json_type(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "bool",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}

/// Kreezalid REST client.
pub struct KreezalidClient {
    client: Client,
    base_url: Url,
    username: String,
    password: String,
}

impl KreezalidClient {
    pub fn new(api: &ApiConfig) -> Result<Self> {
        let mut builder = Client::builder().timeout(REQUEST_TIMEOUT);

        match &api.tls {
            TlsPolicy::Verify => {}
            TlsPolicy::CustomCa(path) => {
                let pem = std::fs::read(path)
                    .with_context(|| format!("Failed to read CA certificate {:?}", path))?;
                let cert = Certificate::from_pem(&pem)
                    .with_context(|| format!("Invalid PEM certificate in {:?}", path))?;
                builder = builder.add_root_certificate(cert);
            }
            TlsPolicy::AcceptInvalid => {
                tracing::warn!(
                    "TLS certificate verification is DISABLED for {}. Use --ca-cert instead outside of testing",
                    api.base_url
                );
                builder = builder.danger_accept_invalid_certs(true);
            }
        }

        let client = builder.build().context("Failed to create HTTP client")?;

        Ok(Self {
            client,
            base_url: api.base_url.clone(),
            username: api.username.clone(),
            password: api.password.clone(),
        })
    }

    /// Full URL of the create endpoint for `kind`.
    pub fn endpoint_url(&self, kind: EntityKind) -> Result<Url> {
        self.base_url
            .join(kind.endpoint())
            .with_context(|| format!("Failed to build {} endpoint URL", kind))
    }

    async fn create(&self, kind: EntityKind, payload: &Value) -> std::result::Result<RemoteId, PublishError> {
        let url = self
            .endpoint_url(kind)
            .map_err(|e| PublishError::Transport(format!("{:#}", e)))?;

        tracing::debug!("POST {}", url);

        let response = self
            .client
            .post(url)
            .header(
                reqwest::header::AUTHORIZATION,
                basic_auth_header(&self.username, &self.password),
            )
            .json(payload)
            .send()
            .await
            .map_err(|e| PublishError::Transport(e.to_string()))?;

        let status = response.status();
        let body = response
            .text()
            .await
            .map_err(|e| PublishError::Transport(e.to_string()))?;

        if !status.is_success() {
            if status == StatusCode::UNAUTHORIZED || status == StatusCode::FORBIDDEN {
                tracing::error!(
                    "Kreezalid rejected the credentials ({}). Check AUTH_USERNAME / AUTH_PASSWORD",
                    status
                );
            }
            return Err(PublishError::Status {
                status: status.as_u16(),
                body: truncate_for_log(&body, MAX_LOGGED_BODY),
            });
        }

        let parsed: Value = serde_json::from_str(&body).map_err(|e| {
            PublishError::Decode(format!("{} (body: {})", e, truncate_for_log(&body, MAX_LOGGED_BODY)))
        })?;
        extract_remote_id(&parsed)
    }
}

#[async_trait]
impl Publisher for KreezalidClient {
    async fn publish(&self, kind: EntityKind, payload: &Value) -> PublishOutcome {
        self.create(kind, payload).await.into()
    }
}
