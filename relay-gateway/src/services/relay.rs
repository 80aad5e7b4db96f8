//! Relay Orchestrator: one client chat request becomes two upstream calls.
//!
//! Admission, body decoding and normalization, target selection, `POST /session`,
//! `POST /session/{id}/message`, then best-effort reply extraction with a
//! single `GET /session/{id}` fallback. Nothing is retried. Dropping the
//! returned future aborts whichever upstream call is in flight.

use reqwest::Method;
use serde::Serialize;
use serde_json::{json, Value};
use service_core::error::{AppError, UpstreamBody};
use service_core::observability::TracedClientExt;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;

use super::payload::{extract_reply, first_string, ChatRequest, PayloadError};
use super::registry::{RegistryError, RelaySettings, UpstreamRegistry};
use super::token_authority::{TokenAuthority, TokenError};
use crate::models::UpstreamTarget;

#[derive(Debug, Error)]
pub enum RelayError {
    #[error(transparent)]
    Admission(#[from] TokenError),

    #[error("invalid json: {0}")]
    InvalidJson(String),

    #[error(transparent)]
    InvalidPayload(#[from] PayloadError),

    #[error("no upstream")]
    NoUpstream,

    #[error("upstream request failed: {0}")]
    Transport(String),

    #[error("upstream returned status {status}")]
    UpstreamStatus { status: u16, body: UpstreamBody },

    #[error("invalid session response")]
    InvalidSession,

    #[error("upstream decode error: {0}")]
    Decode(String),

    #[error(transparent)]
    Registry(#[from] RegistryError),
}

impl RelayError {
    /// Label for `relay_requests_total`.
    pub fn outcome(&self) -> &'static str {
        match self {
            RelayError::Admission(_) => "unauthorized",
            RelayError::InvalidJson(_) | RelayError::InvalidPayload(_) => "bad_request",
            RelayError::NoUpstream => "no_upstream",
            RelayError::Transport(_) => "transport_error",
            RelayError::UpstreamStatus { .. } => "upstream_error",
            RelayError::InvalidSession | RelayError::Decode(_) => "decode_error",
            RelayError::Registry(_) => "internal_error",
        }
    }
}

impl From<RelayError> for AppError {
    fn from(err: RelayError) -> Self {
        match err {
            RelayError::Admission(e) => e.into(),
            RelayError::InvalidJson(_) | RelayError::InvalidPayload(_) => {
                AppError::BadRequest(anyhow::anyhow!(err.to_string()))
            }
            RelayError::UpstreamStatus { status, body } => AppError::Upstream { status, body },
            RelayError::NoUpstream
            | RelayError::Transport(_)
            | RelayError::InvalidSession
            | RelayError::Decode(_) => AppError::BadGateway(err.to_string()),
            RelayError::Registry(e) => e.into(),
        }
    }
}

/// What a successful relay returns to the caller.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RelayResult {
    pub session_id: String,
    /// Raw message response; `null` when the upstream sent no body.
    pub response: Value,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub session: Option<Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
}

#[derive(Debug, Clone)]
pub struct RelayOptions {
    pub timeout: Duration,
    pub default_provider: String,
    pub session_title: String,
}

pub struct RelayOrchestrator {
    client: reqwest::Client,
    tokens: Arc<TokenAuthority>,
    upstreams: Arc<UpstreamRegistry>,
    settings: Arc<RelaySettings>,
    options: RelayOptions,
}

impl RelayOrchestrator {
    pub fn new(
        tokens: Arc<TokenAuthority>,
        upstreams: Arc<UpstreamRegistry>,
        settings: Arc<RelaySettings>,
        options: RelayOptions,
    ) -> Result<Self, anyhow::Error> {
        let client = reqwest::Client::builder()
            .timeout(options.timeout)
            .build()
            .map_err(|e| anyhow::anyhow!("Failed to build upstream HTTP client: {}", e))?;

        Ok(Self {
            client,
            tokens,
            upstreams,
            settings,
            options,
        })
    }

    /// Run one relay over a raw request body and record its outcome.
    ///
    /// Admission happens before the body is decoded.
    pub async fn relay(
        &self,
        body: &[u8],
        caller_auth: Option<&str>,
    ) -> Result<RelayResult, RelayError> {
        let result = self.run(body, caller_auth).await;

        let outcome = match &result {
            Ok(_) => "ok",
            Err(e) => e.outcome(),
        };
        metrics::counter!("relay_requests_total", "outcome" => outcome).increment(1);

        if let Err(e) = &result {
            tracing::warn!(outcome, error = %e, "Relay failed");
        }
        result
    }

    async fn run(&self, body: &[u8], caller_auth: Option<&str>) -> Result<RelayResult, RelayError> {
        let config = self.settings.snapshot()?;

        self.tokens.admit(caller_auth, config.require_auth).await?;

        let payload: Value =
            serde_json::from_slice(body).map_err(|e| RelayError::InvalidJson(e.to_string()))?;
        let request = ChatRequest::from_payload(&payload, &config)?;

        let target = self
            .upstreams
            .get(&config.default_upstream)?
            .filter(|t| t.enabled)
            .ok_or(RelayError::NoUpstream)?;

        // Step A: create the conversation.
        let created = self
            .send(
                &target,
                Method::POST,
                "/session",
                Some(json!({ "title": self.options.session_title })),
                caller_auth,
            )
            .await?;
        let created: Value = serde_json::from_slice(&created).unwrap_or(Value::Null);
        let session_id = first_string(&created, &["id"])
            .ok_or(RelayError::InvalidSession)?
            .to_string();

        tracing::info!(
            session_id = %session_id,
            upstream = %target.id,
            model = %request.model,
            "Upstream session created"
        );

        // Step B: post the message.
        let provider = request
            .provider
            .as_deref()
            .unwrap_or(&self.options.default_provider);
        let body = self
            .send(
                &target,
                Method::POST,
                &format!("/session/{}/message", session_id),
                Some(json!({
                    "providerID": provider,
                    "modelID": request.model,
                    "parts": request.parts,
                })),
                caller_auth,
            )
            .await?;
        let response = decode_optional(&body)?;

        let mut message = response.as_ref().and_then(extract_reply);
        let mut session = None;
        if message.is_none() {
            if let Some(detail) = self.fetch_detail(&target, &session_id, caller_auth).await {
                message = extract_reply(&detail);
                session = Some(detail);
            }
        }

        Ok(RelayResult {
            session_id,
            response: response.unwrap_or(Value::Null),
            session,
            message,
        })
    }

    /// Issue one upstream call and return the body of a 2xx response.
    async fn send(
        &self,
        target: &UpstreamTarget,
        method: Method,
        path: &str,
        body: Option<Value>,
        caller_auth: Option<&str>,
    ) -> Result<Vec<u8>, RelayError> {
        let mut builder = self.client.traced_request(method, &target.url(path));
        if let Some(authorization) = target.outbound_authorization(caller_auth) {
            builder = builder.header(reqwest::header::AUTHORIZATION, authorization);
        }
        if let Some(body) = body {
            builder = builder.json(&body);
        }

        let response = builder
            .send()
            .await
            .map_err(|e| RelayError::Transport(e.to_string()))?;
        let status = response.status();
        let bytes = response
            .bytes()
            .await
            .map_err(|e| RelayError::Transport(e.to_string()))?;

        if !status.is_success() {
            return Err(RelayError::UpstreamStatus {
                status: status.as_u16(),
                body: UpstreamBody::from_bytes(&bytes),
            });
        }
        Ok(bytes.to_vec())
    }

    /// Read-only conversation detail; any failure simply yields `None`.
    async fn fetch_detail(
        &self,
        target: &UpstreamTarget,
        session_id: &str,
        caller_auth: Option<&str>,
    ) -> Option<Value> {
        let path = format!("/session/{}", session_id);
        match self
            .send(target, Method::GET, &path, None, caller_auth)
            .await
        {
            Ok(body) => serde_json::from_slice::<Value>(&body)
                .ok()
                .filter(Value::is_object),
            Err(e) => {
                tracing::debug!(session_id, error = %e, "Session detail unavailable");
                None
            }
        }
    }
}

/// An empty body is "no content yet"; anything else must be JSON.
fn decode_optional(body: &[u8]) -> Result<Option<Value>, RelayError> {
    if body.iter().all(u8::is_ascii_whitespace) {
        return Ok(None);
    }
    serde_json::from_slice(body)
        .map(Some)
        .map_err(|e| RelayError::Decode(e.to_string()))
}
