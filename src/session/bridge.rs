//! HTTP client for the extension bridge service.
//!
//! The bridge exposes a small JSON API: `GET /api/v1/sessions/{user}` reports
//! session health, `POST /api/v1/sessions/{user}/actions` performs a send
//! inside the user's browser session. Send failures carry a typed
//! `error_code` field which maps directly onto [`SessionSendError`].

use std::time::Duration;

use anyhow::Context;
use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::config::BridgeConfig;
use crate::errors::{SessionError, SessionSendError};

use super::{DispatchOutcome, SessionClient, SessionHealth};

/// Session client backed by the extension bridge REST API
pub struct BridgeSessionClient {
    client: Client,
    base_url: String,
}

#[derive(Debug, Serialize)]
struct ActionRequest<'a> {
    action: &'a str,
    profile_url: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    note: Option<&'a str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    message: Option<&'a str>,
}

#[derive(Debug, Deserialize)]
struct ActionResponse {
    status: String,
    #[serde(default)]
    provider_ref: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ErrorBody {
    #[serde(default)]
    error_code: Option<String>,
    #[serde(default)]
    message: Option<String>,
}

#[derive(Debug, Deserialize)]
struct HealthBody {
    #[serde(default)]
    connected: bool,
    #[serde(default)]
    has_cookies: bool,
    #[serde(default)]
    valid: Option<bool>,
}

impl BridgeSessionClient {
    /// Create a bridge client from configuration
    pub fn new(config: &BridgeConfig) -> anyhow::Result<Self> {
        let client = Client::builder()
            .timeout(Duration::from_secs(config.request_timeout_secs))
            .user_agent("Outreach-Relay/1.0")
            .build()
            .context("building session bridge HTTP client")?;

        Ok(Self {
            client,
            base_url: config.base_url.trim_end_matches('/').to_string(),
        })
    }

    fn session_url(&self, user_id: &str) -> String {
        format!("{}/api/v1/sessions/{}", self.base_url, user_id)
    }

    async fn dispatch(
        &self,
        user_id: &str,
        request: &ActionRequest<'_>,
    ) -> Result<DispatchOutcome, SessionSendError> {
        let url = format!("{}/actions", self.session_url(user_id));
        debug!("Dispatching '{}' action for user {}", request.action, user_id);

        let response = self
            .client
            .post(&url)
            .json(request)
            .send()
            .await
            .map_err(|e| SessionSendError::api(format!("Bridge request failed: {e}")))?;

        let status = response.status();
        let body = response
            .text()
            .await
            .map_err(|e| SessionSendError::api(format!("Bridge response unreadable: {e}")))?;

        if !status.is_success() {
            return Err(classify_failure(status.as_u16(), &body));
        }

        decode_outcome(&body)
    }
}

/// Map a non-success bridge response onto a classified send failure.
///
/// The `error_code` field wins when present; the HTTP status is the fallback
/// for bridges that only speak status codes.
fn classify_failure(status: u16, body: &str) -> SessionSendError {
    let parsed: Option<ErrorBody> = serde_json::from_str(body).ok();
    let message = parsed
        .as_ref()
        .and_then(|e| e.message.clone())
        .unwrap_or_else(|| {
            if body.trim().is_empty() {
                format!("HTTP {status}")
            } else {
                body.trim().to_string()
            }
        });

    match parsed.and_then(|e| e.error_code).as_deref() {
        Some("RATE_LIMITED") => SessionSendError::rate_limited(message),
        Some("SESSION_INVALID") => SessionSendError::session_invalid(message),
        Some(_) | None => match status {
            429 => SessionSendError::rate_limited(message),
            401 | 403 => SessionSendError::session_invalid(message),
            _ => SessionSendError::api_status(status, message),
        },
    }
}

/// Decode a successful dispatch response.
///
/// Only "delivered" counts as confirmed; every other status stays provisional
/// so reconciliation settles it instead of a retry double-sending.
fn decode_outcome(body: &str) -> Result<DispatchOutcome, SessionSendError> {
    let action: ActionResponse = serde_json::from_str(body)
        .map_err(|e| SessionSendError::api(format!("Unexpected bridge response: {e}")))?;

    if action.status == "delivered" {
        Ok(DispatchOutcome::Delivered {
            provider_ref: action.provider_ref,
        })
    } else {
        Ok(DispatchOutcome::Accepted)
    }
}

#[async_trait]
impl SessionClient for BridgeSessionClient {
    async fn health(&self, user_id: &str) -> Result<SessionHealth, SessionError> {
        let url = self.session_url(user_id);

        let response = self.client.get(&url).send().await.map_err(|e| {
            SessionError::Unreachable {
                message: e.to_string(),
            }
        })?;

        let status = response.status();
        if status.as_u16() == 404 {
            // Bridge has no session registered for this user
            return Ok(SessionHealth::disconnected());
        }

        let body = response.text().await.map_err(|e| SessionError::InvalidResponse {
            message: e.to_string(),
        })?;

        if !status.is_success() {
            return Err(SessionError::BadResponse {
                status: status.as_u16(),
                message: body.trim().to_string(),
            });
        }

        let health: HealthBody =
            serde_json::from_str(&body).map_err(|e| SessionError::InvalidResponse {
                message: e.to_string(),
            })?;

        Ok(SessionHealth {
            connected: health.connected,
            has_cookies: health.has_cookies,
            valid: health.valid,
        })
    }

    async fn send_connection_request(
        &self,
        user_id: &str,
        profile_url: &str,
        note: Option<&str>,
    ) -> Result<DispatchOutcome, SessionSendError> {
        let request = ActionRequest {
            action: "connection_request",
            profile_url,
            note,
            message: None,
        };
        self.dispatch(user_id, &request).await
    }

    async fn send_direct_message(
        &self,
        user_id: &str,
        profile_url: &str,
        message: &str,
    ) -> Result<DispatchOutcome, SessionSendError> {
        let request = ActionRequest {
            action: "direct_message",
            profile_url,
            note: None,
            message: Some(message),
        };
        self.dispatch(user_id, &request).await
    }
}
