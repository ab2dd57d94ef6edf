use std::time::Duration;

use anyhow::{anyhow, Context, Result};
use async_trait::async_trait;
use log::{debug, warn};
use serde::Deserialize;
use serde_json::json;

use crate::{settings::TransportSettings, utils::logging::token_preview};

use super::{
    payload::DeliveryPayload,
    transport::{MessagingTransport, TransportError},
};

pub fn fcm_endpoint(project_id: &str) -> String {
    format!("https://fcm.googleapis.com/v1/projects/{project_id}/messages:send")
}

#[derive(Debug, Deserialize)]
struct SendResponse {
    name: String,
}

#[derive(Debug, Deserialize)]
struct ErrorEnvelope {
    error: ErrorBody,
}

#[derive(Debug, Deserialize)]
struct ErrorBody {
    #[serde(default)]
    message: String,
    #[serde(default)]
    status: Option<String>,
    #[serde(default)]
    details: Vec<ErrorDetail>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ErrorDetail {
    #[serde(default)]
    error_code: Option<String>,
}

/// Firebase Cloud Messaging HTTP v1 client.
pub struct FcmTransport {
    client: reqwest::Client,
    endpoint: String,
    access_token: String,
}

impl FcmTransport {
    pub fn new(endpoint: String, access_token: String, timeout: Duration) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .context("failed to build FCM HTTP client")?;
        Ok(Self {
            client,
            endpoint,
            access_token,
        })
    }

    pub fn from_settings(settings: &TransportSettings, access_token: Option<String>) -> Result<Self> {
        let endpoint = match (&settings.endpoint, &settings.project_id) {
            (Some(endpoint), _) => endpoint.clone(),
            (None, Some(project_id)) => fcm_endpoint(project_id),
            (None, None) => return Err(anyhow!("FCM transport needs a project id or endpoint")),
        };
        let access_token =
            access_token.ok_or_else(|| anyhow!("FCM transport needs FCM_ACCESS_TOKEN"))?;
        Self::new(endpoint, access_token, settings.timeout())
    }
}

#[async_trait]
impl MessagingTransport for FcmTransport {
    async fn send(&self, payload: &DeliveryPayload) -> Result<String, TransportError> {
        debug!("FCM send to {}", token_preview(&payload.token));
        let response = self
            .client
            .post(&self.endpoint)
            .bearer_auth(&self.access_token)
            .json(&json!({ "message": payload }))
            .send()
            .await
            .map_err(|err| {
                let code = if err.is_timeout() {
                    "messaging/timeout"
                } else {
                    "messaging/network-error"
                };
                TransportError::new(code, err.to_string())
            })?;

        let status = response.status();
        let body = response
            .text()
            .await
            .map_err(|err| TransportError::new("messaging/network-error", err.to_string()))?;

        if status.is_success() {
            let parsed: SendResponse = serde_json::from_str(&body).map_err(|err| {
                TransportError::new("messaging/invalid-response", err.to_string())
            })?;
            return Ok(parsed.name);
        }

        let err = error_from_body(status.as_u16(), &body);
        warn!("FCM rejected message ({}): {}", err.code, err.message);
        Err(err)
    }
}

/// Prefers the FCM-specific `errorCode` detail, then the RPC status, then the HTTP status.
fn error_from_body(status: u16, body: &str) -> TransportError {
    match serde_json::from_str::<ErrorEnvelope>(body) {
        Ok(envelope) => {
            let code = envelope
                .error
                .details
                .iter()
                .find_map(|detail| detail.error_code.clone())
                .or(envelope.error.status)
                .unwrap_or_else(|| format!("http-{status}"));
            TransportError::new(code, envelope.error.message)
        }
        Err(_) => TransportError::new(format!("http-{status}"), body.trim().to_string()),
    }
}
