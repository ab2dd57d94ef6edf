use async_trait::async_trait;
use log::info;
use thiserror::Error;
use uuid::Uuid;

use crate::utils::logging::token_preview;

use super::payload::DeliveryPayload;

#[derive(Debug, Clone, Error, PartialEq, Eq)]
#[error("{code}: {message}")]
pub struct TransportError {
    pub code: String,
    pub message: String,
}

impl TransportError {
    pub fn new(code: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            code: code.into(),
            message: message.into(),
        }
    }
}

/// Push delivery API. Returns the provider's message id.
#[async_trait]
pub trait MessagingTransport: Send + Sync {
    async fn send(&self, payload: &DeliveryPayload) -> Result<String, TransportError>;
}

/// Accepts everything and only logs; for local runs without credentials.
#[derive(Debug, Default, Clone)]
pub struct DryRunTransport;

#[async_trait]
impl MessagingTransport for DryRunTransport {
    async fn send(&self, payload: &DeliveryPayload) -> Result<String, TransportError> {
        let message_id = format!("projects/dry-run/messages/{}", Uuid::new_v4());
        info!(
            "dry-run delivery to {}: {} ({} data fields) -> {}",
            token_preview(&payload.token),
            payload.notification.title,
            payload.data.len(),
            message_id
        );
        Ok(message_id)
    }
}
