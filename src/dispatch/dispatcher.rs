use std::sync::Arc;

use chrono::{DateTime, Utc};
use log::{error, info, warn};
use serde::Serialize;
use tokio::{sync::Semaphore, task::JoinSet};

use crate::{
    models::{DispatchResult, NotificationRequest, Recipient},
    utils::logging::token_preview,
};

use super::{
    error::{DispatchError, INTERNAL_ERROR},
    payload::{build_payload, DeliveryPayload},
    resolver::TokenResolver,
    sink::{DeliveryLogEntry, DeliveryLogSink},
    transport::{MessagingTransport, TransportError},
};

#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct DispatchReceipt {
    pub message_id: String,
    pub sent_at: DateTime<Utc>,
}

/// Resolves tokens, builds payloads and hands them to the transport. Every
/// failure comes back as a value; nothing escapes as a panic or fault.
#[derive(Clone)]
pub struct NotificationDispatcher {
    resolver: Arc<dyn TokenResolver>,
    transport: Arc<dyn MessagingTransport>,
    log_sink: Option<Arc<dyn DeliveryLogSink>>,
    batch_concurrency: usize,
}

impl NotificationDispatcher {
    pub fn new(resolver: Arc<dyn TokenResolver>, transport: Arc<dyn MessagingTransport>) -> Self {
        Self {
            resolver,
            transport,
            log_sink: None,
            batch_concurrency: 1,
        }
    }

    pub fn with_log_sink(mut self, sink: Arc<dyn DeliveryLogSink>) -> Self {
        self.log_sink = Some(sink);
        self
    }

    pub fn with_batch_concurrency(mut self, concurrency: usize) -> Self {
        self.batch_concurrency = concurrency.max(1);
        self
    }

    pub async fn dispatch(&self, request: &NotificationRequest) -> DispatchResult {
        match self.try_dispatch(request).await {
            Ok(receipt) => DispatchResult::delivered(receipt.message_id),
            Err(err) => err.into(),
        }
    }

    pub async fn try_dispatch(
        &self,
        request: &NotificationRequest,
    ) -> Result<DispatchReceipt, DispatchError> {
        validate(request)?;
        let token = self.resolve_token(&request.recipient).await?;

        let sent_at = Utc::now();
        let payload = build_payload(request, &token, sent_at);
        info!(
            "sending {} notification to {}",
            request.kind.as_str(),
            token_preview(&token)
        );

        let outcome = self.transport.send(&payload).await;
        self.record(request, &payload, &outcome, sent_at).await;

        match outcome {
            Ok(message_id) => {
                info!("notification delivered: {message_id}");
                Ok(DispatchReceipt {
                    message_id,
                    sent_at,
                })
            }
            Err(err) => {
                warn!("notification to {} failed: {err}", token_preview(&token));
                Err(err.into())
            }
        }
    }

    /// Results line up with `requests` by index; one item's failure never
    /// stops the rest.
    pub async fn dispatch_batch(&self, requests: &[NotificationRequest]) -> Vec<DispatchResult> {
        if self.batch_concurrency <= 1 || requests.len() <= 1 {
            let mut results = Vec::with_capacity(requests.len());
            for request in requests {
                results.push(self.dispatch(request).await);
            }
            return results;
        }

        let permits = Arc::new(Semaphore::new(self.batch_concurrency));
        let mut tasks = JoinSet::new();
        for (index, request) in requests.iter().cloned().enumerate() {
            let dispatcher = self.clone();
            let permits = Arc::clone(&permits);
            tasks.spawn(async move {
                let _permit = permits.acquire_owned().await.ok();
                (index, dispatcher.dispatch(&request).await)
            });
        }

        let mut slots: Vec<Option<DispatchResult>> = vec![None; requests.len()];
        while let Some(joined) = tasks.join_next().await {
            match joined {
                Ok((index, result)) => slots[index] = Some(result),
                Err(err) => error!("batch dispatch task failed: {err}"),
            }
        }

        slots
            .into_iter()
            .map(|slot| {
                slot.unwrap_or_else(|| DispatchResult::failed(INTERNAL_ERROR, "dispatch task aborted"))
            })
            .collect()
    }

    async fn resolve_token(&self, recipient: &Recipient) -> Result<String, DispatchError> {
        match recipient {
            Recipient::Token(token) => Ok(token.clone()),
            Recipient::User(recipient_id) => match self.resolver.lookup(recipient_id).await {
                Ok(Some(token)) if !token.trim().is_empty() => Ok(token),
                Ok(_) => {
                    warn!("no delivery token on file for {recipient_id}");
                    Err(DispatchError::RecipientNotFound {
                        recipient_id: recipient_id.clone(),
                    })
                }
                Err(err) => {
                    error!("token lookup for {recipient_id} failed: {err:#}");
                    Err(DispatchError::Lookup(format!("{err:#}")))
                }
            },
        }
    }

    async fn record(
        &self,
        request: &NotificationRequest,
        payload: &DeliveryPayload,
        outcome: &Result<String, TransportError>,
        sent_at: DateTime<Utc>,
    ) {
        let Some(sink) = &self.log_sink else {
            return;
        };
        let entry = DeliveryLogEntry {
            token_preview: token_preview(&payload.token),
            title: payload.notification.title.clone(),
            body: payload.notification.body.clone(),
            kind: request.kind.as_str().to_string(),
            data: payload.data.clone(),
            success: outcome.is_ok(),
            message_id: outcome.as_ref().ok().cloned(),
            error_code: outcome.as_ref().err().map(|err| err.code.clone()),
            created_at: sent_at,
        };
        if let Err(err) = sink.append(entry).await {
            error!("failed to save delivery log: {err:#}");
        }
    }
}

fn validate(request: &NotificationRequest) -> Result<(), DispatchError> {
    if request.recipient.is_empty() {
        return Err(DispatchError::missing_field("recipient"));
    }
    if request.title.trim().is_empty() {
        return Err(DispatchError::missing_field("title"));
    }
    if request.body.trim().is_empty() {
        return Err(DispatchError::missing_field("body"));
    }
    Ok(())
}
