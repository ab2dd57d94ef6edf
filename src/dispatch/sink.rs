use std::collections::BTreeMap;

use anyhow::Result;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// One delivery attempt, with the token shortened for display.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct DeliveryLogEntry {
    pub token_preview: String,
    pub title: String,
    pub body: String,
    pub kind: String,
    pub data: BTreeMap<String, String>,
    pub success: bool,
    pub message_id: Option<String>,
    pub error_code: Option<String>,
    pub created_at: DateTime<Utc>,
}

/// Write-only, best-effort record of dispatch outcomes.
#[async_trait]
pub trait DeliveryLogSink: Send + Sync {
    async fn append(&self, entry: DeliveryLogEntry) -> Result<()>;
}
