use std::collections::BTreeMap;

use anyhow::{Context, Result};
use async_trait::async_trait;
use rusqlite::{params, Row};

use crate::{
    db::{connection::Database, helpers::parse_datetime},
    dispatch::{DeliveryLogEntry, DeliveryLogSink},
};

fn row_to_entry(row: &Row) -> Result<DeliveryLogEntry> {
    let data_json: String = row.get("data_json")?;
    let created_at: String = row.get("created_at")?;
    let data: BTreeMap<String, String> =
        serde_json::from_str(&data_json).context("failed to parse data_json")?;

    Ok(DeliveryLogEntry {
        token_preview: row.get("token_preview")?,
        title: row.get("title")?,
        body: row.get("body")?,
        kind: row.get("kind")?,
        data,
        success: row.get::<_, i64>("success")? != 0,
        message_id: row.get("message_id")?,
        error_code: row.get("error_code")?,
        created_at: parse_datetime(&created_at, "created_at")?,
    })
}

impl Database {
    pub async fn insert_delivery_log(&self, entry: DeliveryLogEntry) -> Result<i64> {
        self.execute(move |conn| {
            let data_json = serde_json::to_string(&entry.data)?;
            conn.execute(
                "INSERT INTO notification_logs
                     (token_preview, title, body, kind, data_json, success, message_id, error_code, created_at)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)",
                params![
                    entry.token_preview,
                    entry.title,
                    entry.body,
                    entry.kind,
                    data_json,
                    entry.success as i64,
                    entry.message_id,
                    entry.error_code,
                    entry.created_at.to_rfc3339(),
                ],
            )
            .context("failed to insert notification log")?;
            Ok(conn.last_insert_rowid())
        })
        .await
    }

    /// Newest first.
    pub async fn recent_delivery_logs(&self, limit: usize) -> Result<Vec<DeliveryLogEntry>> {
        let limit = i64::try_from(limit).unwrap_or(i64::MAX);
        self.execute(move |conn| {
            let mut stmt = conn.prepare(
                "SELECT token_preview, title, body, kind, data_json, success, message_id, error_code, created_at
                 FROM notification_logs
                 ORDER BY id DESC
                 LIMIT ?1",
            )?;

            let mut rows = stmt.query(params![limit])?;
            let mut entries = Vec::new();
            while let Some(row) = rows.next()? {
                entries.push(row_to_entry(row)?);
            }

            Ok(entries)
        })
        .await
    }
}

#[async_trait]
impl DeliveryLogSink for Database {
    async fn append(&self, entry: DeliveryLogEntry) -> Result<()> {
        self.insert_delivery_log(entry).await.map(|_| ())
    }
}
