use anyhow::{Context, Result};
use async_trait::async_trait;
use chrono::Utc;
use rusqlite::{params, OptionalExtension};

use crate::{
    db::connection::Database,
    dispatch::{TokenRegistry, TokenResolver},
};

impl Database {
    pub async fn get_device_token(&self, recipient_id: &str) -> Result<Option<String>> {
        let recipient_id = recipient_id.to_string();
        self.execute(move |conn| {
            let token = conn
                .query_row(
                    "SELECT token FROM device_tokens WHERE recipient_id = ?1",
                    params![recipient_id],
                    |row| row.get::<_, String>(0),
                )
                .optional()
                .context("failed to look up device token")?;
            Ok(token)
        })
        .await
    }

    /// Inserts or replaces the token on file for a recipient.
    pub async fn upsert_device_token(
        &self,
        recipient_id: &str,
        token: &str,
        platform: Option<&str>,
    ) -> Result<()> {
        let recipient_id = recipient_id.to_string();
        let token = token.to_string();
        let platform = platform.map(str::to_string);
        self.execute(move |conn| {
            conn.execute(
                "INSERT INTO device_tokens (recipient_id, token, platform, updated_at)
                 VALUES (?1, ?2, ?3, ?4)
                 ON CONFLICT(recipient_id) DO UPDATE SET
                     token = excluded.token,
                     platform = excluded.platform,
                     updated_at = excluded.updated_at",
                params![recipient_id, token, platform, Utc::now().to_rfc3339()],
            )
            .context("failed to save device token")?;
            Ok(())
        })
        .await
    }

    pub async fn delete_device_token(&self, recipient_id: &str) -> Result<bool> {
        let recipient_id = recipient_id.to_string();
        self.execute(move |conn| {
            let removed = conn
                .execute(
                    "DELETE FROM device_tokens WHERE recipient_id = ?1",
                    params![recipient_id],
                )
                .context("failed to delete device token")?;
            Ok(removed > 0)
        })
        .await
    }
}

#[async_trait]
impl TokenResolver for Database {
    async fn lookup(&self, recipient_id: &str) -> Result<Option<String>> {
        self.get_device_token(recipient_id).await
    }
}

#[async_trait]
impl TokenRegistry for Database {
    async fn register(&self, recipient_id: &str, token: &str, platform: Option<&str>) -> Result<()> {
        self.upsert_device_token(recipient_id, token, platform).await
    }
}

#[cfg(test)]
mod tests {
    use tempfile::tempdir;

    use super::*;

    #[tokio::test]
    async fn register_then_lookup_latest_token() {
        let dir = tempdir().unwrap();
        let db = Database::open(dir.path().join("relay.sqlite3")).unwrap();

        assert_eq!(db.lookup("u1").await.unwrap(), None);

        db.register("u1", "token-a", Some("android")).await.unwrap();
        db.register("u1", "token-b", None).await.unwrap();
        assert_eq!(db.lookup("u1").await.unwrap().as_deref(), Some("token-b"));

        assert!(db.delete_device_token("u1").await.unwrap());
        assert!(!db.delete_device_token("u1").await.unwrap());
        assert_eq!(db.lookup("u1").await.unwrap(), None);
    }
}
