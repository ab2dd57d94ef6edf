use std::collections::HashMap;

use anyhow::Result;
use async_trait::async_trait;
use tokio::sync::RwLock;

/// Maps a recipient id to the delivery token on file.
#[async_trait]
pub trait TokenResolver: Send + Sync {
    async fn lookup(&self, recipient_id: &str) -> Result<Option<String>>;
}

/// A resolver that can also record tokens reported by devices.
#[async_trait]
pub trait TokenRegistry: TokenResolver {
    async fn register(&self, recipient_id: &str, token: &str, platform: Option<&str>) -> Result<()>;
}

/// In-memory token store (intended for tests and ephemeral runs).
#[derive(Default)]
pub struct MemoryTokenStore {
    tokens: RwLock<HashMap<String, String>>,
}

impl MemoryTokenStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_tokens<I, K, V>(entries: I) -> Self
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<String>,
    {
        Self {
            tokens: RwLock::new(
                entries
                    .into_iter()
                    .map(|(id, token)| (id.into(), token.into()))
                    .collect(),
            ),
        }
    }
}

#[async_trait]
impl TokenResolver for MemoryTokenStore {
    async fn lookup(&self, recipient_id: &str) -> Result<Option<String>> {
        Ok(self.tokens.read().await.get(recipient_id).cloned())
    }
}

#[async_trait]
impl TokenRegistry for MemoryTokenStore {
    async fn register(&self, recipient_id: &str, token: &str, _platform: Option<&str>) -> Result<()> {
        self.tokens
            .write()
            .await
            .insert(recipient_id.to_string(), token.to_string());
        Ok(())
    }
}
