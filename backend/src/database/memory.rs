use async_trait::async_trait;
use chrono::Utc;
use std::collections::HashMap;
use tokio::sync::RwLock;

use super::models::{FailedPair, IngestionCursor, Token};
use super::repository::{CursorStore, StoreError, TokenStore};

/// Process-local store with the same semantics as the Postgres repository.
/// Records keep insertion order.
#[derive(Default)]
pub struct InMemoryTokenStore {
    tokens: RwLock<Vec<Token>>,
    cursors: RwLock<HashMap<String, IngestionCursor>>,
    failed_pairs: RwLock<HashMap<(String, u64), FailedPair>>,
}

impl InMemoryTokenStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Start from pre-existing records, bypassing every check.
    pub fn with_tokens(tokens: Vec<Token>) -> Self {
        Self {
            tokens: RwLock::new(tokens),
            ..Self::default()
        }
    }

    pub async fn all_tokens(&self) -> Vec<Token> {
        self.tokens.read().await.clone()
    }

    pub async fn token_count(&self) -> usize {
        self.tokens.read().await.len()
    }
}

#[async_trait]
impl TokenStore for InMemoryTokenStore {
    async fn create_token(&self, token: &Token) -> Result<Token, StoreError> {
        let mut tokens = self.tokens.write().await;
        if tokens.iter().any(|t| t.address == token.address) {
            return Err(StoreError::Duplicate(token.address.clone()));
        }
        tokens.push(token.clone());
        Ok(token.clone())
    }

    async fn insert_token_if_absent(&self, token: &Token) -> Result<bool, StoreError> {
        let mut tokens = self.tokens.write().await;
        if tokens.iter().any(|t| t.address == token.address) {
            return Ok(false);
        }
        tokens.push(token.clone());
        Ok(true)
    }

    async fn get_token_by_address(&self, address: &str) -> Result<Option<Token>, StoreError> {
        let tokens = self.tokens.read().await;
        Ok(tokens.iter().find(|t| t.address == address).cloned())
    }

    async fn list_visible_tokens(&self) -> Result<Vec<Token>, StoreError> {
        let tokens = self.tokens.read().await;
        Ok(tokens.iter().filter(|t| t.is_visible()).cloned().collect())
    }
}

#[async_trait]
impl CursorStore for InMemoryTokenStore {
    async fn load_cursor(&self, factory_address: &str) -> Result<Option<IngestionCursor>, StoreError> {
        Ok(self.cursors.read().await.get(factory_address).cloned())
    }

    async fn save_cursor(&self, factory_address: &str, next_index: u64) -> Result<(), StoreError> {
        self.cursors.write().await.insert(
            factory_address.to_string(),
            IngestionCursor {
                factory_address: factory_address.to_string(),
                next_index,
                updated_at: Utc::now(),
            },
        );
        Ok(())
    }

    async fn record_failed_pair(&self, factory_address: &str, pair_index: u64, message: &str) -> Result<(), StoreError> {
        let mut failed = self.failed_pairs.write().await;
        let entry = failed
            .entry((factory_address.to_string(), pair_index))
            .or_insert_with(|| FailedPair {
                factory_address: factory_address.to_string(),
                pair_index,
                message: String::new(),
                attempts: 0,
                failed_at: Utc::now(),
            });
        entry.message = message.to_string();
        entry.attempts += 1;
        entry.failed_at = Utc::now();
        Ok(())
    }

    async fn failed_pairs(&self, factory_address: &str) -> Result<Vec<FailedPair>, StoreError> {
        let failed = self.failed_pairs.read().await;
        let mut pairs: Vec<FailedPair> = failed
            .values()
            .filter(|f| f.factory_address == factory_address)
            .cloned()
            .collect();
        pairs.sort_by_key(|f| f.pair_index);
        Ok(pairs)
    }

    async fn clear_failed_pair(&self, factory_address: &str, pair_index: u64) -> Result<(), StoreError> {
        self.failed_pairs
            .write()
            .await
            .remove(&(factory_address.to_string(), pair_index));
        Ok(())
    }
}
