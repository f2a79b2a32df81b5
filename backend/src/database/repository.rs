use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::{postgres::PgRow, PgPool, Row};
use thiserror::Error;
use tracing::{debug, info};

use super::models::{FailedPair, IngestionCursor, Token};

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("token with address {0} already exists")]
    Duplicate(String),
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),
}

/// Token persistence shared by ingestion and the HTTP handlers.
#[async_trait]
pub trait TokenStore: Send + Sync {
    /// Insert a new record. Fails with [`StoreError::Duplicate`] if the address is taken.
    async fn create_token(&self, token: &Token) -> Result<Token, StoreError>;

    /// Insert unless the address already exists. Returns whether a row was written.
    /// Existing records are never modified.
    async fn insert_token_if_absent(&self, token: &Token) -> Result<bool, StoreError>;

    async fn get_token_by_address(&self, address: &str) -> Result<Option<Token>, StoreError>;

    /// All records whose flag is not explicitly `false`, in insertion order.
    async fn list_visible_tokens(&self) -> Result<Vec<Token>, StoreError>;
}

#[async_trait]
pub trait CursorStore: Send + Sync {
    async fn load_cursor(&self, factory_address: &str) -> Result<Option<IngestionCursor>, StoreError>;

    async fn save_cursor(&self, factory_address: &str, next_index: u64) -> Result<(), StoreError>;

    /// Remember a skipped pair. Recording the same index again bumps `attempts`.
    async fn record_failed_pair(&self, factory_address: &str, pair_index: u64, message: &str) -> Result<(), StoreError>;

    /// Skipped pairs still awaiting a retry, lowest index first.
    async fn failed_pairs(&self, factory_address: &str) -> Result<Vec<FailedPair>, StoreError>;

    async fn clear_failed_pair(&self, factory_address: &str, pair_index: u64) -> Result<(), StoreError>;
}

pub struct PgTokenRepository {
    pool: PgPool,
}

impl PgTokenRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    fn token_from_row(row: &PgRow) -> Token {
        Token {
            address: row.get("address"),
            name: row.get("name"),
            symbol: row.get("symbol"),
            decimals: row
                .get::<Option<i16>, _>("decimals")
                .and_then(|d| u8::try_from(d).ok()),
            flag: row.get("flag"),
            logo: row.get("logo"),
        }
    }
}

#[async_trait]
impl TokenStore for PgTokenRepository {
    async fn create_token(&self, token: &Token) -> Result<Token, StoreError> {
        let row = sqlx::query(
            r#"
            INSERT INTO tokens (address, name, symbol, decimals, flag, logo)
            VALUES ($1, $2, $3, $4, $5, $6)
            RETURNING address, name, symbol, decimals, flag, logo
            "#)
            .bind(&token.address)
            .bind(&token.name)
            .bind(&token.symbol)
            .bind(token.decimals.map(i16::from))
            .bind(token.flag)
            .bind(&token.logo)
        .fetch_one(&self.pool)
        .await
        .map_err(|e| match e {
            sqlx::Error::Database(db_err) if db_err.is_unique_violation() => {
                StoreError::Duplicate(token.address.clone())
            }
            other => StoreError::Database(other),
        })?;

        info!("Created token: {} at address: {}", token.name, token.address);
        Ok(Self::token_from_row(&row))
    }

    async fn insert_token_if_absent(&self, token: &Token) -> Result<bool, StoreError> {
        let result = sqlx::query(
            r#"
            INSERT INTO tokens (address, name, symbol, decimals, flag, logo)
            VALUES ($1, $2, $3, $4, $5, $6)
            ON CONFLICT (address) DO NOTHING
            "#)
            .bind(&token.address)
            .bind(&token.name)
            .bind(&token.symbol)
            .bind(token.decimals.map(i16::from))
            .bind(token.flag)
            .bind(&token.logo)
        .execute(&self.pool)
        .await?;

        Ok(result.rows_affected() == 1)
    }

    async fn get_token_by_address(&self, address: &str) -> Result<Option<Token>, StoreError> {
        let row = sqlx::query(
            r#"
            SELECT address, name, symbol, decimals, flag, logo
            FROM tokens
            WHERE address = $1
            "#)
            .bind(address)
        .fetch_optional(&self.pool)
        .await?;

        Ok(row.as_ref().map(Self::token_from_row))
    }

    async fn list_visible_tokens(&self) -> Result<Vec<Token>, StoreError> {
        let rows = sqlx::query(
            r#"
            SELECT address, name, symbol, decimals, flag, logo
            FROM tokens
            WHERE flag IS DISTINCT FROM FALSE
            ORDER BY seq
            "#)
        .fetch_all(&self.pool)
        .await?;

        debug!("Loaded {} visible tokens", rows.len());
        Ok(rows.iter().map(Self::token_from_row).collect())
    }
}

#[async_trait]
impl CursorStore for PgTokenRepository {
    async fn load_cursor(&self, factory_address: &str) -> Result<Option<IngestionCursor>, StoreError> {
        let row = sqlx::query(
            "SELECT factory_address, next_index, updated_at FROM ingestion_cursors WHERE factory_address = $1",
        )
        .bind(factory_address)
        .fetch_optional(&self.pool)
        .await?;

        Ok(row.map(|row| IngestionCursor {
            factory_address: row.get("factory_address"),
            next_index: u64::try_from(row.get::<i64, _>("next_index")).unwrap_or(0),
            updated_at: row.get::<DateTime<Utc>, _>("updated_at"),
        }))
    }

    async fn save_cursor(&self, factory_address: &str, next_index: u64) -> Result<(), StoreError> {
        sqlx::query(
            r#"
            INSERT INTO ingestion_cursors (factory_address, next_index, updated_at)
            VALUES ($1, $2, NOW())
            ON CONFLICT (factory_address) DO UPDATE SET
                next_index = EXCLUDED.next_index,
                updated_at = NOW()
            "#)
            .bind(factory_address)
            .bind(i64::try_from(next_index).unwrap_or(i64::MAX))
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    async fn record_failed_pair(&self, factory_address: &str, pair_index: u64, message: &str) -> Result<(), StoreError> {
        sqlx::query(
            r#"
            INSERT INTO ingestion_failures (factory_address, pair_index, message, attempts, failed_at)
            VALUES ($1, $2, $3, 1, NOW())
            ON CONFLICT (factory_address, pair_index) DO UPDATE SET
                message = EXCLUDED.message,
                attempts = ingestion_failures.attempts + 1,
                failed_at = NOW()
            "#)
            .bind(factory_address)
            .bind(i64::try_from(pair_index).unwrap_or(i64::MAX))
            .bind(message)
        .execute(&self.pool)
        .await?;

        debug!("Recorded failed pair {} for factory {}", pair_index, factory_address);
        Ok(())
    }

    async fn failed_pairs(&self, factory_address: &str) -> Result<Vec<FailedPair>, StoreError> {
        let rows = sqlx::query(
            r#"
            SELECT factory_address, pair_index, message, attempts, failed_at
            FROM ingestion_failures
            WHERE factory_address = $1
            ORDER BY pair_index
            "#)
            .bind(factory_address)
        .fetch_all(&self.pool)
        .await?;

        Ok(rows
            .iter()
            .map(|row| FailedPair {
                factory_address: row.get("factory_address"),
                pair_index: u64::try_from(row.get::<i64, _>("pair_index")).unwrap_or(0),
                message: row.get("message"),
                attempts: u32::try_from(row.get::<i32, _>("attempts")).unwrap_or(0),
                failed_at: row.get::<DateTime<Utc>, _>("failed_at"),
            })
            .collect())
    }

    async fn clear_failed_pair(&self, factory_address: &str, pair_index: u64) -> Result<(), StoreError> {
        sqlx::query("DELETE FROM ingestion_failures WHERE factory_address = $1 AND pair_index = $2")
            .bind(factory_address)
            .bind(i64::try_from(pair_index).unwrap_or(i64::MAX))
            .execute(&self.pool)
            .await?;

        Ok(())
    }
}
