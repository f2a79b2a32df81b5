use anyhow::{Context, Result};
use sqlx::{Executor, PgPool, Row};
use std::collections::HashSet;
use tracing::{error, info};

/// Bundled schema migrations, applied in order and recorded by name.
const MIGRATIONS: &[(&str, &str)] = &[
    ("001_tokens", include_str!("../../sql/001_tokens.sql")),
    ("002_ingestion_failures", include_str!("../../sql/002_ingestion_failures.sql")),
];

pub struct MigrationRunner {
    pool: PgPool,
}

impl MigrationRunner {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Apply every bundled migration not yet recorded. Each one commits
    /// together with its bookkeeping row, so a failure leaves no partial schema.
    pub async fn run_migrations(&self) -> Result<()> {
        self.pool
            .execute(
                r#"
                CREATE TABLE IF NOT EXISTS migrations (
                    id SERIAL PRIMARY KEY,
                    name VARCHAR(255) NOT NULL UNIQUE,
                    applied_at TIMESTAMP WITH TIME ZONE DEFAULT NOW()
                )
                "#,
            )
            .await
            .context("failed to create migrations table")?;

        let applied = self.applied_migrations().await?;
        let pending: Vec<_> = MIGRATIONS
            .iter()
            .filter(|(name, _)| !applied.contains(*name))
            .collect();

        if pending.is_empty() {
            info!("Schema is up to date ({} migrations)", applied.len());
            return Ok(());
        }

        for (name, sql) in pending {
            info!("Applying migration: {}", name);
            if let Err(e) = self.apply(name, sql).await {
                error!("Migration {} failed: {}", name, e);
                return Err(e.context(format!("migration {} failed", name)));
            }
        }

        info!("All migrations completed successfully");
        Ok(())
    }

    async fn applied_migrations(&self) -> Result<HashSet<String>> {
        let rows = sqlx::query("SELECT name FROM migrations")
            .fetch_all(&self.pool)
            .await?;
        Ok(rows.iter().map(|row| row.get("name")).collect())
    }

    async fn apply(&self, name: &str, sql: &str) -> Result<()> {
        let mut tx = self.pool.begin().await?;

        // Unprepared execution, so multi-statement files are accepted
        (&mut *tx).execute(sql).await?;
        sqlx::query("INSERT INTO migrations (name) VALUES ($1)")
            .bind(name)
            .execute(&mut *tx)
            .await?;

        tx.commit().await?;
        Ok(())
    }
}
