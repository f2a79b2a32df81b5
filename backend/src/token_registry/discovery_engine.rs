use std::collections::HashSet;
use std::sync::Arc;
use thiserror::Error;
use tokio::time::Instant;
use tracing::{debug, error, info, warn};

use crate::database::{CursorStore, FailedPair, StoreError, Token, TokenStore};
use crate::ledger::{Address, LedgerClient, LedgerError};
use super::{normalize_address, FailurePolicy, IngestionConfig, IngestionReport, PairFailure};

#[derive(Debug, Error)]
pub enum IngestionError {
    #[error("Ledger error: {0}")]
    Ledger(#[from] LedgerError),
    #[error("Datastore error: {0}")]
    Store(#[from] StoreError),
    #[error("An ingestion run is already in progress")]
    AlreadyRunning,
}

/// Walks the factory's pair list from the persisted cursor and stores every
/// token it has not seen before.
pub struct TokenIngestionService {
    ledger: Arc<dyn LedgerClient>,
    tokens: Arc<dyn TokenStore>,
    cursors: Arc<dyn CursorStore>,
    config: IngestionConfig,
}

impl TokenIngestionService {
    pub fn new(
        ledger: Arc<dyn LedgerClient>,
        tokens: Arc<dyn TokenStore>,
        cursors: Arc<dyn CursorStore>,
        config: IngestionConfig,
    ) -> Self {
        Self {
            ledger,
            tokens,
            cursors,
            config,
        }
    }

    /// Key under which this factory's cursor is persisted.
    pub fn cursor_key(&self) -> String {
        normalize_address(&self.ledger.factory_address().to_string())
    }

    /// Next pair index that would be processed.
    pub async fn current_cursor(&self) -> Result<u64, IngestionError> {
        let cursor = self.cursors.load_cursor(&self.cursor_key()).await?;
        Ok(cursor.map_or(self.config.start_index, |c| c.next_index))
    }

    /// Pairs skipped by earlier runs and not yet recovered.
    pub async fn failed_pairs(&self) -> Result<Vec<FailedPair>, IngestionError> {
        Ok(self.cursors.failed_pairs(&self.cursor_key()).await?)
    }

    /// Retry pairs skipped by earlier runs, then process every pair in
    /// `[cursor, pair_count)`, bounded by `max_pairs_per_run`.
    ///
    /// Errors reading the pair count or the cursor, and errors persisting the
    /// cursor, fail the whole run. Per-pair errors are handled by the
    /// configured [`FailurePolicy`] and recorded in the report. Pairs skipped
    /// under [`FailurePolicy::Skip`] are persisted and retried on later runs.
    pub async fn run(&self) -> Result<IngestionReport, IngestionError> {
        let start_time = Instant::now();
        let factory = self.cursor_key();

        let pair_count = self.ledger.pair_count().await?;
        info!("Number of pairs: {}", pair_count);

        let start_index = self.current_cursor().await?;
        let end_index = match self.config.max_pairs_per_run {
            Some(max) => pair_count.min(start_index.saturating_add(max)),
            None => pair_count,
        };

        let mut report = IngestionReport::new(factory.clone(), pair_count, start_index);
        let mut seen: HashSet<String> = HashSet::new();

        self.retry_failed_pairs(&factory, &mut seen, &mut report).await?;

        if start_index >= end_index {
            info!("Factory {} is up to date at pair {}", factory, start_index);
            report.duration_ms = start_time.elapsed().as_millis() as u64;
            return Ok(report);
        }

        info!("Ingesting pairs {}..{} of factory {}", start_index, end_index, factory);

        for index in start_index..end_index {
            if let Err(e) = self.process_pair(index, &mut seen, &mut report).await {
                let message = e.to_string();
                report.failures.push(PairFailure {
                    index,
                    message: message.clone(),
                });

                if self.config.failure_policy == FailurePolicy::Abort {
                    error!("Error fetching pair {}, aborting run: {}", index, e);
                    report.aborted = true;
                    break;
                }
                warn!("Skipping pair {}: {}", index, e);
                self.cursors.record_failed_pair(&factory, index, &message).await?;
            } else {
                report.pairs_processed += 1;
            }

            self.cursors.save_cursor(&factory, index + 1).await?;
            report.end_index = index + 1;
        }

        report.duration_ms = start_time.elapsed().as_millis() as u64;
        info!(
            "Ingestion finished: pairs {}..{}, {} processed, {} tokens created, {} already known, {} failures, {}/{} retries recovered in {}ms",
            report.start_index,
            report.end_index,
            report.pairs_processed,
            report.tokens_created,
            report.tokens_existing,
            report.failures.len(),
            report.pairs_recovered,
            report.pairs_retried,
            report.duration_ms
        );
        Ok(report)
    }

    /// Skipped pairs stay recorded until they succeed. A retry that fails
    /// again never aborts the run.
    async fn retry_failed_pairs(
        &self,
        factory: &str,
        seen: &mut HashSet<String>,
        report: &mut IngestionReport,
    ) -> Result<(), IngestionError> {
        let failed = self.cursors.failed_pairs(factory).await?;
        if failed.is_empty() {
            return Ok(());
        }
        info!("Retrying {} previously skipped pairs of factory {}", failed.len(), factory);

        for pair in failed {
            report.pairs_retried += 1;
            match self.process_pair(pair.pair_index, seen, report).await {
                Ok(()) => {
                    info!("Pair {} recovered after {} failed attempts", pair.pair_index, pair.attempts);
                    self.cursors.clear_failed_pair(factory, pair.pair_index).await?;
                    report.pairs_recovered += 1;
                }
                Err(e) => {
                    warn!("Pair {} still failing: {}", pair.pair_index, e);
                    let message = e.to_string();
                    self.cursors.record_failed_pair(factory, pair.pair_index, &message).await?;
                    report.failures.push(PairFailure {
                        index: pair.pair_index,
                        message,
                    });
                }
            }
        }
        Ok(())
    }

    async fn process_pair(
        &self,
        index: u64,
        seen: &mut HashSet<String>,
        report: &mut IngestionReport,
    ) -> Result<(), IngestionError> {
        let pair = self.ledger.pair_at(index).await?;
        info!("Pair {}: {}", index, pair);

        let (token0, token1) = self.ledger.pair_tokens(pair).await?;

        // One bad token must not keep its sibling out of the store
        let mut first_error = None;
        for token in [token0, token1] {
            if let Err(e) = self.ingest_token(token, seen, report).await {
                error!("Error saving token {}: {}", token, e);
                first_error.get_or_insert(e);
            }
        }

        match first_error {
            Some(e) => Err(e),
            None => Ok(()),
        }
    }

    async fn ingest_token(
        &self,
        token: Address,
        seen: &mut HashSet<String>,
        report: &mut IngestionReport,
    ) -> Result<(), IngestionError> {
        let address = normalize_address(&token.to_string());
        if seen.contains(&address) {
            debug!("Token {} already handled in this run", address);
            return Ok(());
        }

        if let Some(existing) = self.tokens.get_token_by_address(&address).await? {
            info!(
                "Token already exists: {} at address: {}",
                existing.symbol.as_deref().unwrap_or(&existing.name),
                address
            );
            report.tokens_existing += 1;
            seen.insert(address);
            return Ok(());
        }

        let metadata = self.ledger.token_metadata(token).await?;
        let symbol = metadata.symbol.clone();
        let record = Token::from_metadata(address.clone(), metadata);

        if self.tokens.insert_token_if_absent(&record).await? {
            info!("Saved new token: {} at address: {}", symbol, address);
            report.tokens_created += 1;
        } else {
            info!("Token already exists: {} at address: {}", symbol, address);
            report.tokens_existing += 1;
        }
        seen.insert(address);
        Ok(())
    }
}
