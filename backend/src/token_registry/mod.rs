pub mod discovery_engine;
pub mod scheduler;
pub mod validation_service;

pub use discovery_engine::{TokenIngestionService, IngestionError};
pub use scheduler::{IngestionScheduler, IngestionState, IngestionStatus};
pub use validation_service::{normalize_address, CreateTokenRequest, ValidationError};

use serde::{Deserialize, Serialize};
use std::str::FromStr;
use std::time::Duration;

/// What to do when one pair cannot be processed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FailurePolicy {
    /// Log, record the failure, and continue with the next pair.
    #[default]
    Skip,
    /// Stop the run and leave the cursor on the failing pair.
    Abort,
}

impl FromStr for FailurePolicy {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "skip" => Ok(FailurePolicy::Skip),
            "abort" => Ok(FailurePolicy::Abort),
            other => Err(format!("unknown failure policy '{}', expected 'skip' or 'abort'", other)),
        }
    }
}

#[derive(Debug, Clone)]
pub struct IngestionConfig {
    /// Cursor used for a factory that has never been ingested.
    pub start_index: u64,
    pub max_pairs_per_run: Option<u64>,
    pub failure_policy: FailurePolicy,
    pub run_on_startup: bool,
    /// Repeat ingestion at this interval once started.
    pub interval: Option<Duration>,
}

impl Default for IngestionConfig {
    fn default() -> Self {
        Self {
            start_index: 0,
            max_pairs_per_run: None,
            failure_policy: FailurePolicy::Skip,
            run_on_startup: false,
            interval: None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PairFailure {
    pub index: u64,
    pub message: String,
}

/// Outcome of one pass over the factory's pair list.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IngestionReport {
    pub factory_address: String,
    pub pair_count: u64,
    pub start_index: u64,
    /// Cursor value persisted at the end of the run.
    pub end_index: u64,
    pub pairs_processed: u64,
    pub tokens_created: u64,
    pub tokens_existing: u64,
    /// Previously skipped pairs attempted again at the start of the run.
    pub pairs_retried: u64,
    pub pairs_recovered: u64,
    pub failures: Vec<PairFailure>,
    pub aborted: bool,
    pub duration_ms: u64,
}

impl IngestionReport {
    fn new(factory_address: String, pair_count: u64, start_index: u64) -> Self {
        Self {
            factory_address,
            pair_count,
            start_index,
            end_index: start_index,
            pairs_processed: 0,
            tokens_created: 0,
            tokens_existing: 0,
            pairs_retried: 0,
            pairs_recovered: 0,
            failures: Vec::new(),
            aborted: false,
            duration_ms: 0,
        }
    }

    pub fn success(&self) -> bool {
        self.failures.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_failure_policy_parsing() {
        assert_eq!("skip".parse::<FailurePolicy>(), Ok(FailurePolicy::Skip));
        assert_eq!(" Abort ".parse::<FailurePolicy>(), Ok(FailurePolicy::Abort));
        assert!("retry".parse::<FailurePolicy>().is_err());
    }
}
