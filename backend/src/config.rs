// Configuration management from environment variables

use dotenv::dotenv;
use std::env;
use std::str::FromStr;
use std::time::Duration;
use thiserror::Error;

use crate::ledger::Address;
use crate::token_registry::{FailurePolicy, IngestionConfig};

const DEFAULT_HOST: &str = "0.0.0.0";
const DEFAULT_PORT: u16 = 5000;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum ConfigError {
    #[error("missing required environment variable {0}")]
    Missing(&'static str),
    #[error("invalid value for {key}: {reason}")]
    Invalid { key: &'static str, reason: String },
}

/// Where the pair factory lives.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LedgerConfig {
    pub rpc_url: String,
    pub factory_address: Address,
}

#[derive(Debug, Clone)]
pub struct AppConfig {
    pub host: String,
    pub port: u16,
    pub database_url: String,
    /// `None` disables ingestion; only the HTTP API is served.
    pub ledger: Option<LedgerConfig>,
    pub ingestion: IngestionConfig,
}

impl AppConfig {
    /// Load `.env` if present, then read the process environment.
    pub fn from_env() -> Result<Self, ConfigError> {
        dotenv().ok();
        Self::from_lookup(|key| env::var(key).ok())
    }

    /// Build the configuration from any key/value source.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str| lookup(key).map(|v| v.trim().to_string()).filter(|v| !v.is_empty());

        let database_url = get("DATABASE_URL").ok_or(ConfigError::Missing("DATABASE_URL"))?;
        let host = get("HOST").unwrap_or_else(|| DEFAULT_HOST.to_string());
        let port = parse_or("PORT", get("PORT"), DEFAULT_PORT)?;

        let ledger = match (get("RPC_URL"), get("PAIR_FACTORY_ADDRESS")) {
            (Some(rpc_url), Some(factory)) => Some(LedgerConfig {
                rpc_url,
                factory_address: parse("PAIR_FACTORY_ADDRESS", &factory)?,
            }),
            (None, None) => None,
            (Some(_), None) => return Err(ConfigError::Missing("PAIR_FACTORY_ADDRESS")),
            (None, Some(_)) => return Err(ConfigError::Missing("RPC_URL")),
        };

        let ingestion = IngestionConfig {
            start_index: parse_or("INGEST_START_INDEX", get("INGEST_START_INDEX"), 0)?,
            max_pairs_per_run: get("INGEST_MAX_PAIRS_PER_RUN")
                .map(|v| parse("INGEST_MAX_PAIRS_PER_RUN", &v))
                .transpose()?,
            failure_policy: parse_or(
                "INGEST_FAILURE_POLICY",
                get("INGEST_FAILURE_POLICY"),
                FailurePolicy::Skip,
            )?,
            run_on_startup: parse_or("INGEST_ON_STARTUP", get("INGEST_ON_STARTUP"), false)?,
            interval: get("INGEST_INTERVAL_SECS")
                .map(|v| parse::<u64>("INGEST_INTERVAL_SECS", &v))
                .transpose()?
                .filter(|secs| *secs > 0)
                .map(Duration::from_secs),
        };

        Ok(Self {
            host,
            port,
            database_url,
            ledger,
            ingestion,
        })
    }

    /// Returns formatted server address string (host:port)
    pub fn server_addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

fn parse<T>(key: &'static str, value: &str) -> Result<T, ConfigError>
where
    T: FromStr,
    T::Err: std::fmt::Display,
{
    value.parse::<T>().map_err(|e| ConfigError::Invalid {
        key,
        reason: format!("'{}': {}", value, e),
    })
}

fn parse_or<T>(key: &'static str, value: Option<String>, default: T) -> Result<T, ConfigError>
where
    T: FromStr,
    T::Err: std::fmt::Display,
{
    match value {
        Some(v) => parse(key, &v),
        None => Ok(default),
    }
}
