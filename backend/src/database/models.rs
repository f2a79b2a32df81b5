use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::ledger::TokenMetadata;

/// A token record as stored and served by the API.
///
/// `symbol` and `decimals` are always present on records created by pair
/// ingestion; client-registered records may leave them out. `flag == Some(false)`
/// hides a record from the default listing.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Token {
    pub address: String,
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub symbol: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub decimals: Option<u8>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub flag: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub logo: Option<String>,
}

impl Token {
    /// Build a record from on-chain metadata. Flag and logo stay unset.
    pub fn from_metadata(address: String, metadata: TokenMetadata) -> Self {
        Self {
            address,
            name: metadata.name,
            symbol: Some(metadata.symbol),
            decimals: Some(metadata.decimals),
            flag: None,
            logo: None,
        }
    }

    pub fn is_visible(&self) -> bool {
        self.flag != Some(false)
    }
}

/// Resume point of pair ingestion for one factory.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IngestionCursor {
    pub factory_address: String,
    pub next_index: u64,
    pub updated_at: DateTime<Utc>,
}

/// A pair the cursor moved past without processing. Retried on later runs
/// until it succeeds.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FailedPair {
    pub factory_address: String,
    pub pair_index: u64,
    pub message: String,
    pub attempts: u32,
    pub failed_at: DateTime<Utc>,
}
