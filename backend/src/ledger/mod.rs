//! Read-only access to the pair factory, its pairs, and ERC20 metadata.

pub mod contracts;
pub mod fixture;
pub mod provider;

pub use alloy::primitives::Address;
pub use contracts::RpcLedger;
pub use fixture::StaticLedger;

use async_trait::async_trait;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum LedgerError {
    #[error("Contract call failed: {0}")]
    ContractCallFailed(#[from] alloy::contract::Error),
    #[error("RPC transport error: {0}")]
    Transport(#[from] alloy::transports::TransportError),
    #[error("Invalid RPC URL {url}: {reason}")]
    InvalidRpcUrl { url: String, reason: String },
    #[error("Provider timeout after {0}s")]
    Timeout(u64),
    #[error("Value out of range: {0}")]
    OutOfRange(String),
    #[error("Ledger unavailable: {0}")]
    Unavailable(String),
}

/// `name`, `symbol`, `decimals` as reported by a token contract.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TokenMetadata {
    pub name: String,
    pub symbol: String,
    pub decimals: u8,
}

/// The factory/pair/token view the ingestion routine needs.
#[async_trait]
pub trait LedgerClient: Send + Sync {
    fn factory_address(&self) -> Address;

    async fn pair_count(&self) -> Result<u64, LedgerError>;

    async fn pair_at(&self, index: u64) -> Result<Address, LedgerError>;

    /// `(token0, token1)` of a pair contract.
    async fn pair_tokens(&self, pair: Address) -> Result<(Address, Address), LedgerError>;

    async fn token_metadata(&self, token: Address) -> Result<TokenMetadata, LedgerError>;
}
