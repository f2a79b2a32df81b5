use async_trait::async_trait;
use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::RwLock;

use super::{Address, LedgerClient, LedgerError, TokenMetadata};

/// Scripted in-process ledger for tests and local runs without an RPC node.
///
/// Pairs are listed in factory order. Any pair index or token address can be
/// marked as failing, which makes the corresponding call return
/// [`LedgerError::Unavailable`].
pub struct StaticLedger {
    factory: Address,
    pairs: RwLock<Vec<(Address, Address, Address)>>,
    tokens: RwLock<HashMap<Address, TokenMetadata>>,
    failing_pairs: RwLock<HashSet<u64>>,
    failing_tokens: RwLock<HashSet<Address>>,
    offline: AtomicBool,
    metadata_calls: AtomicUsize,
}

impl StaticLedger {
    pub fn new(factory: Address) -> Self {
        Self {
            factory,
            pairs: RwLock::new(Vec::new()),
            tokens: RwLock::new(HashMap::new()),
            failing_pairs: RwLock::new(HashSet::new()),
            failing_tokens: RwLock::new(HashSet::new()),
            offline: AtomicBool::new(false),
            metadata_calls: AtomicUsize::new(0),
        }
    }

    pub fn with_token(self, token: Address, name: &str, symbol: &str, decimals: u8) -> Self {
        self.add_token(token, name, symbol, decimals);
        self
    }

    pub fn with_pair(self, pair: Address, token0: Address, token1: Address) -> Self {
        self.add_pair(pair, token0, token1);
        self
    }

    pub fn add_token(&self, token: Address, name: &str, symbol: &str, decimals: u8) {
        if let Ok(mut tokens) = self.tokens.write() {
            tokens.insert(
                token,
                TokenMetadata {
                    name: name.to_string(),
                    symbol: symbol.to_string(),
                    decimals,
                },
            );
        }
    }

    /// Append a pair, as the factory does when a new pool is deployed.
    pub fn add_pair(&self, pair: Address, token0: Address, token1: Address) {
        if let Ok(mut pairs) = self.pairs.write() {
            pairs.push((pair, token0, token1));
        }
    }

    pub fn fail_pair(&self, index: u64) {
        if let Ok(mut failing) = self.failing_pairs.write() {
            failing.insert(index);
        }
    }

    /// Let a pair marked with [`fail_pair`](Self::fail_pair) answer again.
    pub fn restore_pair(&self, index: u64) {
        if let Ok(mut failing) = self.failing_pairs.write() {
            failing.remove(&index);
        }
    }

    pub fn fail_token(&self, token: Address) {
        if let Ok(mut failing) = self.failing_tokens.write() {
            failing.insert(token);
        }
    }

    /// Make `pair_count` fail until switched back.
    pub fn set_offline(&self, offline: bool) {
        self.offline.store(offline, Ordering::SeqCst);
    }

    /// Number of `token_metadata` calls served so far.
    pub fn metadata_calls(&self) -> usize {
        self.metadata_calls.load(Ordering::SeqCst)
    }

    fn poisoned() -> LedgerError {
        LedgerError::Unavailable("fixture lock poisoned".to_string())
    }
}

#[async_trait]
impl LedgerClient for StaticLedger {
    fn factory_address(&self) -> Address {
        self.factory
    }

    async fn pair_count(&self) -> Result<u64, LedgerError> {
        if self.offline.load(Ordering::SeqCst) {
            return Err(LedgerError::Unavailable("allPairsLength() request failed".to_string()));
        }
        let pairs = self.pairs.read().map_err(|_| Self::poisoned())?;
        Ok(pairs.len() as u64)
    }

    async fn pair_at(&self, index: u64) -> Result<Address, LedgerError> {
        if self.failing_pairs.read().map_err(|_| Self::poisoned())?.contains(&index) {
            return Err(LedgerError::Unavailable(format!("allPairs({}) reverted", index)));
        }
        let pairs = self.pairs.read().map_err(|_| Self::poisoned())?;
        usize::try_from(index)
            .ok()
            .and_then(|i| pairs.get(i))
            .map(|(pair, _, _)| *pair)
            .ok_or_else(|| LedgerError::OutOfRange(format!("pair index {}", index)))
    }

    async fn pair_tokens(&self, pair: Address) -> Result<(Address, Address), LedgerError> {
        let pairs = self.pairs.read().map_err(|_| Self::poisoned())?;
        pairs
            .iter()
            .find(|(candidate, _, _)| *candidate == pair)
            .map(|(_, token0, token1)| (*token0, *token1))
            .ok_or_else(|| LedgerError::Unavailable(format!("no pair contract at {}", pair)))
    }

    async fn token_metadata(&self, token: Address) -> Result<TokenMetadata, LedgerError> {
        self.metadata_calls.fetch_add(1, Ordering::SeqCst);
        if self.failing_tokens.read().map_err(|_| Self::poisoned())?.contains(&token) {
            return Err(LedgerError::Unavailable(format!("symbol() reverted for {}", token)));
        }
        let tokens = self.tokens.read().map_err(|_| Self::poisoned())?;
        tokens
            .get(&token)
            .cloned()
            .ok_or_else(|| LedgerError::Unavailable(format!("no token contract at {}", token)))
    }
}
