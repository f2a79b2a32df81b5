use alloy::{
    primitives::{Address, U256},
    providers::RootProvider,
    sol,
    transports::http::{Client, Http},
};
use async_trait::async_trait;
use tracing::debug;

use super::{provider, LedgerClient, LedgerError, TokenMetadata};

// Uniswap V2 style factory
sol! {
    #[sol(rpc)]
    interface IPairFactory {
        function allPairsLength() external view returns (uint256);
        function allPairs(uint256 index) external view returns (address pair);
    }
}

sol! {
    #[sol(rpc)]
    interface IPair {
        function token0() external view returns (address);
        function token1() external view returns (address);
    }
}

sol! {
    #[sol(rpc)]
    interface IERC20Metadata {
        function name() external view returns (string);
        function symbol() external view returns (string);
        function decimals() external view returns (uint8);
    }
}

/// JSON-RPC backed ledger bound to a single pair factory.
pub struct RpcLedger {
    provider: RootProvider<Http<Client>>,
    factory: Address,
}

impl RpcLedger {
    pub fn new(provider: RootProvider<Http<Client>>, factory: Address) -> Self {
        Self { provider, factory }
    }

    pub async fn connect(rpc_url: &str, factory: Address) -> Result<Self, LedgerError> {
        let provider = provider::connect_http(rpc_url).await?;
        Ok(Self::new(provider, factory))
    }
}

#[async_trait]
impl LedgerClient for RpcLedger {
    fn factory_address(&self) -> Address {
        self.factory
    }

    async fn pair_count(&self) -> Result<u64, LedgerError> {
        let factory = IPairFactory::new(self.factory, &self.provider);
        let length = factory.allPairsLength().call().await?._0;
        u64::try_from(length).map_err(|_| LedgerError::OutOfRange(format!("pair count {}", length)))
    }

    async fn pair_at(&self, index: u64) -> Result<Address, LedgerError> {
        let factory = IPairFactory::new(self.factory, &self.provider);
        let pair = factory.allPairs(U256::from(index)).call().await?.pair;
        debug!("allPairs({}) = {}", index, pair);
        Ok(pair)
    }

    async fn pair_tokens(&self, pair: Address) -> Result<(Address, Address), LedgerError> {
        let contract = IPair::new(pair, &self.provider);
        let token0 = contract.token0().call().await?._0;
        let token1 = contract.token1().call().await?._0;
        Ok((token0, token1))
    }

    async fn token_metadata(&self, token: Address) -> Result<TokenMetadata, LedgerError> {
        let contract = IERC20Metadata::new(token, &self.provider);
        let symbol = contract.symbol().call().await?._0;
        let name = contract.name().call().await?._0;
        let decimals = contract.decimals().call().await?._0;
        Ok(TokenMetadata { name, symbol, decimals })
    }
}
