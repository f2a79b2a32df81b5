use alloy::providers::{Provider, ProviderBuilder, RootProvider};
use alloy::transports::http::{Client, Http};
use std::time::Duration;
use tokio::time::timeout;
use tracing::{debug, info};

use super::LedgerError;

const PROBE_TIMEOUT_SECS: u64 = 5;

/// Build an HTTP provider and make sure the endpoint answers before handing it out.
pub async fn connect_http(rpc_url: &str) -> Result<RootProvider<Http<Client>>, LedgerError> {
    let parsed_url = rpc_url.parse().map_err(|e| LedgerError::InvalidRpcUrl {
        url: rpc_url.to_string(),
        reason: format!("{}", e),
    })?;

    let provider = ProviderBuilder::new().on_http(parsed_url);

    match timeout(Duration::from_secs(PROBE_TIMEOUT_SECS), provider.get_block_number()).await {
        Ok(Ok(block)) => {
            info!("Connected to RPC endpoint at block {}", block);
            Ok(provider)
        }
        Ok(Err(e)) => {
            debug!("Provider probe failed: {:?}", e);
            Err(LedgerError::Transport(e))
        }
        Err(_) => Err(LedgerError::Timeout(PROBE_TIMEOUT_SECS)),
    }
}
