use crate::{BatchRequest, CallsStatus, SendCallsResponse, error::WalletError};
use async_trait::async_trait;
use ethers::providers::{Http, JsonRpcClient, Provider};
use tracing::debug;

/// Wallet exposing the batched-transaction API
#[async_trait]
pub trait WalletProvider: Send + Sync {
    /// Submit a batch via `wallet_sendCalls`
    async fn send_calls(&self, request: &BatchRequest) -> Result<SendCallsResponse, WalletError>;

    /// Query a batch via `wallet_getCallsStatus`
    async fn get_calls_status(&self, calls_id: &str) -> Result<CallsStatus, WalletError>;
}

#[async_trait]
impl<P> WalletProvider for Provider<P>
where
    P: JsonRpcClient,
{
    async fn send_calls(&self, request: &BatchRequest) -> Result<SendCallsResponse, WalletError> {
        debug!("wallet_sendCalls from {:?} with {} calls", request.from, request.calls.len());
        let response = self.request("wallet_sendCalls", [request]).await?;
        Ok(response)
    }

    async fn get_calls_status(&self, calls_id: &str) -> Result<CallsStatus, WalletError> {
        let status = self.request("wallet_getCallsStatus", [calls_id]).await?;
        Ok(status)
    }
}

/// Connect to a wallet JSON-RPC endpoint over HTTP
pub fn connect(rpc_url: &str) -> Result<Provider<Http>, WalletError> {
    Provider::<Http>::try_from(rpc_url).map_err(|e| WalletError::Malformed(format!("invalid wallet rpc url {rpc_url}: {e}")))
}
