pub mod finalize;
pub mod prove;
pub mod resolve;
pub mod withdraw;

use alloy_primitives::TxHash;
use alloy_provider::Provider;
use alloy_rpc_types::TransactionRequest;
use alloy_rpc_types_eth::BlockNumberOrTag;
pub use client::SignerFn;
use std::future::Future;
use tracing::{debug, info};

/// A signed onchain step of the withdrawal pipeline.
pub trait Action: Send + Sync {
    /// Sign and broadcast the action's transaction.
    ///
    /// Returns as soon as the node accepted the transaction. Inclusion is
    /// watched separately by hash, so a restart can pick the watch up again.
    fn submit(&self) -> impl Future<Output = eyre::Result<TxHash>> + Send;

    /// Get a human-readable description of this action.
    fn description(&self) -> String;
}

/// Announce `action`, then submit it.
pub async fn execute<A: Action>(action: A) -> eyre::Result<TxHash> {
    info!(action = %action.description(), "Requesting signature");
    action.submit().await
}

/// Fail unless `provider` is connected to `expected`.
pub async fn ensure_chain<P>(provider: &P, expected: u64) -> eyre::Result<()>
where
    P: Provider,
{
    let chain_id = provider.get_chain_id().await?;
    if chain_id != expected {
        eyre::bail!("Connected to chain {chain_id}, expected settlement chain {expected}");
    }
    Ok(())
}

/// Hand `tx` to the signer and broadcast the signed bytes.
pub(crate) async fn sign_and_send<P>(
    provider: &P,
    signer: &SignerFn,
    tx: TransactionRequest,
) -> eyre::Result<TxHash>
where
    P: Provider,
{
    let signed_tx = (signer)(tx).await?;
    let pending = provider.send_raw_transaction(&signed_tx).await?;
    let tx_hash = *pending.tx_hash();
    debug!(tx_hash = %tx_hash, "Transaction broadcast");
    Ok(tx_hash)
}

/// Timestamp of the latest block, in seconds.
pub(crate) async fn latest_timestamp<P>(provider: &P) -> eyre::Result<u64>
where
    P: Provider,
{
    let block = provider
        .get_block_by_number(BlockNumberOrTag::Latest)
        .await?
        .ok_or_else(|| eyre::eyre!("Failed to get latest block"))?;
    Ok(block.header.timestamp)
}

#[cfg(test)]
pub(crate) mod test_utils {
    use super::SignerFn;
    use alloy_provider::{network::Ethereum, Provider, RootProvider};
    use std::sync::Arc;

    /// Mock provider for unit tests.
    #[derive(Clone)]
    pub struct MockProvider;

    impl Provider for MockProvider {
        fn root(&self) -> &RootProvider<Ethereum> {
            todo!()
        }
    }

    /// Create a mock signer for testing that panics if called.
    /// Used for tests that don't actually execute transactions.
    pub fn mock_signer() -> SignerFn {
        Arc::new(|_tx| Box::pin(async { panic!("mock signer should not be called") }))
    }
}
