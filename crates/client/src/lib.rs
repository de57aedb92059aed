//! RPC providers and transaction signing.
//!
//! Every signed step of the pipeline goes through a [`SignerFn`]. It stands in
//! for the wallet prompt: it either returns a signed envelope or refuses, and a
//! refusal is recognisable with [`is_user_rejection`].

mod receipt;
mod rejection;
mod remote_signer;

use alloy_consensus::TxEnvelope;
use alloy_network::{eip2718::Encodable2718, EthereumWallet, TransactionBuilder};
use alloy_primitives::{Address, Bytes, TxHash};
use alloy_provider::{Provider, ProviderBuilder};
use alloy_rpc_types::TransactionRequest;
use alloy_signer_local::PrivateKeySigner;
pub use receipt::wait_for_receipt;
pub use rejection::{is_user_rejection, SignerError, USER_REJECTED_CODE};
pub use remote_signer::RemoteSigner;
use std::{future::Future, pin::Pin, sync::Arc};
use thiserror::Error;

/// Signs a transaction request, returning the raw signed envelope.
pub type SignerFn = Arc<
    dyn Fn(TransactionRequest) -> Pin<Box<dyn Future<Output = eyre::Result<Bytes>> + Send>>
        + Send
        + Sync,
>;

#[derive(Error, Debug)]
pub enum ClientError {
    #[error("Invalid RPC URL: {0}")]
    InvalidUrl(String),

    #[error("Invalid private key: {0}")]
    InvalidPrivateKey(String),

    #[error("Timed out waiting for receipt of {0}")]
    ReceiptTimeout(TxHash),
}

/// HTTP provider for `rpc_url`.
pub fn create_provider(rpc_url: &str) -> Result<impl Provider + Clone + 'static, ClientError> {
    let url = rpc_url
        .parse()
        .map_err(|e| ClientError::InvalidUrl(format!("{e}")))?;
    Ok(ProviderBuilder::new().connect_http(url))
}

fn parse_key(private_key: &str) -> Result<PrivateKeySigner, ClientError> {
    private_key
        .parse()
        .map_err(|e| ClientError::InvalidPrivateKey(format!("{e}")))
}

/// Address controlled by a hex private key.
pub fn signer_address(private_key: &str) -> Result<Address, ClientError> {
    Ok(parse_key(private_key)?.address())
}

/// [`SignerFn`] backed by a signer-proxy.
///
/// Nonce, fees and gas are filled from `provider` before the proxy is asked,
/// so a transaction that would revert fails before any prompt.
pub fn remote_signer_fn<P>(remote: RemoteSigner, provider: P) -> SignerFn
where
    P: Provider + Clone + 'static,
{
    Arc::new(move |tx| {
        let remote = remote.clone();
        let provider = provider.clone();
        Box::pin(async move {
            let tx = fill_transaction(tx, &provider, remote.address(), remote.chain_id()).await?;
            remote.sign_transaction(tx).await
        })
    })
}

/// [`SignerFn`] signing in process with a private key.
pub fn local_signer_fn<P>(
    private_key: &str,
    chain_id: u64,
    provider: P,
) -> Result<SignerFn, ClientError>
where
    P: Provider + Clone + 'static,
{
    let signer = parse_key(private_key)?;
    let from = signer.address();
    let wallet = EthereumWallet::from(signer);

    Ok(Arc::new(move |tx: TransactionRequest| {
        let wallet = wallet.clone();
        let provider = provider.clone();
        Box::pin(async move {
            let tx = fill_transaction(tx, &provider, from, chain_id).await?;
            let envelope: TxEnvelope = tx
                .build(&wallet)
                .await
                .map_err(|e| eyre::eyre!("{e}"))?;

            let mut encoded = Vec::new();
            envelope.encode_2718(&mut encoded);
            Ok(Bytes::from(encoded))
        })
    }))
}

/// Fill what the caller left unset. Gas is estimated last, so a reverting
/// call surfaces here.
async fn fill_transaction<P>(
    mut tx: TransactionRequest,
    provider: &P,
    from: Address,
    chain_id: u64,
) -> eyre::Result<TransactionRequest>
where
    P: Provider,
{
    tx.from.get_or_insert(from);
    tx.chain_id.get_or_insert(chain_id);

    if tx.nonce.is_none() {
        tx.nonce = Some(provider.get_transaction_count(from).await?);
    }

    if tx.max_fee_per_gas.is_none() || tx.max_priority_fee_per_gas.is_none() {
        let fees = provider.estimate_eip1559_fees().await?;
        tx.max_fee_per_gas.get_or_insert(fees.max_fee_per_gas);
        tx.max_priority_fee_per_gas
            .get_or_insert(fees.max_priority_fee_per_gas);
    }

    if tx.gas.is_none() {
        let estimate = provider.estimate_gas(tx.clone()).await?;
        // 20% headroom
        tx.gas = Some(estimate + estimate / 5);
    }

    Ok(tx)
}
