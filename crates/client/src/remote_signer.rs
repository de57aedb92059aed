//! Signing through a signer-proxy.
//!
//! The proxy plays the wallet: every `eth_signTransaction` it receives is a
//! prompt the account holder may refuse. A refusal comes back as a JSON-RPC
//! error and is surfaced as [`SignerError::Rejected`].

use crate::rejection::SignerError;
use alloy_primitives::{Address, Bytes};
use alloy_rpc_types::eth::TransactionRequest;
use eyre::{bail, Result};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone)]
pub struct RemoteSigner {
    client: reqwest::Client,
    proxy_url: String,
    address: Address,
    chain_id: u64,
}

impl RemoteSigner {
    /// Signer for `address` on `chain_id`, served by the proxy at `proxy_url`.
    pub fn new(proxy_url: impl Into<String>, address: Address, chain_id: u64) -> Self {
        Self {
            client: reqwest::Client::new(),
            proxy_url: proxy_url.into(),
            address,
            chain_id,
        }
    }

    pub const fn address(&self) -> Address {
        self.address
    }

    pub const fn chain_id(&self) -> u64 {
        self.chain_id
    }

    /// Ask the proxy to sign a filled transaction, returning raw EIP-2718 bytes.
    pub async fn sign_transaction(&self, tx: TransactionRequest) -> Result<Bytes> {
        let request = SignRequest {
            jsonrpc: "2.0",
            method: "eth_signTransaction",
            params: [tx],
            id: 1,
        };

        let response = self
            .client
            .post(&self.proxy_url)
            .json(&request)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            bail!("signer-proxy returned {status}: {body}");
        }

        response.json::<SignResponse>().await?.into_signed()
    }
}

#[derive(Debug, Serialize)]
struct SignRequest {
    jsonrpc: &'static str,
    method: &'static str,
    params: [TransactionRequest; 1],
    id: u32,
}

#[derive(Debug, Deserialize)]
struct SignResponse {
    result: Option<SignedTransaction>,
    error: Option<RpcError>,
}

#[derive(Debug, Deserialize)]
struct RpcError {
    code: i64,
    message: String,
}

#[derive(Debug, Deserialize)]
struct SignedTransaction {
    /// Hex-encoded signed envelope
    raw: String,
}

impl SignResponse {
    fn into_signed(self) -> Result<Bytes> {
        match (self.result, self.error) {
            (Some(signed), _) => Ok(signed.raw.parse()?),
            (None, Some(error)) => Err(SignerError::from_rpc(error.code, error.message).into()),
            (None, None) => bail!("signer-proxy answered without a result or an error"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_rejected_response_is_signer_rejection() {
        let response: SignResponse = serde_json::from_str(
            r#"{"jsonrpc":"2.0","id":1,"error":{"code":4001,"message":"User rejected the request."}}"#,
        )
        .unwrap();

        let err = response.into_signed().unwrap_err();
        assert!(matches!(
            err.downcast_ref::<SignerError>(),
            Some(SignerError::Rejected(_))
        ));
    }

    #[test]
    fn test_remote_error_is_not_a_rejection() {
        let response: SignResponse = serde_json::from_str(
            r#"{"jsonrpc":"2.0","id":1,"error":{"code":-32000,"message":"nonce too low"}}"#,
        )
        .unwrap();

        let err = response.into_signed().unwrap_err();
        assert!(matches!(
            err.downcast_ref::<SignerError>(),
            Some(SignerError::Remote { code: -32000, .. })
        ));
    }

    #[test]
    fn test_signed_response_decodes_raw_bytes() {
        let response: SignResponse = serde_json::from_str(
            r#"{"jsonrpc":"2.0","id":1,"result":{"raw":"0x02f8","tx":{}}}"#,
        )
        .unwrap();

        assert_eq!(response.into_signed().unwrap(), Bytes::from(vec![0x02, 0xf8]));
    }

    #[test]
    fn test_empty_response_is_an_error() {
        let response: SignResponse =
            serde_json::from_str(r#"{"jsonrpc":"2.0","id":1}"#).unwrap();
        assert!(response.into_signed().is_err());
    }
}
