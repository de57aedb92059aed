//! Hash-based confirmation watching.

use crate::ClientError;
use alloy_network::ReceiptResponse;
use alloy_primitives::TxHash;
use alloy_provider::{PendingTransactionBuilder, PendingTransactionError, Provider, WatchTxError};
use std::time::Duration;
use tracing::debug;

/// Watch `tx_hash` until it is mined.
///
/// Returns the execution status of the mined transaction (`false` when it
/// reverted). Fails with [`ClientError::ReceiptTimeout`] when no receipt shows
/// up within `timeout`.
pub async fn wait_for_receipt<P>(
    provider: &P,
    tx_hash: TxHash,
    timeout: Duration,
) -> eyre::Result<bool>
where
    P: Provider,
{
    let receipt = PendingTransactionBuilder::new(provider.root().clone(), tx_hash)
        .with_timeout(Some(timeout))
        .get_receipt()
        .await
        .map_err(|e| watch_error(tx_hash, e))?;

    debug!(
        tx_hash = %tx_hash,
        block_number = ?receipt.block_number(),
        success = receipt.status(),
        "Receipt found"
    );
    Ok(receipt.status())
}

fn watch_error(tx_hash: TxHash, error: PendingTransactionError) -> eyre::Report {
    match error {
        PendingTransactionError::TxWatcher(WatchTxError::Timeout) => {
            ClientError::ReceiptTimeout(tx_hash).into()
        }
        other => eyre::Report::new(other),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_watch_timeout_is_receipt_timeout() {
        let hash = TxHash::repeat_byte(0x01);
        let err = watch_error(hash, PendingTransactionError::TxWatcher(WatchTxError::Timeout));
        assert!(matches!(
            err.downcast_ref::<ClientError>(),
            Some(ClientError::ReceiptTimeout(h)) if *h == hash
        ));
    }
}
