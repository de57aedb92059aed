//! Event extraction.
//!
//! Turns the hash of an `initiateWithdrawal` transaction into the canonical
//! withdrawal descriptor.

use crate::{error::WithdrawalError, hash::verify_withdrawal_hash, types::ExtractedWithdrawal};
use alloy_primitives::{Address, TxHash};
use alloy_provider::Provider;
use alloy_rpc_types_eth::Log;
use alloy_sol_types::SolEvent;
use binding::opstack::IL2ToL1MessagePasser::MessagePassed;
use record::WithdrawalDetails;
use std::time::Duration;
use tokio::time::sleep;
use tokio_retry::{strategy::FixedInterval, Retry};
use tracing::{debug, warn};

/// Receipt reads after the first one that came back empty.
const RECEIPT_RETRIES: usize = 2;

/// Find and decode the `MessagePassed` log emitted by `message_passer`.
///
/// Logs with the right topic from any other contract are ignored. The decoded
/// hash is checked against the tuple before it is returned.
pub fn decode_message_passed(
    logs: &[Log],
    message_passer: Address,
) -> Result<Option<WithdrawalDetails>, WithdrawalError> {
    let Some(log) = logs.iter().find(|log| {
        log.inner.address == message_passer
            && log.inner.data.topics().first() == Some(&MessagePassed::SIGNATURE_HASH)
    }) else {
        return Ok(None);
    };

    let event = MessagePassed::decode_log_data(&log.inner.data)
        .map_err(|e| WithdrawalError::missing(format!("MessagePassed field ({e})")))?;

    let details = WithdrawalDetails {
        nonce: event.nonce,
        sender: event.sender,
        target: event.target,
        value: event.value,
        gas_limit: event.gasLimit,
        data: event.data,
        withdrawal_hash: event.withdrawalHash,
    };
    verify_withdrawal_hash(&details)?;

    Ok(Some(details))
}

pub struct EventExtractor<P> {
    provider: P,
    message_passer: Address,
    settle_delay: Duration,
}

impl<P> EventExtractor<P>
where
    P: Provider + Clone,
{
    pub const fn new(provider: P, message_passer: Address, settle_delay: Duration) -> Self {
        Self {
            provider,
            message_passer,
            settle_delay,
        }
    }

    /// Wait out the settle delay, read the receipt and decode the withdrawal.
    pub async fn extract(&self, l2_tx_hash: TxHash) -> eyre::Result<ExtractedWithdrawal> {
        sleep(self.settle_delay).await;

        let strategy = FixedInterval::new(self.settle_delay).take(RECEIPT_RETRIES);
        let receipt = Retry::spawn(strategy, || async {
            self.provider
                .get_transaction_receipt(l2_tx_hash)
                .await
                .map_err(eyre::Report::from)?
                .ok_or_else(|| {
                    warn!(tx_hash = %l2_tx_hash, "Receipt not available yet");
                    eyre::Report::new(WithdrawalError::ReceiptNotFound(l2_tx_hash))
                })
        })
        .await?;

        let l2_block = receipt
            .block_number
            .ok_or_else(|| WithdrawalError::missing("Receipt block number"))?;

        let details = decode_message_passed(receipt.inner.logs(), self.message_passer)?
            .ok_or(WithdrawalError::EventNotFound(l2_tx_hash))?;

        debug!(
            tx_hash = %l2_tx_hash,
            l2_block,
            withdrawal_hash = %details.withdrawal_hash,
            nonce = %details.nonce,
            "Extracted withdrawal"
        );

        Ok(ExtractedWithdrawal { details, l2_block })
    }
}
