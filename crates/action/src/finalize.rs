//! Finalize withdrawal action.
//!
//! Once the challenge window after game resolution has passed, the portal
//! executes the withdrawal transaction and releases its value to the target.

use crate::{ensure_chain, sign_and_send, Action, SignerFn};
use alloy_primitives::{Address, TxHash};
use alloy_provider::Provider;
use binding::opstack::IOptimismPortal;
use record::WithdrawalDetails;
use std::time::Duration;
use tracing::info;
use withdrawal::types::WithdrawalHash;

/// Input data for finalizing a withdrawal on L1.
#[derive(Clone, Debug)]
pub struct Finalize {
    /// OptimismPortal contract address on L1
    pub portal_address: Address,
    pub settlement_chain_id: u64,
    /// The withdrawal transaction details
    pub withdrawal: WithdrawalDetails,
    /// Address that will submit the finalize transaction
    pub from: Address,
}

/// Time left before a game resolved at `resolved_at_ms` may be finalized.
pub fn challenge_remaining(resolved_at_ms: u64, window: Duration, now_ms: u64) -> Duration {
    let window_ms = u64::try_from(window.as_millis()).unwrap_or(u64::MAX);
    let ready_at = resolved_at_ms.saturating_add(window_ms);
    Duration::from_millis(ready_at.saturating_sub(now_ms))
}

/// Action to finalize a proven withdrawal on L1.
pub struct FinalizeAction<P> {
    provider: P,
    signer: SignerFn,
    action: Finalize,
}

impl<P> FinalizeAction<P>
where
    P: Provider + Clone,
{
    pub fn new(provider: P, signer: SignerFn, action: Finalize) -> Self {
        Self {
            provider,
            signer,
            action,
        }
    }

    pub const fn withdrawal_hash(&self) -> WithdrawalHash {
        self.action.withdrawal.withdrawal_hash
    }
}

impl<P> Action for FinalizeAction<P>
where
    P: Provider + Clone,
{
    async fn submit(&self) -> eyre::Result<TxHash> {
        ensure_chain(&self.provider, self.action.settlement_chain_id).await?;

        info!(
            withdrawal_hash = %self.withdrawal_hash(),
            "Finalizing withdrawal"
        );

        let portal = IOptimismPortal::new(self.action.portal_address, &self.provider);
        let tx_request = portal
            .finalizeWithdrawalTransaction(self.action.withdrawal.transaction())
            .into_transaction_request()
            .from(self.action.from);

        let tx_hash = sign_and_send(&self.provider, &self.signer, tx_request).await?;

        info!(
            tx_hash = %tx_hash,
            withdrawal_hash = %self.withdrawal_hash(),
            "Finalize transaction sent"
        );

        Ok(tx_hash)
    }

    fn description(&self) -> String {
        format!(
            "Finalizing withdrawal {} on L1",
            self.action.withdrawal.withdrawal_hash
        )
    }
}
