//! Withdrawal initiation on L2.

use crate::{sign_and_send, Action, SignerFn};
use alloy_primitives::{utils::format_ether, Address, Bytes, TxHash, U256};
use alloy_provider::Provider;
use binding::opstack::IL2ToL1MessagePasser;
use tracing::info;

/// Withdraw input data.
#[derive(Clone, Debug)]
pub struct Withdraw {
    /// Address of the L2ToL1MessagePasser
    pub contract: Address,
    pub source: Address,
    pub target: Address,
    pub value: U256,
    pub gas_limit: U256,
    pub data: Bytes,
}

pub struct WithdrawAction<P> {
    provider: P,
    signer: SignerFn,
    action: Withdraw,
}

impl<P: Provider + Clone> WithdrawAction<P> {
    pub fn new(provider: P, signer: SignerFn, action: Withdraw) -> Self {
        Self {
            provider,
            signer,
            action,
        }
    }

    fn validate(&self) -> eyre::Result<()> {
        if self.action.value.is_zero() {
            eyre::bail!("Withdrawal value must not be zero");
        }
        if self.action.target.is_zero() {
            eyre::bail!("Withdrawal target must not be zero");
        }
        Ok(())
    }
}

impl<P> Action for WithdrawAction<P>
where
    P: Provider + Clone,
{
    async fn submit(&self) -> eyre::Result<TxHash> {
        self.validate()?;

        let contract = IL2ToL1MessagePasser::new(self.action.contract, &self.provider);
        let tx_request = contract
            .initiateWithdrawal(
                self.action.target,
                self.action.gas_limit,
                self.action.data.clone(),
            )
            .value(self.action.value)
            .into_transaction_request()
            .from(self.action.source);

        let tx_hash = sign_and_send(&self.provider, &self.signer, tx_request).await?;

        info!(
            tx_hash = %tx_hash,
            target = %self.action.target,
            value = %self.action.value,
            "Withdrawal initiated"
        );

        Ok(tx_hash)
    }

    fn description(&self) -> String {
        let eth_amount = format_ether(self.action.value);
        format!("Withdrawing {} ETH to the settlement chain", eth_amount)
    }
}
