use crate::{
    hash::verify_withdrawal_hash,
    types::{InitiatedWithdrawal, ProvenWithdrawal, WithdrawalHash},
};
use alloy_provider::Provider;
use alloy_primitives::Address;
use alloy_rpc_types_eth::BlockNumberOrTag;
use binding::opstack::{IL2ToL1MessagePasser, IOptimismPortal};
use record::WithdrawalDetails;
use std::time::Duration;
use tokio_retry::{strategy::ExponentialBackoff, Retry};
use tracing::{debug, error, warn};

/// 500 blocks below the common 10,000 block `eth_getLogs` limit.
const CHUNK_SIZE: u64 = 9_500;

/// On-chain status of withdrawals, read from the portal and the message passer.
pub struct WithdrawalStateProvider<P1, P2> {
    l1_provider: P1,
    l2_provider: P2,
    portal_address: Address,
    message_passer_address: Address,
}

impl<P1, P2> WithdrawalStateProvider<P1, P2>
where
    P1: Provider + Clone,
    P2: Provider + Clone,
{
    pub const fn new(
        l1_provider: P1,
        l2_provider: P2,
        portal_address: Address,
        message_passer_address: Address,
    ) -> Self {
        Self {
            l1_provider,
            l2_provider,
            portal_address,
            message_passer_address,
        }
    }

    pub async fn is_finalized(&self, hash: WithdrawalHash) -> eyre::Result<bool> {
        let portal = IOptimismPortal::new(self.portal_address, &self.l1_provider);
        let finalized = portal.finalizedWithdrawals(hash).call().await?;
        Ok(finalized)
    }

    /// Proof submitted by `prover`, if any.
    pub async fn is_proven(
        &self,
        hash: WithdrawalHash,
        prover: Address,
    ) -> eyre::Result<Option<ProvenWithdrawal>> {
        let portal = IOptimismPortal::new(self.portal_address, &self.l1_provider);
        let proven = portal.provenWithdrawals(hash, prover).call().await?;

        if proven.timestamp.is_zero() {
            Ok(None)
        } else {
            Ok(Some(ProvenWithdrawal {
                output_root: proven.outputRoot,
                timestamp: proven.timestamp.saturating_to(),
                game_index: proven.l2OutputIndex,
            }))
        }
    }

    /// Delay the portal enforces between proving and finalizing.
    pub async fn proof_maturity_delay(&self) -> eyre::Result<Duration> {
        let portal = IOptimismPortal::new(self.portal_address, &self.l1_provider);
        let delay = portal.proofMaturityDelaySeconds().call().await?;
        Ok(Duration::from_secs(delay.saturating_to()))
    }

    /// Withdrawals initiated in the given block range, optionally limited to one sender.
    ///
    /// Both endpoints are resolved to numbers before scanning so every chunk
    /// sees the same snapshot even behind a load balancer.
    pub async fn scan_initiated(
        &self,
        from_block: BlockNumberOrTag,
        to_block: BlockNumberOrTag,
        sender: Option<Address>,
    ) -> eyre::Result<Vec<InitiatedWithdrawal>> {
        let from_block_num = self.resolve_block_number(from_block).await?;
        let to_block_num = self.resolve_block_number(to_block).await?;

        if from_block_num > to_block_num {
            eyre::bail!("from_block ({from_block_num}) must be <= to_block ({to_block_num})");
        }

        debug!(
            from = from_block_num,
            to = to_block_num,
            "Scanning for withdrawals (snapshot taken)"
        );

        let mut found = Vec::new();
        let mut current = from_block_num;
        while current <= to_block_num {
            let chunk_end = current.saturating_add(CHUNK_SIZE - 1).min(to_block_num);
            found.extend(self.scan_chunk_with_retry(current, chunk_end, sender).await?);
            current = chunk_end + 1;
        }

        Ok(found)
    }

    async fn resolve_block_number(&self, block: BlockNumberOrTag) -> eyre::Result<u64> {
        match block {
            BlockNumberOrTag::Number(n) => Ok(n),
            BlockNumberOrTag::Latest => Ok(self.l2_provider.get_block_number().await?),
            BlockNumberOrTag::Earliest => Ok(0),
            _ => Err(eyre::eyre!("Unsupported block tag: {block:?}")),
        }
    }

    /// Exponential backoff: 100ms, 200ms, 400ms, 800ms, 1.6s.
    async fn scan_chunk_with_retry(
        &self,
        from_block: u64,
        to_block: u64,
        sender: Option<Address>,
    ) -> eyre::Result<Vec<InitiatedWithdrawal>> {
        let retry_strategy = ExponentialBackoff::from_millis(100).take(5);

        Retry::spawn(retry_strategy, || async {
            self.scan_chunk(from_block, to_block, sender)
                .await
                .inspect_err(|e| {
                    warn!(
                        from = from_block,
                        to = to_block,
                        error = %e,
                        "Chunk scan failed, will retry"
                    );
                })
        })
        .await
    }

    async fn scan_chunk(
        &self,
        from_block: u64,
        to_block: u64,
        sender: Option<Address>,
    ) -> eyre::Result<Vec<InitiatedWithdrawal>> {
        let contract = IL2ToL1MessagePasser::new(self.message_passer_address, &self.l2_provider);

        let events = contract
            .MessagePassed_filter()
            .from_block(from_block)
            .to_block(to_block)
            .query()
            .await?;

        let mut withdrawals = Vec::new();
        for (event, log) in events {
            if sender.is_some_and(|s| s != event.sender) {
                continue;
            }

            let details = WithdrawalDetails {
                nonce: event.nonce,
                sender: event.sender,
                target: event.target,
                value: event.value,
                gas_limit: event.gasLimit,
                data: event.data,
                withdrawal_hash: event.withdrawalHash,
            };

            // One bad event must not fail the scan.
            if let Err(e) = verify_withdrawal_hash(&details) {
                error!(block = ?log.block_number, error = %e, "Skipping withdrawal");
                continue;
            }

            let (Some(l2_tx_hash), Some(l2_block)) = (log.transaction_hash, log.block_number)
            else {
                warn!(withdrawal_hash = %details.withdrawal_hash, "Log without transaction metadata");
                continue;
            };

            withdrawals.push(InitiatedWithdrawal {
                details,
                l2_block,
                l2_tx_hash,
            });
        }

        Ok(withdrawals)
    }
}
