//! Everything the driver needs from the two chains.
//!
//! [`Bridge`] is the seam between the state machine and the network: the
//! driver decides when each step runs, a bridge only performs it.
//! [`OnChainBridge`] wires the pipeline crates to real providers.

use action::{
    finalize::{Finalize, FinalizeAction},
    prove::{Prove, ProveAction},
    resolve::{GameStatus, Resolve, ResolutionPlan, ResolveClaimsAction, ResolveGameAction},
    withdraw::{Withdraw, WithdrawAction},
    SignerFn,
};
use alloy_primitives::{Address, Bytes, TxHash, B256, U256};
use alloy_provider::Provider;
use alloy_rpc_types_eth::BlockNumberOrTag;
use async_trait::async_trait;
use balance::{monitor::BalanceMonitor, GasCheck, Monitor};
use config::NetworkConfig;
use record::{DisputeGame, ProofData, WithdrawalDetails, WithdrawalRecord};
use std::time::Duration;
use withdrawal::{
    types::{ExtractedWithdrawal, InitiatedWithdrawal},
    EventExtractor, FactoryGames, GameLocator, ProofGenerator, ProviderState,
    WithdrawalStateProvider,
};

/// L2 withdrawal the user asked to start.
#[derive(Debug, Clone)]
pub struct InitiateRequest {
    pub target: Address,
    pub value: U256,
    pub gas_limit: u64,
    pub data: Bytes,
}

#[async_trait]
pub trait Bridge: Send + Sync {
    /// Decode the withdrawal initiated by an L2 transaction.
    async fn extract(&self, l2_tx_hash: TxHash) -> eyre::Result<ExtractedWithdrawal>;

    /// Wait for the first dispute game covering `l2_block`.
    async fn locate_game(&self, l2_block: u64) -> eyre::Result<DisputeGame>;

    async fn generate_proof(
        &self,
        withdrawal_hash: B256,
        game: &DisputeGame,
    ) -> eyre::Result<ProofData>;

    /// Settlement balance of the signing account against the configured minimum.
    async fn gas_check(&self) -> eyre::Result<GasCheck>;

    async fn is_proven(&self, withdrawal_hash: B256) -> eyre::Result<bool>;

    async fn submit_proof(&self, record: &WithdrawalRecord) -> eyre::Result<TxHash>;

    /// Wait out the game clock and report what resolving still requires.
    async fn game_plan(&self, game: &DisputeGame) -> eyre::Result<ResolutionPlan>;

    async fn resolve_claims(&self, game: &DisputeGame) -> eyre::Result<TxHash>;

    async fn game_status(&self, game: &DisputeGame) -> eyre::Result<GameStatus>;

    async fn resolve_game(&self, game: &DisputeGame) -> eyre::Result<TxHash>;

    async fn is_finalized(&self, withdrawal_hash: B256) -> eyre::Result<bool>;

    /// Wait required between game resolution and finalization.
    async fn challenge_window(&self) -> eyre::Result<Duration>;

    async fn finalize(&self, details: &WithdrawalDetails) -> eyre::Result<TxHash>;

    /// Watch a settlement chain transaction. `false` means it reverted.
    async fn wait_for_receipt(&self, tx_hash: TxHash) -> eyre::Result<bool>;

    /// Sign and send `initiateWithdrawal` on L2.
    async fn initiate(&self, request: &InitiateRequest) -> eyre::Result<TxHash>;

    /// Withdrawals `sender` initiated from `from_block` up to the latest block.
    async fn scan_initiated(
        &self,
        from_block: u64,
        sender: Address,
    ) -> eyre::Result<Vec<InitiatedWithdrawal>>;
}

pub struct OnChainBridge<P1, P2> {
    l1_provider: P1,
    l2_provider: P2,
    network: NetworkConfig,
    l1_signer: SignerFn,
    l2_signer: SignerFn,
    /// Signs every transaction and pays settlement gas
    eoa: Address,
    min_l1_balance: U256,
}

impl<P1, P2> OnChainBridge<P1, P2>
where
    P1: Provider + Clone + 'static,
    P2: Provider + Clone + 'static,
{
    pub const fn new(
        l1_provider: P1,
        l2_provider: P2,
        network: NetworkConfig,
        l1_signer: SignerFn,
        l2_signer: SignerFn,
        eoa: Address,
        min_l1_balance: U256,
    ) -> Self {
        Self {
            l1_provider,
            l2_provider,
            network,
            l1_signer,
            l2_signer,
            eoa,
            min_l1_balance,
        }
    }

    fn state(&self) -> WithdrawalStateProvider<P1, P2> {
        WithdrawalStateProvider::new(
            self.l1_provider.clone(),
            self.l2_provider.clone(),
            self.network.settlement.portal,
            self.network.rollup.message_passer,
        )
    }

    fn resolve(&self, game: &DisputeGame) -> Resolve {
        Resolve {
            game_address: game.game_address,
            settlement_chain_id: self.network.settlement.chain_id,
            clock_duration: self.network.timing.clock_duration.map(Duration::from_secs),
            from: self.eoa,
        }
    }

    fn resolve_claims_action(&self, game: &DisputeGame) -> ResolveClaimsAction<P1> {
        ResolveClaimsAction::new(
            self.l1_provider.clone(),
            self.l1_signer.clone(),
            self.resolve(game),
        )
    }

    fn resolve_game_action(&self, game: &DisputeGame) -> ResolveGameAction<P1> {
        ResolveGameAction::new(
            self.l1_provider.clone(),
            self.l1_signer.clone(),
            self.resolve(game),
        )
    }
}

#[async_trait]
impl<P1, P2> Bridge for OnChainBridge<P1, P2>
where
    P1: Provider + Clone + 'static,
    P2: Provider + Clone + 'static,
{
    async fn extract(&self, l2_tx_hash: TxHash) -> eyre::Result<ExtractedWithdrawal> {
        EventExtractor::new(
            self.l2_provider.clone(),
            self.network.rollup.message_passer,
            self.network.timing.receipt_settle_delay(),
        )
        .extract(l2_tx_hash)
        .await
    }

    async fn locate_game(&self, l2_block: u64) -> eyre::Result<DisputeGame> {
        let games = FactoryGames::new(
            self.l1_provider.clone(),
            self.network.settlement.dispute_game_factory,
        );
        GameLocator::new(
            games,
            self.network.timing.game_poll_interval(),
            self.network.timing.game_timeout(),
        )
        .locate(l2_block)
        .await
    }

    async fn generate_proof(
        &self,
        withdrawal_hash: B256,
        game: &DisputeGame,
    ) -> eyre::Result<ProofData> {
        let source = ProviderState::new(
            self.l2_provider.clone(),
            self.network.rollup.message_passer,
        );
        ProofGenerator::new(
            source,
            self.network.timing.proof_attempts,
            self.network.timing.proof_retry_backoff(),
        )
        .generate(withdrawal_hash, game)
        .await
    }

    async fn gas_check(&self) -> eyre::Result<GasCheck> {
        BalanceMonitor::new(self.l1_provider.clone())
            .check_gas(self.eoa, self.min_l1_balance)
            .await
    }

    async fn is_proven(&self, withdrawal_hash: B256) -> eyre::Result<bool> {
        Ok(self
            .state()
            .is_proven(withdrawal_hash, self.eoa)
            .await?
            .is_some())
    }

    async fn submit_proof(&self, record: &WithdrawalRecord) -> eyre::Result<TxHash> {
        let prove = Prove::from_record(
            record,
            self.network.settlement.portal,
            self.network.settlement.chain_id,
            self.eoa,
        );
        action::execute(ProveAction::new(
            self.l1_provider.clone(),
            self.l1_signer.clone(),
            prove,
        ))
        .await
    }

    async fn game_plan(&self, game: &DisputeGame) -> eyre::Result<ResolutionPlan> {
        self.resolve_claims_action(game).plan().await
    }

    async fn resolve_claims(&self, game: &DisputeGame) -> eyre::Result<TxHash> {
        action::execute(self.resolve_claims_action(game)).await
    }

    async fn game_status(&self, game: &DisputeGame) -> eyre::Result<GameStatus> {
        self.resolve_game_action(game).status().await
    }

    async fn resolve_game(&self, game: &DisputeGame) -> eyre::Result<TxHash> {
        action::execute(self.resolve_game_action(game)).await
    }

    async fn is_finalized(&self, withdrawal_hash: B256) -> eyre::Result<bool> {
        self.state().is_finalized(withdrawal_hash).await
    }

    async fn challenge_window(&self) -> eyre::Result<Duration> {
        match self.network.timing.challenge_window {
            Some(secs) => Ok(Duration::from_secs(secs)),
            None => self.state().proof_maturity_delay().await,
        }
    }

    async fn finalize(&self, details: &WithdrawalDetails) -> eyre::Result<TxHash> {
        let finalize = Finalize {
            portal_address: self.network.settlement.portal,
            settlement_chain_id: self.network.settlement.chain_id,
            withdrawal: details.clone(),
            from: self.eoa,
        };
        action::execute(FinalizeAction::new(
            self.l1_provider.clone(),
            self.l1_signer.clone(),
            finalize,
        ))
        .await
    }

    async fn wait_for_receipt(&self, tx_hash: TxHash) -> eyre::Result<bool> {
        client::wait_for_receipt(
            &self.l1_provider,
            tx_hash,
            self.network.timing.receipt_timeout(),
        )
        .await
    }

    async fn initiate(&self, request: &InitiateRequest) -> eyre::Result<TxHash> {
        let withdraw = Withdraw {
            contract: self.network.rollup.message_passer,
            source: self.eoa,
            target: request.target,
            value: request.value,
            gas_limit: U256::from(request.gas_limit),
            data: request.data.clone(),
        };
        action::execute(WithdrawAction::new(
            self.l2_provider.clone(),
            self.l2_signer.clone(),
            withdraw,
        ))
        .await
    }

    async fn scan_initiated(
        &self,
        from_block: u64,
        sender: Address,
    ) -> eyre::Result<Vec<InitiatedWithdrawal>> {
        self.state()
            .scan_initiated(
                BlockNumberOrTag::Number(from_block),
                BlockNumberOrTag::Latest,
                Some(sender),
            )
            .await
    }
}
