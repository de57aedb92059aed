//! Dispute game resolution actions.
//!
//! A game is resolved in two transactions: `resolveClaim` settles the claim
//! DAG from the root, then `resolve` records the outcome. Both wait out the
//! game clock first, and both are skipped when the game is already decided.

use crate::{ensure_chain, latest_timestamp, sign_and_send, Action, SignerFn};
use alloy_primitives::{Address, TxHash, U256};
use alloy_provider::Provider;
use binding::opstack::IFaultDisputeGame;
use std::{fmt, time::Duration};
use tokio::time::sleep;
use tracing::info;

/// Margin added on top of the clock so the first call does not race the deadline.
const CLOCK_MARGIN: Duration = Duration::from_secs(2);

/// `GameStatus` of a fault dispute game.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GameStatus {
    InProgress,
    ChallengerWins,
    DefenderWins,
}

impl GameStatus {
    pub const fn is_resolved(self) -> bool {
        !matches!(self, Self::InProgress)
    }
}

impl TryFrom<u8> for GameStatus {
    type Error = eyre::Report;

    fn try_from(value: u8) -> Result<Self, Self::Error> {
        match value {
            0 => Ok(Self::InProgress),
            1 => Ok(Self::ChallengerWins),
            2 => Ok(Self::DefenderWins),
            other => Err(eyre::eyre!("Unknown game status {other}")),
        }
    }
}

impl fmt::Display for GameStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::InProgress => "IN_PROGRESS",
            Self::ChallengerWins => "CHALLENGER_WINS",
            Self::DefenderWins => "DEFENDER_WINS",
        })
    }
}

/// What resolving a game still requires.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResolutionPlan {
    /// Nothing to submit.
    AlreadyResolved(GameStatus),
    /// The claim DAG is empty, `resolve` can be called directly.
    NoClaims,
    /// `resolveClaim(0, n)` settles all `n` claims.
    Claims(u64),
}

/// Input data for resolving a dispute game.
#[derive(Clone, Debug)]
pub struct Resolve {
    pub game_address: Address,
    pub settlement_chain_id: u64,
    /// Clock to wait out after creation. Read from the game when unset.
    pub clock_duration: Option<Duration>,
    pub from: Address,
}

/// Time left on the game clock, including the margin. Zero once elapsed.
pub fn clock_remaining(created_at: u64, clock: Duration, now: u64) -> Duration {
    let ends = created_at.saturating_add(clock.as_secs());
    if now >= ends {
        Duration::ZERO
    } else {
        Duration::from_secs(ends - now) + CLOCK_MARGIN
    }
}

/// Read-side of a dispute game shared by both resolution actions.
struct Game<'a, P> {
    provider: &'a P,
    action: &'a Resolve,
}

impl<P> Game<'_, P>
where
    P: Provider,
{
    async fn status(&self) -> eyre::Result<GameStatus> {
        let game = IFaultDisputeGame::new(self.action.game_address, self.provider);
        GameStatus::try_from(game.status().call().await?)
    }

    async fn wait_for_clock(&self) -> eyre::Result<()> {
        let game = IFaultDisputeGame::new(self.action.game_address, self.provider);
        let created_at: u64 = game.createdAt().call().await?.saturating_to();
        let clock = match self.action.clock_duration {
            Some(clock) => clock,
            None => Duration::from_secs(game.maxClockDuration().call().await?),
        };
        let now = latest_timestamp(self.provider).await?;

        let remaining = clock_remaining(created_at, clock, now);
        if !remaining.is_zero() {
            info!(
                game = %self.action.game_address,
                remaining_secs = remaining.as_secs(),
                "Waiting for game clock"
            );
            sleep(remaining).await;
        }
        Ok(())
    }

    async fn plan(&self) -> eyre::Result<ResolutionPlan> {
        let status = self.status().await?;
        if status.is_resolved() {
            return Ok(ResolutionPlan::AlreadyResolved(status));
        }

        self.wait_for_clock().await?;

        let game = IFaultDisputeGame::new(self.action.game_address, self.provider);
        let claims: u64 = game.claimDataLen().call().await?.saturating_to();
        Ok(if claims == 0 {
            ResolutionPlan::NoClaims
        } else {
            ResolutionPlan::Claims(claims)
        })
    }
}

/// Action resolving every claim of a game, children before parents.
pub struct ResolveClaimsAction<P> {
    provider: P,
    signer: SignerFn,
    action: Resolve,
}

impl<P> ResolveClaimsAction<P>
where
    P: Provider + Clone,
{
    pub fn new(provider: P, signer: SignerFn, action: Resolve) -> Self {
        Self {
            provider,
            signer,
            action,
        }
    }

    const fn game(&self) -> Game<'_, P> {
        Game {
            provider: &self.provider,
            action: &self.action,
        }
    }

    /// Wait out the game clock and report what is left to do.
    pub async fn plan(&self) -> eyre::Result<ResolutionPlan> {
        self.game().plan().await
    }
}

impl<P> Action for ResolveClaimsAction<P>
where
    P: Provider + Clone,
{
    async fn submit(&self) -> eyre::Result<TxHash> {
        let ResolutionPlan::Claims(claims) = self.plan().await? else {
            eyre::bail!("Game {} has no claims to resolve", self.action.game_address)
        };
        ensure_chain(&self.provider, self.action.settlement_chain_id).await?;

        info!(game = %self.action.game_address, claims, "Resolving claims");

        let game = IFaultDisputeGame::new(self.action.game_address, &self.provider);
        let tx_request = game
            .resolveClaim(U256::ZERO, U256::from(claims))
            .into_transaction_request()
            .from(self.action.from);

        sign_and_send(&self.provider, &self.signer, tx_request).await
    }

    fn description(&self) -> String {
        format!("Resolving claims of game {}", self.action.game_address)
    }
}

/// Action recording the outcome of a game whose claims are settled.
pub struct ResolveGameAction<P> {
    provider: P,
    signer: SignerFn,
    action: Resolve,
}

impl<P> ResolveGameAction<P>
where
    P: Provider + Clone,
{
    pub fn new(provider: P, signer: SignerFn, action: Resolve) -> Self {
        Self {
            provider,
            signer,
            action,
        }
    }

    const fn game(&self) -> Game<'_, P> {
        Game {
            provider: &self.provider,
            action: &self.action,
        }
    }

    pub async fn status(&self) -> eyre::Result<GameStatus> {
        self.game().status().await
    }
}

impl<P> Action for ResolveGameAction<P>
where
    P: Provider + Clone,
{
    async fn submit(&self) -> eyre::Result<TxHash> {
        let game = self.game();
        if let ResolutionPlan::AlreadyResolved(status) = game.plan().await? {
            eyre::bail!("Game {} already resolved ({status})", self.action.game_address)
        }
        ensure_chain(&self.provider, self.action.settlement_chain_id).await?;

        info!(game = %self.action.game_address, "Resolving game");

        let contract = IFaultDisputeGame::new(self.action.game_address, &self.provider);
        let tx_request = contract
            .resolve()
            .into_transaction_request()
            .from(self.action.from);

        sign_and_send(&self.provider, &self.signer, tx_request).await
    }

    fn description(&self) -> String {
        format!("Resolving game {}", self.action.game_address)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_utils::{mock_signer, MockProvider};
    use alloy_primitives::address;

    #[test]
    fn test_game_status_from_chain_value() {
        assert_eq!(GameStatus::try_from(0).unwrap(), GameStatus::InProgress);
        assert_eq!(GameStatus::try_from(1).unwrap(), GameStatus::ChallengerWins);
        assert_eq!(GameStatus::try_from(2).unwrap(), GameStatus::DefenderWins);
        assert!(GameStatus::try_from(3).is_err());
        assert!(!GameStatus::InProgress.is_resolved());
        assert!(GameStatus::ChallengerWins.is_resolved());
    }

    #[test]
    fn test_clock_remaining() {
        let clock = Duration::from_secs(30);
        assert_eq!(clock_remaining(1_000, clock, 1_010), Duration::from_secs(22));
        assert_eq!(clock_remaining(1_000, clock, 1_030), Duration::ZERO);
        assert_eq!(clock_remaining(1_000, clock, 5_000), Duration::ZERO);
    }

    #[test]
    fn test_descriptions() {
        let resolve = Resolve {
            game_address: address!("00000000000000000000000000000000000000aa"),
            settlement_chain_id: 1518,
            clock_duration: Some(Duration::from_secs(30)),
            from: address!("5CFFA347b0aE99cc01E5c01714cA5658e54a23D1"),
        };
        let claims = ResolveClaimsAction::new(MockProvider, mock_signer(), resolve.clone());
        let game = ResolveGameAction::new(MockProvider, mock_signer(), resolve);

        assert!(claims.description().starts_with("Resolving claims of game 0x"));
        assert!(game.description().starts_with("Resolving game 0x"));
    }
}
