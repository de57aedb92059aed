//! Dispute game discovery.
//!
//! A withdrawal can be proven once the factory holds a game whose claimed L2
//! block is at or past the block the withdrawal was included in. Games are
//! created at a steady cadence, so the locator only ever looks at the newest
//! one and waits for the next when it is too old.

use crate::error::WithdrawalError;
use alloy_primitives::{Address, U256};
use alloy_provider::Provider;
use async_trait::async_trait;
use binding::opstack::{IDisputeGameFactory, IFaultDisputeGame};
use record::DisputeGame;
use std::time::Duration;
use tokio::time::{sleep, Instant};
use tracing::{debug, info, warn};

/// Read access to the dispute game registry.
#[async_trait]
pub trait GameSource: Send + Sync {
    async fn game_count(&self) -> eyre::Result<u64>;

    /// Registry entry at `index` together with the game's claim.
    async fn game_at(&self, index: u64) -> eyre::Result<DisputeGame>;
}

/// [`GameSource`] backed by a `DisputeGameFactory` on the settlement chain.
pub struct FactoryGames<P> {
    provider: P,
    factory: Address,
}

impl<P> FactoryGames<P> {
    pub const fn new(provider: P, factory: Address) -> Self {
        Self { provider, factory }
    }
}

#[async_trait]
impl<P> GameSource for FactoryGames<P>
where
    P: Provider + Clone,
{
    async fn game_count(&self) -> eyre::Result<u64> {
        let factory = IDisputeGameFactory::new(self.factory, &self.provider);
        let count = factory.gameCount().call().await?;
        Ok(count.saturating_to())
    }

    async fn game_at(&self, index: u64) -> eyre::Result<DisputeGame> {
        let factory = IDisputeGameFactory::new(self.factory, &self.provider);
        let entry = factory.gameAtIndex(U256::from(index)).call().await?;

        let game = IFaultDisputeGame::new(entry.proxy_, &self.provider);
        let l2_block = game.l2BlockNumber().call().await?;
        let root_claim = game.rootClaim().call().await?;

        Ok(DisputeGame {
            game_index: index,
            game_address: entry.proxy_,
            game_type: entry.gameType_,
            game_l2_block: l2_block.saturating_to(),
            root_claim,
            timestamp: entry.timestamp_,
        })
    }
}

/// Whether `game` commits to a state that includes `l2_block`.
pub const fn covers(game: &DisputeGame, l2_block: u64) -> bool {
    game.game_l2_block >= l2_block
}

/// Polls a [`GameSource`] until a covering game shows up.
pub struct GameLocator<S> {
    source: S,
    poll_interval: Duration,
    timeout: Duration,
}

impl<S> GameLocator<S>
where
    S: GameSource,
{
    pub const fn new(source: S, poll_interval: Duration, timeout: Duration) -> Self {
        Self {
            source,
            poll_interval,
            timeout,
        }
    }

    /// Wait for the first game covering `l2_block`.
    ///
    /// The newest game is inspected whenever the game count changes. The first
    /// covering game is returned as is. Exceeding the timeout is final; callers
    /// do not retry a [`WithdrawalError::GameTimeout`] on their own.
    pub async fn locate(&self, l2_block: u64) -> eyre::Result<DisputeGame> {
        if l2_block == 0 {
            return Err(WithdrawalError::missing("Withdrawal L2 block").into());
        }

        let deadline = Instant::now() + self.timeout;
        let mut last_count = None;

        loop {
            match self.source.game_count().await {
                Ok(count) if count > 0 && last_count != Some(count) => {
                    match self.source.game_at(count - 1).await {
                        Ok(game) if covers(&game, l2_block) => {
                            info!(
                                game_index = game.game_index,
                                game_l2_block = game.game_l2_block,
                                l2_block,
                                "Found covering dispute game"
                            );
                            return Ok(game);
                        }
                        Ok(game) => {
                            debug!(
                                game_index = game.game_index,
                                game_l2_block = game.game_l2_block,
                                l2_block,
                                "Newest game does not cover withdrawal yet"
                            );
                            last_count = Some(count);
                        }
                        // Count is left unrecorded so the same game is read again.
                        Err(e) => warn!(index = count - 1, error = %e, "Failed to read dispute game"),
                    }
                }
                Ok(_) => {}
                Err(e) => warn!(error = %e, "Failed to read dispute game count"),
            }

            let now = Instant::now();
            if now >= deadline {
                return Err(WithdrawalError::GameTimeout { l2_block }.into());
            }
            sleep(self.poll_interval.min(deadline - now)).await;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use alloy_primitives::B256;
    use std::{
        collections::VecDeque,
        sync::{
            atomic::{AtomicUsize, Ordering},
            Mutex,
        },
    };

    /// Replays game counts; the last count repeats forever.
    struct ScriptedGames {
        counts: Mutex<VecDeque<u64>>,
        l2_blocks: Vec<u64>,
        inspected: Mutex<Vec<u64>>,
        failures: AtomicUsize,
    }

    impl ScriptedGames {
        fn new(counts: &[u64], l2_blocks: &[u64]) -> Self {
            Self {
                counts: Mutex::new(counts.iter().copied().collect()),
                l2_blocks: l2_blocks.to_vec(),
                inspected: Mutex::new(Vec::new()),
                failures: AtomicUsize::new(0),
            }
        }

        fn failing_reads(self, n: usize) -> Self {
            self.failures.store(n, Ordering::SeqCst);
            self
        }

        fn inspected(&self) -> Vec<u64> {
            self.inspected.lock().unwrap().clone()
        }
    }

    #[async_trait]
    impl GameSource for ScriptedGames {
        async fn game_count(&self) -> eyre::Result<u64> {
            let mut counts = self.counts.lock().unwrap();
            let count = if counts.len() > 1 {
                counts.pop_front().unwrap()
            } else {
                *counts.front().unwrap()
            };
            Ok(count)
        }

        async fn game_at(&self, index: u64) -> eyre::Result<DisputeGame> {
            self.inspected.lock().unwrap().push(index);
            if self
                .failures
                .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
                .is_ok()
            {
                eyre::bail!("connection reset");
            }
            Ok(DisputeGame {
                game_index: index,
                game_address: Address::repeat_byte(index as u8),
                game_type: 1,
                game_l2_block: self.l2_blocks[index as usize],
                root_claim: B256::repeat_byte(0xcc),
                timestamp: 1_700_000_000 + index,
            })
        }
    }

    fn locator(source: ScriptedGames) -> GameLocator<ScriptedGames> {
        GameLocator::new(source, Duration::from_secs(10), Duration::from_secs(600))
    }

    #[test]
    fn test_covers_is_inclusive() {
        let game = DisputeGame {
            game_index: 0,
            game_address: Address::ZERO,
            game_type: 0,
            game_l2_block: 1000,
            root_claim: B256::ZERO,
            timestamp: 0,
        };
        assert!(covers(&game, 950));
        assert!(covers(&game, 1000));
        assert!(!covers(&game, 1001));
    }

    #[tokio::test(start_paused = true)]
    async fn test_accepts_first_covering_game() {
        let source = ScriptedGames::new(&[3, 3, 4], &[500, 700, 900, 1000, 2000]);
        let locator = locator(source);

        let game = locator.locate(950).await.unwrap();

        assert_eq!(game.game_index, 3);
        assert_eq!(game.game_l2_block, 1000);
        // Index 2 is read once even though the count repeated.
        assert_eq!(locator.source.inspected(), vec![2, 3]);
    }

    #[tokio::test(start_paused = true)]
    async fn test_times_out_without_covering_game() {
        let source = ScriptedGames::new(&[1], &[10]);
        let locator = GameLocator::new(source, Duration::from_secs(10), Duration::from_secs(60));

        let start = Instant::now();
        let err = locator.locate(950).await.unwrap_err();

        assert!(matches!(
            err.downcast_ref::<WithdrawalError>(),
            Some(WithdrawalError::GameTimeout { l2_block: 950 })
        ));
        assert_eq!(start.elapsed(), Duration::from_secs(60));
    }

    #[tokio::test(start_paused = true)]
    async fn test_rereads_game_after_failed_read() {
        let source = ScriptedGames::new(&[4], &[0, 0, 0, 1000]).failing_reads(1);
        let locator = locator(source);

        let game = locator.locate(950).await.unwrap();

        assert_eq!(game.game_index, 3);
        assert_eq!(locator.source.inspected(), vec![3, 3]);
    }

    #[tokio::test(start_paused = true)]
    async fn test_zero_block_is_rejected() {
        let locator = locator(ScriptedGames::new(&[1], &[1000]));
        let err = locator.locate(0).await.unwrap_err();
        assert!(err
            .downcast_ref::<WithdrawalError>()
            .is_some_and(WithdrawalError::is_data_integrity));
    }
}
