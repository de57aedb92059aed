//! Protocol timing.
//!
//! All durations are whole seconds so they can be written directly in TOML.

use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Delays, cadences and windows used by the withdrawal pipeline.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Timing {
    /// Wait before reading an L2 receipt
    pub receipt_settle_delay: u64,
    /// Cadence of dispute game registry polling
    pub game_poll_interval: u64,
    /// Hard ceiling on waiting for a covering game
    pub game_timeout: u64,
    /// Number of storage proof attempts
    pub proof_attempts: usize,
    /// Pause between storage proof attempts
    pub proof_retry_backoff: u64,
    /// Game clock to wait out before resolving. `None` reads `maxClockDuration()`.
    pub clock_duration: Option<u64>,
    /// Wait between game resolution and finalization.
    /// `None` reads `proofMaturityDelaySeconds()` from the portal.
    pub challenge_window: Option<u64>,
    /// Cadence of gas sufficiency rechecks
    pub gas_poll_interval: u64,
    /// Give up watching a submitted transaction after this long
    pub receipt_timeout: u64,
}

impl Default for Timing {
    fn default() -> Self {
        Self::production()
    }
}

impl Timing {
    /// Short windows used by the devnet.
    pub const fn devnet() -> Self {
        Self {
            receipt_settle_delay: 5,
            game_poll_interval: 10,
            game_timeout: 600,
            proof_attempts: 3,
            proof_retry_backoff: 3,
            clock_duration: Some(30),
            challenge_window: Some(10),
            gas_poll_interval: 5,
            receipt_timeout: 300,
        }
    }

    /// Same cadences as devnet, clock and challenge windows read from chain.
    pub const fn production() -> Self {
        Self {
            clock_duration: None,
            challenge_window: None,
            ..Self::devnet()
        }
    }

    pub const fn receipt_settle_delay(&self) -> Duration {
        Duration::from_secs(self.receipt_settle_delay)
    }

    pub const fn game_poll_interval(&self) -> Duration {
        Duration::from_secs(self.game_poll_interval)
    }

    pub const fn game_timeout(&self) -> Duration {
        Duration::from_secs(self.game_timeout)
    }

    pub const fn proof_retry_backoff(&self) -> Duration {
        Duration::from_secs(self.proof_retry_backoff)
    }

    pub const fn gas_poll_interval(&self) -> Duration {
        Duration::from_secs(self.gas_poll_interval)
    }

    pub const fn receipt_timeout(&self) -> Duration {
        Duration::from_secs(self.receipt_timeout)
    }
}
