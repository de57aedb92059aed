//! Rollup side of the withdrawal pipeline.
//!
//! - [`event`]: decode the `MessagePassed` event of an L2 transaction
//! - [`game`]: wait for a dispute game covering the withdrawal's L2 block
//! - [`proof`]: build the storage proof and output root proof for that game
//! - [`state`]: read proven / finalized status and scan for past withdrawals

pub mod error;
pub mod event;
pub mod game;
pub mod hash;
pub mod proof;
pub mod state;
pub mod types;

pub use error::WithdrawalError;
pub use event::{decode_message_passed, EventExtractor};
pub use game::{covers, FactoryGames, GameLocator, GameSource};
pub use proof::{ProofGenerator, ProviderState, StateSource};
pub use state::WithdrawalStateProvider;
