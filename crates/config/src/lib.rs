//! Configuration types for the withdrawal pipeline.
//!
//! This crate provides:
//! - Network presets (devnet, Sepolia)
//! - Contract addresses for the settlement and rollup chains
//! - Protocol timing (settle delays, poll cadences, clock and challenge windows)

pub mod network;
pub mod timing;

pub use network::{
    NetworkConfig, NetworkConfigBuilder, NetworkType, RollupConfig, SettlementConfig,
};
pub use timing::Timing;
