//! Network configuration for the withdrawal pipeline.
//!
//! Provides chain-specific addresses and parameters for the settlement chain
//! (L1) and the rollup (L2) of each supported network.

use crate::timing::Timing;
use alloy_primitives::{address, Address};
use serde::{Deserialize, Serialize};

/// Network type.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum NetworkType {
    /// Poseidon devnet with short test clocks.
    Devnet,
    /// Unichain Sepolia on Ethereum Sepolia.
    Sepolia,
}

/// Settlement chain (L1) configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SettlementConfig {
    /// Chain ID
    pub chain_id: u64,
    /// OptimismPortal contract address
    pub portal: Address,
    /// DisputeGameFactory contract address
    pub dispute_game_factory: Address,
    /// Block time in seconds
    pub block_time_secs: u64,
}

impl SettlementConfig {
    /// Devnet settlement chain.
    pub const fn devnet() -> Self {
        Self {
            chain_id: 1518,
            portal: address!("0x8ac124c4dac740eea694d1cab914740c44f6ee8f"),
            dispute_game_factory: address!("0x0d10e01efbe6e47b3d25f83a7a0d9b5e59116936"),
            block_time_secs: 12,
        }
    }

    /// Ethereum Sepolia, settling Unichain Sepolia.
    pub const fn sepolia() -> Self {
        Self {
            chain_id: 11155111,
            portal: address!("0x0d83dab629f0e0F9d36c0Cbc89B69a489f0751bD"),
            dispute_game_factory: address!("0xeff73e5aa3B9AEC32c659Aa3E00444d20a84394b"),
            block_time_secs: 12,
        }
    }
}

/// Rollup (L2) configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RollupConfig {
    /// Chain ID
    pub chain_id: u64,
    /// L2ToL1MessagePasser predeploy
    pub message_passer: Address,
    /// Block time in seconds
    pub block_time_secs: u64,
}

impl RollupConfig {
    /// Devnet rollup.
    pub const fn devnet() -> Self {
        Self {
            chain_id: 111811,
            message_passer: address!("0x4200000000000000000000000000000000000016"),
            block_time_secs: 2,
        }
    }

    /// Unichain Sepolia.
    pub const fn sepolia() -> Self {
        Self {
            chain_id: 1301,
            message_passer: address!("0x4200000000000000000000000000000000000016"),
            block_time_secs: 1,
        }
    }
}

/// Complete network configuration for the withdrawal pipeline.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NetworkConfig {
    /// Network type
    pub network_type: NetworkType,
    /// Settlement chain configuration
    pub settlement: SettlementConfig,
    /// Rollup configuration
    pub rollup: RollupConfig,
    /// Protocol timing
    pub timing: Timing,
}

impl NetworkConfig {
    /// Create devnet configuration.
    pub const fn devnet() -> Self {
        Self {
            network_type: NetworkType::Devnet,
            settlement: SettlementConfig::devnet(),
            rollup: RollupConfig::devnet(),
            timing: Timing::devnet(),
        }
    }

    /// Create Sepolia configuration.
    pub const fn sepolia() -> Self {
        Self {
            network_type: NetworkType::Sepolia,
            settlement: SettlementConfig::sepolia(),
            rollup: RollupConfig::sepolia(),
            timing: Timing::production(),
        }
    }

    /// Create configuration from network type.
    pub const fn from_network_type(network_type: NetworkType) -> Self {
        match network_type {
            NetworkType::Devnet => Self::devnet(),
            NetworkType::Sepolia => Self::sepolia(),
        }
    }
}

/// Builder for custom network configurations.
#[derive(Debug, Clone)]
pub struct NetworkConfigBuilder {
    network_type: NetworkType,
    settlement: SettlementConfig,
    rollup: RollupConfig,
    timing: Timing,
}

impl NetworkConfigBuilder {
    /// Start from the defaults of a network.
    pub const fn new(network_type: NetworkType) -> Self {
        let base = NetworkConfig::from_network_type(network_type);
        Self {
            network_type,
            settlement: base.settlement,
            rollup: base.rollup,
            timing: base.timing,
        }
    }

    /// Start with devnet defaults.
    pub const fn devnet() -> Self {
        Self::new(NetworkType::Devnet)
    }

    /// Start with Sepolia defaults.
    pub const fn sepolia() -> Self {
        Self::new(NetworkType::Sepolia)
    }

    /// Override the OptimismPortal address.
    pub const fn portal(mut self, address: Address) -> Self {
        self.settlement.portal = address;
        self
    }

    /// Override the DisputeGameFactory address.
    pub const fn dispute_game_factory(mut self, address: Address) -> Self {
        self.settlement.dispute_game_factory = address;
        self
    }

    /// Override the settlement chain id.
    pub const fn settlement_chain_id(mut self, chain_id: u64) -> Self {
        self.settlement.chain_id = chain_id;
        self
    }

    /// Override the rollup chain id.
    pub const fn rollup_chain_id(mut self, chain_id: u64) -> Self {
        self.rollup.chain_id = chain_id;
        self
    }

    /// Replace the protocol timing.
    pub const fn timing(mut self, timing: Timing) -> Self {
        self.timing = timing;
        self
    }

    /// Build the network configuration.
    pub const fn build(self) -> NetworkConfig {
        NetworkConfig {
            network_type: self.network_type,
            settlement: self.settlement,
            rollup: self.rollup,
            timing: self.timing,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_devnet_config() {
        let config = NetworkConfig::devnet();
        assert_eq!(config.settlement.chain_id, 1518);
        assert_eq!(config.rollup.chain_id, 111811);
        assert_eq!(config.network_type, NetworkType::Devnet);
        assert_eq!(config.timing.clock_duration, Some(30));
        assert_eq!(config.timing.challenge_window, Some(10));
    }

    #[test]
    fn test_sepolia_config_reads_windows_from_chain() {
        let config = NetworkConfig::sepolia();
        assert_eq!(config.settlement.chain_id, 11155111);
        assert_eq!(config.rollup.chain_id, 1301);
        assert_eq!(config.timing.clock_duration, None);
        assert_eq!(config.timing.challenge_window, None);
    }

    #[test]
    fn test_custom_config_builder() {
        let portal = address!("1111111111111111111111111111111111111111");

        let config = NetworkConfigBuilder::sepolia()
            .portal(portal)
            .timing(Timing::devnet())
            .build();

        assert_eq!(config.settlement.portal, portal);
        assert_eq!(config.network_type, NetworkType::Sepolia);
        assert_eq!(config.timing.clock_duration, Some(30));
    }

    #[test]
    fn test_network_type_from_toml_string() {
        #[derive(Deserialize)]
        struct Wrapper {
            network: NetworkType,
        }

        let parsed: Wrapper = toml::from_str("network = \"devnet\"").unwrap();
        assert_eq!(parsed.network, NetworkType::Devnet);
    }
}
