use alloy_primitives::{Address, U256};
use config::{NetworkConfig, NetworkConfigBuilder, NetworkType, Timing};
use record::DEFAULT_NAMESPACE;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Top-level orchestrator configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// L1 RPC endpoint url
    pub l1_rpc_url: String,

    /// L2 RPC endpoint url
    pub l2_rpc_url: String,

    /// Network preset
    #[serde(default = "default_network")]
    pub network: NetworkType,

    /// EOA whose withdrawals are driven, and which pays settlement gas
    pub eoa_address: Address,

    /// Signer proxy url. Without it a private key must be supplied.
    #[serde(default)]
    pub remote_signer_url: Option<String>,

    /// Directory holding the record collection
    #[serde(default = "default_store_dir")]
    pub store_dir: PathBuf,

    /// Record collection name
    #[serde(default = "default_namespace")]
    pub namespace: String,

    /// Settlement balance below which signed steps are held back
    #[serde(default = "default_min_l1_balance")]
    pub min_l1_balance_wei: U256,

    /// Gas limit for withdrawals initiated on L2
    #[serde(default = "default_min_gas_limit")]
    pub min_gas_limit: u64,

    /// Fire the four signed steps without waiting for a user command
    #[serde(default)]
    pub auto_advance: bool,

    /// Prometheus exporter port
    #[serde(default)]
    pub metrics_port: Option<u16>,

    #[serde(default)]
    pub overrides: Overrides,
}

/// Per-deployment overrides applied on top of the network preset.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Overrides {
    pub portal: Option<Address>,
    pub dispute_game_factory: Option<Address>,
    pub settlement_chain_id: Option<u64>,
    pub rollup_chain_id: Option<u64>,
    pub timing: Option<Timing>,
}

const fn default_network() -> NetworkType {
    NetworkType::Sepolia
}

fn default_store_dir() -> PathBuf {
    PathBuf::from("data")
}

fn default_namespace() -> String {
    DEFAULT_NAMESPACE.to_string()
}

fn default_min_l1_balance() -> U256 {
    // 0.001 ETH
    U256::from(1_000_000_000_000_000u64)
}

const fn default_min_gas_limit() -> u64 {
    200_000
}

impl Config {
    pub fn from_file(path: impl AsRef<Path>) -> eyre::Result<Self> {
        let contents = std::fs::read_to_string(path)?;
        let config: Self = toml::from_str(&contents)?;

        Ok(config)
    }

    /// Network preset with the configured overrides applied.
    pub fn network_config(&self) -> NetworkConfig {
        let mut builder = NetworkConfigBuilder::new(self.network);
        if let Some(portal) = self.overrides.portal {
            builder = builder.portal(portal);
        }
        if let Some(factory) = self.overrides.dispute_game_factory {
            builder = builder.dispute_game_factory(factory);
        }
        if let Some(chain_id) = self.overrides.settlement_chain_id {
            builder = builder.settlement_chain_id(chain_id);
        }
        if let Some(chain_id) = self.overrides.rollup_chain_id {
            builder = builder.rollup_chain_id(chain_id);
        }
        if let Some(timing) = &self.overrides.timing {
            builder = builder.timing(timing.clone());
        }
        builder.build()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use alloy_primitives::address;

    const MINIMAL: &str = r#"
        l1_rpc_url = "http://localhost:8545"
        l2_rpc_url = "http://localhost:9545"
        eoa_address = "0x5CFFA347b0aE99cc01E5c01714cA5658e54a23D1"
    "#;

    #[test]
    fn test_minimal_config_uses_defaults() {
        let config: Config = toml::from_str(MINIMAL).unwrap();
        assert_eq!(config.network, NetworkType::Sepolia);
        assert_eq!(config.namespace, "bridge_withdrawal_transactions");
        assert_eq!(config.store_dir, PathBuf::from("data"));
        assert!(!config.auto_advance);
        assert!(config.remote_signer_url.is_none());

        let network = config.network_config();
        assert_eq!(network.settlement.chain_id, 11155111);
        assert_eq!(network.timing.challenge_window, None);
    }

    #[test]
    fn test_overrides_apply() {
        let toml = format!(
            r#"{MINIMAL}
            network = "devnet"

            [overrides]
            portal = "0x00000000000000000000000000000000000000aa"
            settlement_chain_id = 31337

            [overrides.timing]
            challenge_window = 1
            "#
        );
        let config: Config = toml::from_str(&toml).unwrap();
        let network = config.network_config();

        assert_eq!(network.settlement.portal, address!("00000000000000000000000000000000000000aa"));
        assert_eq!(network.settlement.chain_id, 31337);
        assert_eq!(network.rollup.chain_id, 111811);
        assert_eq!(network.timing.challenge_window, Some(1));
        // Fields missing from the override table fall back to production timing
        assert_eq!(network.timing.clock_duration, None);
    }
}
