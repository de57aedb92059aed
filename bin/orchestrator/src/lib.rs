pub mod bridge;
pub mod config;
pub mod driver;
pub mod error;
pub mod inflight;
pub mod metrics;

use crate::config::Config;
use alloy_primitives::TxHash;
pub use bridge::{Bridge, InitiateRequest, OnChainBridge};
use client::{local_signer_fn, remote_signer_fn, signer_address, RemoteSigner};
pub use driver::{Orchestrator, StepOutcome, Trigger};
use record::{JsonFile, RecordKind, RecordMeta, RecordStore, TxKind};
use std::sync::Arc;

/// Open the record collection named by `config`.
pub fn open_store(config: &Config) -> Arc<RecordStore> {
    Arc::new(RecordStore::open(JsonFile::new(
        &config.store_dir,
        &config.namespace,
    )))
}

/// Build an orchestrator over live providers.
///
/// Signing goes through the remote signer when one is configured, otherwise
/// through `private_key`, which must control the configured EOA.
pub fn connect(
    config: &Config,
    private_key: Option<&str>,
) -> eyre::Result<Orchestrator<impl Bridge + 'static>> {
    let network = config.network_config();
    let l1_provider = client::create_provider(&config.l1_rpc_url)?;
    let l2_provider = client::create_provider(&config.l2_rpc_url)?;

    let (l1_signer, l2_signer) = match (&config.remote_signer_url, private_key) {
        (Some(url), _) => (
            remote_signer_fn(
                RemoteSigner::new(url.clone(), config.eoa_address, network.settlement.chain_id),
                l1_provider.clone(),
            ),
            remote_signer_fn(
                RemoteSigner::new(url.clone(), config.eoa_address, network.rollup.chain_id),
                l2_provider.clone(),
            ),
        ),
        (None, Some(key)) => {
            let signer = signer_address(key)?;
            if signer != config.eoa_address {
                eyre::bail!(
                    "Private key controls {signer}, but the configured EOA is {}",
                    config.eoa_address
                );
            }
            (
                local_signer_fn(key, network.settlement.chain_id, l1_provider.clone())?,
                local_signer_fn(key, network.rollup.chain_id, l2_provider.clone())?,
            )
        }
        (None, None) => eyre::bail!("Either remote_signer_url or a private key is required"),
    };

    let bridge = OnChainBridge::new(
        l1_provider,
        l2_provider,
        network,
        l1_signer,
        l2_signer,
        config.eoa_address,
        config.min_l1_balance_wei,
    );

    Ok(Orchestrator::new(open_store(config), bridge, config.eoa_address)
        .with_auto_advance(config.auto_advance))
}

/// Parse one command line of the daemon's stdin into a [`Trigger`].
///
/// `track <l2-hash>`, `advance <id>`, and `<action> <id>` where action is one
/// of `prove`, `resolve-claims`, `resolve-game`, `finalize`.
pub fn parse_trigger(line: &str, meta: &RecordMeta) -> Result<Trigger, String> {
    let mut words = line.split_whitespace();
    let (Some(command), Some(arg), None) = (words.next(), words.next(), words.next()) else {
        return Err(format!("expected `<command> <id>`, got `{}`", line.trim()));
    };
    let id = arg.to_string();

    let kind = match command {
        "track" => {
            let l2_tx_hash: TxHash = arg
                .parse()
                .map_err(|e| format!("invalid transaction hash {arg}: {e}"))?;
            return Ok(Trigger::Track {
                l2_tx_hash,
                meta: meta.clone(),
            });
        }
        "advance" => return Ok(Trigger::Advance(id)),
        "prove" => TxKind::Proof,
        "resolve-claims" => TxKind::ResolveClaims,
        "resolve-game" => TxKind::ResolveGame,
        "finalize" => TxKind::Finalize,
        other => return Err(format!("unknown command `{other}`")),
    };
    Ok(Trigger::Act { id, kind })
}

/// Metadata for records the configured EOA tracks by hash.
pub fn default_meta(config: &Config) -> RecordMeta {
    RecordMeta {
        kind: RecordKind::Withdrawal,
        amount: String::new(),
        token: "ETH".to_string(),
        from_address: config.eoa_address,
    }
}
