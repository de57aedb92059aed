//! CLI tool to run individual withdrawal steps.
//!
//! Pipeline commands drive one record a single time and exit:
//! - `track`, `initiate`, `discover`: start tracking withdrawals
//! - `advance`: re-enter the pipeline (extract, locate, generate, confirm)
//! - `prove`, `resolve-claims`, `resolve-game`, `finalize`: the signed steps
//!
//! Housekeeping commands only touch the record store.

use alloy_primitives::{Address, Bytes, TxHash, U256};
use clap::{Parser, Subcommand};
use orchestrator::{config::Config, connect, default_meta, open_store, InitiateRequest};
use record::{WithdrawalRecord, WithdrawalStatus};
use std::time::Duration;
use tracing::info;

const SECS_PER_DAY: u64 = 24 * 60 * 60;

#[derive(Parser)]
#[command(name = "step")]
#[command(about = "Run individual withdrawal steps")]
struct Cli {
    /// Path to the configuration file
    #[arg(short, long, default_value = "config.toml")]
    config: String,

    /// Private key for signing transactions (hex string, with or without 0x prefix)
    #[arg(short = 'k', long, env = "PRIVATE_KEY")]
    private_key: Option<String>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Track the withdrawal initiated by an L2 transaction and drive it
    Track { l2_tx_hash: TxHash },

    /// Initiate a withdrawal on L2
    Initiate {
        /// Value in wei
        #[arg(long)]
        value: U256,
        /// Recipient on L1, the configured EOA by default
        #[arg(long)]
        to: Option<Address>,
        #[arg(long, default_value = "0x")]
        data: Bytes,
    },

    /// Import the EOA's untracked withdrawals from an L2 block onwards
    Discover {
        #[arg(long, default_value_t = 0)]
        from_block: u64,
    },

    /// Re-enter the pipeline for a record
    Advance { id: String },

    Prove { id: String },

    ResolveClaims { id: String },

    ResolveGame { id: String },

    Finalize { id: String },

    /// List records, optionally only those in one status
    List {
        #[arg(long)]
        status: Option<WithdrawalStatus>,
    },

    /// Print a record as JSON
    Show { id: String },

    Delete { id: String },

    /// Drop every record that is not completed, or with `--old-days` only
    /// completed records older than that
    Clear {
        #[arg(long)]
        old_days: Option<u64>,
        /// Drop completed records too
        #[arg(long)]
        all: bool,
    },
}

#[tokio::main]
async fn main() -> eyre::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    let cli = Cli::parse();
    let config = Config::from_file(&cli.config)?;
    let key = cli.private_key.as_deref();

    match cli.command {
        Command::Track { l2_tx_hash } => {
            let orchestrator = connect(&config, key)?;
            let record = orchestrator.track(l2_tx_hash, default_meta(&config))?;
            let outcome = orchestrator.advance(&record.id).await?;
            info!(id = %record.id, %outcome, "Tracked");
        }
        Command::Initiate { value, to, data } => {
            let orchestrator = connect(&config, key)?;
            let request = InitiateRequest {
                target: to.unwrap_or(config.eoa_address),
                value,
                gas_limit: config.min_gas_limit,
                data,
            };
            let record = orchestrator.initiate(&request).await?;
            info!(id = %record.id, "Withdrawal initiated");
        }
        Command::Discover { from_block } => {
            let orchestrator = connect(&config, key)?;
            let imported = orchestrator.discover(from_block).await?;
            info!(count = imported.len(), "Discovery finished");
            for record in &imported {
                print_row(record);
            }
        }
        Command::Advance { id } => {
            let outcome = connect(&config, key)?.advance(&id).await?;
            info!(id = %id, %outcome, "Advance finished");
        }
        Command::Prove { id } => {
            let outcome = connect(&config, key)?.prove(&id).await?;
            info!(id = %id, %outcome, "Prove finished");
        }
        Command::ResolveClaims { id } => {
            let outcome = connect(&config, key)?.resolve_claims(&id).await?;
            info!(id = %id, %outcome, "Resolve claims finished");
        }
        Command::ResolveGame { id } => {
            let outcome = connect(&config, key)?.resolve_game(&id).await?;
            info!(id = %id, %outcome, "Resolve game finished");
        }
        Command::Finalize { id } => {
            let outcome = connect(&config, key)?.finalize(&id).await?;
            info!(id = %id, %outcome, "Finalize finished");
        }
        Command::List { status } => {
            let store = open_store(&config);
            let records = match status {
                Some(status) => store.list_by_status(status),
                None => store.list_all(),
            };
            for record in &records {
                print_row(record);
            }
        }
        Command::Show { id } => {
            let store = open_store(&config);
            let record = store
                .get_by_id(&id)
                .ok_or_else(|| eyre::eyre!("No record {id}"))?;
            println!("{}", serde_json::to_string_pretty(&record)?);
        }
        Command::Delete { id } => {
            open_store(&config).delete(&id)?;
            info!(id = %id, "Deleted");
        }
        Command::Clear { old_days, all } => {
            let store = open_store(&config);
            let removed = match (old_days, all) {
                (Some(days), _) => store.clear_completed_older_than(retention(days)),
                (None, true) => store.clear_all(),
                (None, false) => store.clear_active(),
            };
            info!(removed, "Cleared records");
        }
    }

    Ok(())
}

/// Age past which `clear --old-days` drops a completed record.
fn retention(days: u64) -> Duration {
    Duration::from_secs(days.saturating_mul(SECS_PER_DAY))
}

fn print_row(record: &WithdrawalRecord) {
    println!(
        "{:<68} {:<32} {}",
        record.id,
        record.status.as_str(),
        record.error_message.as_deref().unwrap_or("")
    );
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_retention_does_not_wrap() {
        assert_eq!(retention(0), Duration::ZERO);
        assert_eq!(retention(2), Duration::from_secs(2 * 86_400));
        // Past u32::MAX days a narrowing cast would wrap around to a tiny age.
        let huge = u64::from(u32::MAX) + 2;
        assert_eq!(retention(huge), Duration::from_secs(huge * 86_400));
        assert_eq!(retention(u64::MAX), Duration::from_secs(u64::MAX));
    }
}
