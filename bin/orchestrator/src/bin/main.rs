use clap::Parser;
use orchestrator::{config::Config, connect, default_meta, metrics, parse_trigger, Trigger};
use std::sync::Arc;
use tokio::{
    io::{AsyncBufReadExt, BufReader},
    sync::mpsc,
};
use tracing::{info, warn};

#[derive(Parser)]
#[command(name = "orchestrator")]
#[command(about = "Drive L2 to L1 withdrawals through prove, resolve and finalize")]
struct Cli {
    /// Path to the configuration file
    #[arg(short, long, default_value = "config.toml")]
    config: String,

    /// Private key for signing transactions, when no remote signer is configured
    #[arg(short = 'k', long, env = "PRIVATE_KEY")]
    private_key: Option<String>,

    /// Fire the signed steps without waiting for a command
    #[arg(long)]
    auto_advance: bool,
}

#[tokio::main]
async fn main() -> eyre::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    info!("Starting Orchestrator");

    let cli = Cli::parse();
    let mut config = Config::from_file(&cli.config)?;
    if cli.auto_advance {
        config.auto_advance = true;
    }
    let network = config.network_config();

    info!("Loaded config:");
    info!("  Network: {:?}", config.network);
    info!("  L1 RPC URL: {}", config.l1_rpc_url);
    info!("  L2 RPC URL: {}", config.l2_rpc_url);
    info!("  L1 Portal: {}", network.settlement.portal);
    info!("  Dispute game factory: {}", network.settlement.dispute_game_factory);
    info!("  EOA: {}", config.eoa_address);
    info!("  Store: {}/{}.json", config.store_dir.display(), config.namespace);

    if let Some(port) = config.metrics_port {
        metrics::install_prometheus_exporter(port)?;
        info!(port, "Prometheus exporter listening");
    }

    let orchestrator = Arc::new(connect(&config, cli.private_key.as_deref())?);
    info!(
        active = orchestrator.resumable().len(),
        "Resuming active withdrawals"
    );

    // Commands on stdin stand in for the UI's action buttons.
    let (triggers, rx) = mpsc::channel::<Trigger>(64);
    let meta = default_meta(&config);
    tokio::spawn(async move {
        let mut lines = BufReader::new(tokio::io::stdin()).lines();
        while let Ok(Some(line)) = lines.next_line().await {
            if line.trim().is_empty() {
                continue;
            }
            match parse_trigger(&line, &meta) {
                Ok(trigger) => {
                    if triggers.send(trigger).await.is_err() {
                        break;
                    }
                }
                Err(e) => warn!(error = %e, "Ignoring command"),
            }
        }
    });

    let shutdown = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            warn!(error = %e, "Failed to listen for ctrl-c");
            std::future::pending::<()>().await;
        }
    };

    orchestrator
        .run(rx, network.timing.gas_poll_interval(), shutdown)
        .await
}
