use booking_relay::{
    api::Server,
    batch::{BatchOrchestrator, CallBuilder, TransactionBatchSubmitter},
    config::Config,
    registry::Registry,
    sink::WebhookSink,
    state::BatchTracker,
    wallet,
};
use clap::Parser;
use std::sync::Arc;
use tracing::info;
use tracing::level_filters::LevelFilter;
use tracing_subscriber::EnvFilter;

#[derive(Debug, Parser)]
#[command(author, version, about = "Relays booking payments to an on-chain wallet", long_about = None)]
struct Args {
    /// Path to the TOML configuration file
    #[arg(long, env = "BOOKING_RELAY_CONFIG", default_value = "config/default.toml")]
    config: String,
}

/// The main entry point for the relay.
///
/// Initializes logging, loads the configuration, wires the wallet provider,
/// result sink and registry into the batch orchestrator, and serves the
/// JSON-RPC API.
#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::builder().with_default_directive(LevelFilter::INFO.into()).from_env_lossy(),
        )
        .init();

    let args = Args::parse();
    let config = Config::load(&args.config)?;
    info!(
        "Relay starting on chain {} (api {}:{}, sponsored: {})",
        config.wallet.chain_id,
        config.api.host,
        config.api.port,
        config.wallet.paymaster_url.is_some()
    );

    // The wallet provider is created once here and handed to the submitter.
    let provider = Arc::new(wallet::connect(&config.wallet.rpc_url)?);
    let submitter = Arc::new(TransactionBatchSubmitter::new(
        provider,
        config.polling.clone(),
        BatchTracker::with_capacity(config.polling.retained_batches),
    ));

    let sink = Arc::new(WebhookSink::new(&config.sink)?);
    let registry = Registry::connect(&config.database.url).await?;
    info!("Batch registry ready at {}", config.database.url);

    let orchestrator = BatchOrchestrator::new(CallBuilder::new(&config.wallet), submitter, sink, registry);

    let server = Server::new(config.api, orchestrator);
    server.start().await?;

    Ok(())
}
