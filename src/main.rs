//! Volume bundle engine CLI
//!
//! Drives coordinated multi-wallet swap bundles against a target market:
//!
//! - **Venue resolution**: curve AMM by base mint, constant-product or
//!   order-book markets by pool id
//! - **Atomic submission**: one funding transaction plus per-wallet swap
//!   transactions sharing a single blockhash
//! - **Guaranteed reclamation**: every ephemeral wallet is persisted before
//!   use and either drained back to the main wallet or logged as abandoned

use anyhow::{Context, Result};
use clap::Parser;
use solana_sdk::pubkey::Pubkey;
use std::str::FromStr;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

use volumebot::bundle::{BundleAssembler, JitoRelayClient};
use volumebot::chain::RpcChainClient;
use volumebot::config::Config;
use volumebot::engine::VolumeEngine;
use volumebot::ephemeral::{EphemeralWalletManager, WalletRepository};
use volumebot::retry::RetryExecutor;
use volumebot::token_program::TokenProgramResolver;
use volumebot::types::{CycleParams, MarketTarget};
use volumebot::venue::{
    HashPriceEstimator, PoolDataSource, SyntheticPoolSource, VenueResolver,
};
use volumebot::wallet::WalletManager;

/// Command line arguments
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Path to configuration file
    #[arg(short, long, default_value = "config.toml")]
    config: String,

    /// Market or pool id to classify and target
    #[arg(long, conflicts_with = "base_mint")]
    market: Option<String>,

    /// Token mint for curve-AMM mode (skips venue classification)
    #[arg(long)]
    base_mint: Option<String>,

    /// Override the configured cycle count
    #[arg(long)]
    cycles: Option<u32>,

    /// Enable verbose logging
    #[arg(short, long)]
    verbose: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();
    init_logging(args.verbose);

    info!("🚀 Starting volume bundle engine");
    info!("Version: {}", env!("CARGO_PKG_VERSION"));

    info!("📋 Loading configuration from: {}", args.config);
    let config = Config::from_file_with_env(&args.config).context("Failed to load configuration")?;

    let target = parse_target(&args)?;

    info!("🔑 Initializing wallet from: {}", config.wallet.keypair_path);
    let main_wallet =
        WalletManager::from_file(&config.wallet.keypair_path).context("Failed to load wallet")?;
    info!("💼 Wallet address: {}", main_wallet.pubkey());

    let chain = Arc::new(RpcChainClient::new(
        config.rpc.endpoint.clone(),
        Duration::from_secs(config.rpc.timeout_secs),
    ));

    let data_source: Arc<dyn PoolDataSource> = match config.volume.data_source.as_str() {
        "synthetic" => {
            warn!("⚠️ Synthetic pool metadata source active; swap economics are not live");
            Arc::new(SyntheticPoolSource::new())
        }
        other => anyhow::bail!(
            "Unknown data source '{}'; only 'synthetic' is currently wired",
            other
        ),
    };

    let token_programs = Arc::new(if config.volume.strict_token_resolution {
        TokenProgramResolver::strict(chain.clone() as Arc<dyn volumebot::chain::ChainQuery>)
    } else {
        TokenProgramResolver::new(chain.clone() as Arc<dyn volumebot::chain::ChainQuery>)
    });

    let wallets = Arc::new(EphemeralWalletManager::new(
        WalletRepository::new(&config.wallet.keypairs_dir),
        config.volume.funding_lamports,
        config.volume.fee_reserve_lamports,
    ));

    let relay = Arc::new(JitoRelayClient::new(
        config.relay.block_engine_url.clone(),
        Duration::from_millis(config.relay.poll_interval_ms),
        Duration::from_secs(config.relay.result_timeout_secs),
    ));

    let (cancel_tx, cancel_rx) = watch::channel(false);

    let assembler = BundleAssembler::new(
        chain.clone(),
        VenueResolver::new(data_source),
        token_programs,
        Arc::new(HashPriceEstimator::new()),
        Arc::clone(&wallets),
        RetryExecutor::with_cancel(cancel_rx.clone()),
        config.rpc.blockhash_retries,
    );

    let engine = Arc::new(VolumeEngine::new(
        chain,
        relay,
        assembler,
        wallets,
        main_wallet,
        cancel_rx,
    ));

    let params = CycleParams {
        target,
        wallet_count: config.volume.wallet_count,
        min_amount_lamports: config.volume.min_amount_lamports,
        max_amount_lamports: config.volume.max_amount_lamports,
        cycle_delay: Duration::from_secs(config.volume.cycle_delay_secs),
        tip_lamports: config.volume.tip_lamports,
        priority_fee_micro_lamports: config.volume.priority_fee_micro_lamports,
    };
    let cycles = args.cycles.unwrap_or(config.volume.cycles);

    let mut run = {
        let engine = Arc::clone(&engine);
        tokio::spawn(async move { engine.run(params, cycles).await })
    };

    let outcome = tokio::select! {
        result = &mut run => result.context("Engine task panicked")??,
        _ = tokio::signal::ctrl_c() => {
            info!("🛑 Received shutdown signal");
            let _ = cancel_tx.send(true);
            run.await.context("Engine task panicked")??
        }
    };

    info!(
        "👋 Run complete: {} submitted, {} failed{}",
        outcome.cycles_submitted,
        outcome.cycles_failed,
        if outcome.aborted { " (aborted)" } else { "" }
    );
    Ok(())
}

fn parse_target(args: &Args) -> Result<MarketTarget> {
    if let Some(mint) = &args.base_mint {
        let mint = Pubkey::from_str(mint).context("Invalid base mint address")?;
        info!("🎯 Curve-AMM target configured for token: {}", mint);
        return Ok(MarketTarget::CurveBaseMint(mint));
    }
    let market = args
        .market
        .as_deref()
        .context("Either --market or --base-mint is required")?;
    let market = Pubkey::from_str(market).context("Invalid market/pool id")?;
    info!("🎯 Market target configured for pool: {}", market);
    Ok(MarketTarget::MarketId(market))
}

fn init_logging(verbose: bool) {
    let default_directive = if verbose { "volumebot=debug" } else { "volumebot=info" };
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(default_directive));
    tracing_subscriber::fmt().with_env_filter(filter).init();
}
