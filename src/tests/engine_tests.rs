//! Orchestrator scenarios: pre-flight gating, per-cycle failure isolation,
//! wallet reclamation, and cancellation

use solana_sdk::pubkey::Pubkey;
use solana_sdk::signature::Keypair;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;

use super::test_helpers::{cpmm_pool, FixedCpmmSource, MockChain, RecordingRelay};
use crate::bundle::{BundleAssembler, BundleOutcome, BundleRelay};
use crate::chain::ChainQuery;
use crate::engine::VolumeEngine;
use crate::ephemeral::{EphemeralWalletManager, WalletRepository};
use crate::errors::VolumeBotError;
use crate::retry::RetryExecutor;
use crate::token_program::TokenProgramResolver;
use crate::types::{CycleParams, MarketTarget};
use crate::venue::{HashPriceEstimator, PoolDataSource, VenueResolver};
use crate::wallet::WalletManager;

fn engine(
    chain: Arc<MockChain>,
    relay: Arc<RecordingRelay>,
    dir: &Path,
    cancel: watch::Receiver<bool>,
) -> (VolumeEngine, Arc<EphemeralWalletManager>) {
    let chain: Arc<dyn ChainQuery> = chain;
    let source: Arc<dyn PoolDataSource> = Arc::new(FixedCpmmSource {
        pool: cpmm_pool(true, spl_token::id()),
    });
    let token_programs = Arc::new(TokenProgramResolver::new(Arc::clone(&chain)));
    let wallets = Arc::new(EphemeralWalletManager::new(
        WalletRepository::new(dir),
        1_200_000,
        10_000,
    ));
    let assembler = BundleAssembler::new(
        Arc::clone(&chain),
        VenueResolver::new(source),
        token_programs,
        Arc::new(HashPriceEstimator::new()),
        Arc::clone(&wallets),
        RetryExecutor::with_cancel(cancel.clone()),
        5,
    );
    let engine = VolumeEngine::new(
        chain,
        relay as Arc<dyn BundleRelay>,
        assembler,
        Arc::clone(&wallets),
        WalletManager::from_keypair(Keypair::new()),
        cancel,
    );
    (engine, wallets)
}

fn params(target: MarketTarget) -> CycleParams {
    CycleParams {
        target,
        wallet_count: 2,
        min_amount_lamports: 10_000_000,
        max_amount_lamports: 20_000_000,
        cycle_delay: Duration::ZERO,
        tip_lamports: 1_000_000,
        priority_fee_micro_lamports: 10_000,
    }
}

/// Wait for spawned result observers to finish their bookkeeping
async fn wait_until<F, Fut>(mut condition: F)
where
    F: FnMut() -> Fut,
    Fut: std::future::Future<Output = bool>,
{
    for _ in 0..200 {
        if condition().await {
            return;
        }
        tokio::time::sleep(Duration::from_millis(5)).await;
    }
    panic!("condition not met within the polling window");
}

#[tokio::test]
async fn test_insufficient_balance_aborts_before_any_cycle() {
    let dir = tempfile::tempdir().expect("tempdir");
    let chain = Arc::new(MockChain::new().with_balance(1_000));
    let relay = Arc::new(RecordingRelay::landed());
    let (_cancel_tx, cancel_rx) = watch::channel(false);
    let (engine, _wallets) = engine(chain, Arc::clone(&relay), dir.path(), cancel_rx);

    let err = engine
        .run(params(MarketTarget::MarketId(Pubkey::new_unique())), 3)
        .await
        .expect_err("pre-flight must fail");

    assert!(matches!(err, VolumeBotError::BalanceInsufficient { .. }));
    assert_eq!(relay.submissions(), 0, "no bundle submitted");
}

#[tokio::test]
async fn test_submission_failures_do_not_stop_the_run() {
    let dir = tempfile::tempdir().expect("tempdir");
    let chain = Arc::new(MockChain::new());
    let relay = Arc::new(RecordingRelay::rejecting());
    let (_cancel_tx, cancel_rx) = watch::channel(false);
    let (engine, _wallets) = engine(chain, Arc::clone(&relay), dir.path(), cancel_rx);

    let outcome = engine
        .run(params(MarketTarget::MarketId(Pubkey::new_unique())), 3)
        .await
        .expect("run finishes despite failures");

    assert_eq!(outcome.cycles_submitted, 0);
    assert_eq!(outcome.cycles_failed, 3, "every cycle failed and was absorbed");
    assert!(!outcome.aborted);
}

#[tokio::test]
async fn test_landed_bundle_retires_cycle_wallets() {
    let dir = tempfile::tempdir().expect("tempdir");
    let chain = Arc::new(MockChain::new());
    let relay = Arc::new(RecordingRelay::landed());
    let (_cancel_tx, cancel_rx) = watch::channel(false);
    let target = MarketTarget::MarketId(Pubkey::new_unique());
    let market = target.dir_name();
    let (engine, wallets) = engine(chain, Arc::clone(&relay), dir.path(), cancel_rx);

    let outcome = engine.run(params(target), 1).await.expect("run");
    assert_eq!(outcome.cycles_submitted, 1);
    assert_eq!(relay.submissions(), 1);

    // The observer marks both swap wallets reclaimed once the bundle lands
    wait_until(|| {
        let wallets = Arc::clone(&wallets);
        let market = market.clone();
        async move {
            wallets
                .list_by_market(&market)
                .await
                .map(|remaining| remaining.is_empty())
                .unwrap_or(false)
        }
    })
    .await;
}

#[tokio::test]
async fn test_unknown_outcome_leaves_wallets_recoverable() {
    let dir = tempfile::tempdir().expect("tempdir");
    let chain = Arc::new(MockChain::new());
    let relay = Arc::new(RecordingRelay::with_outcome(BundleOutcome::Unknown));
    let (_cancel_tx, cancel_rx) = watch::channel(false);
    let target = MarketTarget::MarketId(Pubkey::new_unique());
    let market = target.dir_name();
    let (engine, wallets) = engine(chain, Arc::clone(&relay), dir.path(), cancel_rx);

    engine.run(params(target), 1).await.expect("run");

    // Give the observer a moment, then confirm nothing was retired
    tokio::time::sleep(Duration::from_millis(50)).await;
    let remaining = wallets.list_by_market(&market).await.expect("list");
    assert_eq!(
        remaining.len(),
        2,
        "unreclaimed wallets stay on disk for recovery"
    );
}

#[tokio::test]
async fn test_preexisting_cancellation_aborts_immediately() {
    let dir = tempfile::tempdir().expect("tempdir");
    let chain = Arc::new(MockChain::new());
    let relay = Arc::new(RecordingRelay::landed());
    let (cancel_tx, cancel_rx) = watch::channel(true);
    let (engine, _wallets) = engine(chain, Arc::clone(&relay), dir.path(), cancel_rx);

    let outcome = engine
        .run(params(MarketTarget::MarketId(Pubkey::new_unique())), 5)
        .await
        .expect("run returns");

    assert!(outcome.aborted);
    assert_eq!(outcome.cycles_submitted, 0);
    assert_eq!(relay.submissions(), 0);
    drop(cancel_tx);
}

#[tokio::test]
async fn test_dropped_bundle_counts_as_submitted_cycle() {
    // Submission succeeded; the asynchronous drop is an observation-side
    // failure, not a cycle failure
    let dir = tempfile::tempdir().expect("tempdir");
    let chain = Arc::new(MockChain::new());
    let relay = Arc::new(RecordingRelay::with_outcome(BundleOutcome::Dropped {
        reason: "bundle dropped, no connected leader up soon".to_string(),
    }));
    let (_cancel_tx, cancel_rx) = watch::channel(false);
    let (engine, _wallets) = engine(chain, Arc::clone(&relay), dir.path(), cancel_rx);

    let outcome = engine
        .run(params(MarketTarget::MarketId(Pubkey::new_unique())), 1)
        .await
        .expect("run");

    assert_eq!(outcome.cycles_submitted, 1);
    assert_eq!(outcome.cycles_failed, 0);
}
