//! Bundle assembly scenarios: envelope counts, shared blockhash, swap
//! instruction ordering, and degraded cycles

use solana_sdk::pubkey::Pubkey;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use super::test_helpers::{cpmm_pool, FixedCpmmSource, FlakyCpmmSource, MockChain};
use crate::bundle::{sanity_check_swap_order, BundleAssembler};
use crate::chain::ChainQuery;
use crate::ephemeral::{EphemeralWalletManager, WalletRepository};
use crate::retry::RetryExecutor;
use crate::token_program::TokenProgramResolver;
use crate::types::{CycleParams, MarketTarget};
use crate::venue::{
    HashPriceEstimator, PoolDataSource, SyntheticPoolSource, VenueDescriptor, VenueResolver,
    BuyAmountEstimator, CPMM_ROUTER_PROGRAM, CURVE_SWAP_PROGRAM,
};
use crate::wallet::WalletManager;

fn assembler(
    chain: Arc<MockChain>,
    source: Arc<dyn PoolDataSource>,
    dir: &Path,
) -> (BundleAssembler, Arc<EphemeralWalletManager>) {
    let chain: Arc<dyn ChainQuery> = chain;
    let token_programs = Arc::new(TokenProgramResolver::new(Arc::clone(&chain)));
    let wallets = Arc::new(EphemeralWalletManager::new(
        WalletRepository::new(dir),
        1_200_000,
        10_000,
    ));
    let assembler = BundleAssembler::new(
        chain,
        VenueResolver::new(source),
        token_programs,
        Arc::new(HashPriceEstimator::new()),
        Arc::clone(&wallets),
        RetryExecutor::new(),
        5,
    );
    (assembler, wallets)
}

fn params(target: MarketTarget, wallet_count: usize) -> CycleParams {
    CycleParams {
        target,
        wallet_count,
        min_amount_lamports: 10_000_000,
        max_amount_lamports: 20_000_000,
        cycle_delay: Duration::ZERO,
        tip_lamports: 1_000_000,
        priority_fee_micro_lamports: 10_000,
    }
}

/// Fixed-amount variant so estimator-dependent assertions are deterministic
fn pinned_params(target: MarketTarget, wallet_count: usize) -> CycleParams {
    let mut p = params(target, wallet_count);
    p.min_amount_lamports = 10_000_000;
    p.max_amount_lamports = 10_000_000;
    p
}

#[tokio::test]
async fn test_cpmm_scenario_one_funding_plus_two_swaps() {
    let dir = tempfile::tempdir().expect("tempdir");
    let chain = Arc::new(MockChain::new());
    let source = Arc::new(FixedCpmmSource {
        pool: cpmm_pool(true, spl_token::id()),
    });
    let (assembler, _wallets) = assembler(Arc::clone(&chain), source, dir.path());
    let main = WalletManager::from_keypair(solana_sdk::signature::Keypair::new());

    let bundle = assembler
        .assemble_cycle(&main, &params(MarketTarget::MarketId(Pubkey::new_unique()), 2))
        .await
        .expect("assemble");

    assert_eq!(bundle.envelopes.len(), 3, "1 funding + 2 swap envelopes");
    assert_eq!(bundle.funded_wallets.len(), 2);
    assert_eq!(bundle.swap_wallets.len(), 2);

    // Every envelope carries the cycle's single fetched blockhash
    for envelope in &bundle.envelopes {
        assert_eq!(envelope.blockhash, bundle.blockhash);
        assert_eq!(*envelope.tx.message.recent_blockhash(), bundle.blockhash);
    }
    assert_eq!(bundle.blockhash, chain.blockhash);

    // Funding envelope is paid by the main wallet and references every
    // funded wallet
    let funding = &bundle.envelopes[0];
    assert_eq!(funding.payer, main.pubkey());
    let funding_keys = funding.tx.message.static_account_keys();
    for wallet in &bundle.funded_wallets {
        assert!(funding_keys.contains(wallet));
    }

    // Each swap envelope: paid by its ephemeral wallet, exactly one buy and
    // one sell routed through the proxy
    for (envelope, wallet) in bundle.envelopes[1..].iter().zip(&bundle.swap_wallets) {
        assert_eq!(envelope.payer, *wallet);
        let keys = envelope.tx.message.static_account_keys();
        let router_ixs = envelope
            .tx
            .message
            .instructions()
            .iter()
            .filter(|ix| keys[ix.program_id_index as usize] == CPMM_ROUTER_PROGRAM)
            .count();
        assert_eq!(router_ixs, 2, "one buy and one sell per swap envelope");
    }
}

#[tokio::test]
async fn test_degraded_cycle_excludes_failed_wallet_but_keeps_funding() {
    let dir = tempfile::tempdir().expect("tempdir");
    let chain = Arc::new(MockChain::new());
    // The second wallet's venue resolution fails
    let source = Arc::new(FlakyCpmmSource::new(cpmm_pool(false, spl_token::id()), 2));
    let (assembler, _wallets) = assembler(Arc::clone(&chain), source, dir.path());
    let main = WalletManager::from_keypair(solana_sdk::signature::Keypair::new());

    let bundle = assembler
        .assemble_cycle(&main, &params(MarketTarget::MarketId(Pubkey::new_unique()), 3))
        .await
        .expect("assemble");

    assert_eq!(bundle.funded_wallets.len(), 3, "funding covers all wallets");
    assert_eq!(bundle.swap_wallets.len(), 2, "one wallet excluded");
    assert_eq!(bundle.envelopes.len(), 3, "1 funding + 2 swap envelopes");

    // The excluded wallet's funding transfer is still in the bundle
    let funding_keys = bundle.envelopes[0].tx.message.static_account_keys();
    for wallet in &bundle.funded_wallets {
        assert!(
            funding_keys.contains(wallet),
            "funding envelope references every funded wallet"
        );
    }
}

#[tokio::test]
async fn test_swap_plan_return_amount_and_ordering() {
    let dir = tempfile::tempdir().expect("tempdir");
    let chain = Arc::new(MockChain::new());
    let pool = cpmm_pool(true, spl_token::id());
    let source = Arc::new(FixedCpmmSource { pool: pool.clone() });
    let (assembler, wallets) = assembler(Arc::clone(&chain), source, dir.path());
    let main = WalletManager::from_keypair(solana_sdk::signature::Keypair::new());

    let cycle_wallets = wallets
        .create_for_cycle("ordering-market", 1)
        .await
        .expect("wallets");
    let descriptor = VenueDescriptor::Cpmm(pool);
    let plan = assembler
        .plan_swap_instructions(
            &main.pubkey(),
            &cycle_wallets[0],
            &descriptor,
            &pinned_params(MarketTarget::MarketId(Pubkey::new_unique()), 1),
        )
        .await
        .expect("plan");

    sanity_check_swap_order(&plan).expect("ordering invariant holds");

    // Wrap-native strictly precedes every consumer of the wrapped account
    for (idx, ix) in plan.instructions.iter().enumerate() {
        let references_wsol = ix.accounts.iter().any(|meta| meta.pubkey == plan.wsol_ata);
        let is_creation = ix.program_id == spl_associated_token_account::id();
        if references_wsol && !is_creation && idx != plan.wrap_index {
            assert!(
                idx > plan.wrap_index,
                "instruction {} consumes the wrapped account before funding",
                idx
            );
        }
    }

    // The last instruction returns funding minus the fee reserve
    let last = plan.instructions.last().expect("instructions");
    assert_eq!(last.program_id, solana_sdk::system_program::id());
    let lamports = u64::from_le_bytes(last.data[4..12].try_into().expect("u64"));
    assert_eq!(lamports, 1_190_000);
    assert_eq!(last.accounts[0].pubkey, cycle_wallets[0].pubkey());
    assert_eq!(last.accounts[1].pubkey, main.pubkey());
}

async fn close_instruction_count(owner: Pubkey, pool_program: Pubkey, dir: &Path) -> usize {
    let chain = Arc::new(MockChain::new().with_owner(Some(owner)));
    let pool = cpmm_pool(true, pool_program);
    let source = Arc::new(FixedCpmmSource { pool: pool.clone() });
    let (assembler, wallets) = assembler(chain, source, dir);
    let main = WalletManager::from_keypair(solana_sdk::signature::Keypair::new());

    let cycle_wallets = wallets
        .create_for_cycle("close-market", 1)
        .await
        .expect("wallets");
    let plan = assembler
        .plan_swap_instructions(
            &main.pubkey(),
            &cycle_wallets[0],
            &VenueDescriptor::Cpmm(pool),
            &pinned_params(MarketTarget::MarketId(Pubkey::new_unique()), 1),
        )
        .await
        .expect("plan");

    plan.instructions
        .iter()
        .filter(|ix| ix.program_id == spl_token::id() && ix.data == [9])
        .count()
}

#[tokio::test]
async fn test_token_2022_skips_token_account_close() {
    let dir = tempfile::tempdir().expect("tempdir");

    // Classic mint: both the token account and the wrapped account close
    assert_eq!(
        close_instruction_count(spl_token::id(), spl_token::id(), dir.path()).await,
        2
    );
    // Token-2022 mint: only the wrapped account closes
    assert_eq!(
        close_instruction_count(spl_token_2022::id(), spl_token_2022::id(), dir.path()).await,
        1
    );
}

#[tokio::test]
async fn test_curve_swap_envelope_quotes_buy_with_slippage_bound() {
    let dir = tempfile::tempdir().expect("tempdir");
    let chain = Arc::new(MockChain::new());
    let source = Arc::new(SyntheticPoolSource::new());
    let (assembler, _wallets) = assembler(Arc::clone(&chain), source, dir.path());
    let main = WalletManager::from_keypair(solana_sdk::signature::Keypair::new());

    let base_mint = Pubkey::new_unique();
    let bundle = assembler
        .assemble_cycle(
            &main,
            &pinned_params(MarketTarget::CurveBaseMint(base_mint), 1),
        )
        .await
        .expect("assemble");

    assert_eq!(bundle.envelopes.len(), 2);
    let swap = &bundle.envelopes[1];
    let keys = swap.tx.message.static_account_keys();

    let curve_ixs: Vec<_> = swap
        .tx
        .message
        .instructions()
        .iter()
        .filter(|ix| keys[ix.program_id_index as usize] == CURVE_SWAP_PROGRAM)
        .collect();
    assert_eq!(curve_ixs.len(), 2, "one buy and one sell");

    let buy = curve_ixs
        .iter()
        .find(|ix| ix.data[0] == 0x1f)
        .expect("buy instruction");
    let sell = curve_ixs
        .iter()
        .find(|ix| ix.data[0] == 0x2e)
        .expect("sell instruction");

    let estimate = HashPriceEstimator::new().estimate(10_000_000, &base_mint);
    let buy_amount = u64::from_le_bytes(buy.data[1..9].try_into().expect("u64"));
    let buy_min_out = u64::from_le_bytes(buy.data[9..17].try_into().expect("u64"));
    let sell_min_out = u64::from_le_bytes(sell.data[9..17].try_into().expect("u64"));

    assert_eq!(buy_amount, estimate);
    assert_eq!(buy_min_out, estimate * 95 / 100, "5% slippage bound");
    assert_eq!(sell_min_out, 0, "no minimum on the sell leg");
}

#[tokio::test]
async fn test_blockhash_fetched_once_per_cycle() {
    let dir = tempfile::tempdir().expect("tempdir");
    let chain = Arc::new(MockChain::new());
    let source = Arc::new(FixedCpmmSource {
        pool: cpmm_pool(true, spl_token::id()),
    });
    let (assembler, _wallets) = assembler(Arc::clone(&chain), source, dir.path());
    let main = WalletManager::from_keypair(solana_sdk::signature::Keypair::new());

    assembler
        .assemble_cycle(&main, &params(MarketTarget::MarketId(Pubkey::new_unique()), 3))
        .await
        .expect("assemble");

    assert_eq!(
        chain.blockhash_calls.load(std::sync::atomic::Ordering::SeqCst),
        1,
        "one shared blockhash per cycle"
    );
}
