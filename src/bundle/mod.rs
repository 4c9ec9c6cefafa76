//! Bundle assembly
//!
//! Composes one funding transaction plus N swap transactions into an
//! atomic bundle. Every envelope in a cycle shares a single fetched
//! blockhash; the funding envelope is paid and signed by the main wallet,
//! each swap envelope is paid by its ephemeral wallet and co-signed by the
//! main wallet.

use solana_sdk::{
    compute_budget::ComputeBudgetInstruction,
    hash::Hash,
    instruction::Instruction,
    message::{v0::Message as MessageV0, VersionedMessage},
    pubkey::Pubkey,
    signature::{Keypair, Signer},
    system_instruction,
    transaction::VersionedTransaction,
};
use spl_associated_token_account::{
    get_associated_token_address_with_program_id,
    instruction::create_associated_token_account_idempotent,
};
use std::sync::Arc;
use tracing::{debug, info, warn};

use crate::chain::{BlockhashInfo, ChainQuery};
use crate::ephemeral::{EphemeralWallet, EphemeralWalletManager};
use crate::errors::{abbreviate, VolumeBotError};
use crate::retry::{RetryExecutor, RetryPolicy};
use crate::token_program::TokenProgramResolver;
use crate::types::{CycleParams, Side};
use crate::venue::{
    BookSwapBuilder, BuyAmountEstimator, CpmmSwapBuilder, CurveSwapBuilder,
    SwapInstructionBuilder, VenueDescriptor, VenueResolver,
};
use crate::wallet::WalletManager;

pub mod relay;

pub use relay::{BundleOutcome, BundleRelay, JitoRelayClient, RELAY_TIP_ACCOUNT};

/// Relay-imposed ceiling on transactions per bundle
pub const MAX_BUNDLE_TRANSACTIONS: usize = 5;

/// Extra wrapped-SOL margin on top of the swap amount (10%)
const WRAP_BUFFER_DIVISOR: u64 = 10;

/// A signed transaction plus the metadata the bundle layer tracks for it
pub struct TransactionEnvelope {
    pub payer: Pubkey,
    pub blockhash: Hash,
    pub signers: Vec<Pubkey>,
    pub tx: VersionedTransaction,
}

impl TransactionEnvelope {
    /// Compile and sign a v0 transaction over the shared blockhash
    pub fn sign(
        payer: &Pubkey,
        instructions: &[Instruction],
        blockhash: Hash,
        keypairs: &[&Keypair],
    ) -> Result<Self, VolumeBotError> {
        let message = MessageV0::try_compile(payer, instructions, &[], blockhash)
            .map_err(|e| VolumeBotError::build_failed("assembler", format!("compile: {}", e)))?;
        let signer_refs: Vec<&dyn Signer> = keypairs.iter().map(|k| *k as &dyn Signer).collect();
        let tx = VersionedTransaction::try_new(VersionedMessage::V0(message), &signer_refs)
            .map_err(|e| VolumeBotError::build_failed("assembler", format!("sign: {}", e)))?;
        Ok(Self {
            payer: *payer,
            blockhash,
            signers: keypairs.iter().map(|k| k.pubkey()).collect(),
            tx,
        })
    }
}

/// One cycle's worth of signed envelopes sharing a blockhash
pub struct AssembledBundle {
    pub blockhash: Hash,
    pub last_valid_block_height: u64,
    /// Funding envelope first, then one swap envelope per surviving wallet
    pub envelopes: Vec<TransactionEnvelope>,
    /// Market directory name the cycle's wallets were persisted under
    pub market: String,
    /// Every wallet the funding envelope transfers to
    pub funded_wallets: Vec<Pubkey>,
    /// Wallets that also got a swap envelope (may be fewer when builds fail)
    pub swap_wallets: Vec<Pubkey>,
}

/// Planned swap-envelope instructions before signing
pub struct SwapEnvelopePlan {
    pub instructions: Vec<Instruction>,
    pub wsol_ata: Pubkey,
    pub token_ata: Pubkey,
    /// Index of the wrap-native transfer within `instructions`
    pub wrap_index: usize,
}

/// Verify that account creation and wrapping precede every consumer of the
/// wrapped account (debug/test builds only)
#[cfg(debug_assertions)]
pub fn sanity_check_swap_order(plan: &SwapEnvelopePlan) -> Result<(), VolumeBotError> {
    use solana_sdk::system_program;

    let wrap_ix = plan
        .instructions
        .get(plan.wrap_index)
        .ok_or_else(|| VolumeBotError::build_failed("assembler", "wrap index out of range"))?;
    if wrap_ix.program_id != system_program::id() {
        return Err(VolumeBotError::build_failed(
            "assembler",
            "wrap index does not point at a system transfer",
        ));
    }

    // Everything after the wrap may consume the account; nothing before it
    // (other than its creation) may reference it
    for (idx, ix) in plan.instructions.iter().enumerate().take(plan.wrap_index) {
        let references_wsol = ix.accounts.iter().any(|meta| meta.pubkey == plan.wsol_ata);
        let is_creation = ix.program_id == spl_associated_token_account::id();
        if references_wsol && !is_creation {
            return Err(VolumeBotError::build_failed(
                "assembler",
                format!(
                    "instruction {} consumes the wrapped account before it is funded",
                    idx
                ),
            ));
        }
    }
    Ok(())
}

/// No-op ordering check for release builds
#[cfg(not(debug_assertions))]
#[inline]
pub fn sanity_check_swap_order(_plan: &SwapEnvelopePlan) -> Result<(), VolumeBotError> {
    Ok(())
}

/// Builds complete cycle bundles from resolved venues and fresh wallets
pub struct BundleAssembler {
    chain: Arc<dyn ChainQuery>,
    resolver: VenueResolver,
    token_programs: Arc<TokenProgramResolver>,
    curve: CurveSwapBuilder,
    cpmm: CpmmSwapBuilder,
    book: BookSwapBuilder,
    estimator: Arc<dyn BuyAmountEstimator>,
    wallets: Arc<EphemeralWalletManager>,
    retry: RetryExecutor,
    blockhash_retries: u32,
}

impl BundleAssembler {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        chain: Arc<dyn ChainQuery>,
        resolver: VenueResolver,
        token_programs: Arc<TokenProgramResolver>,
        estimator: Arc<dyn BuyAmountEstimator>,
        wallets: Arc<EphemeralWalletManager>,
        retry: RetryExecutor,
        blockhash_retries: u32,
    ) -> Self {
        let curve = CurveSwapBuilder::new(Arc::clone(&token_programs));
        let book = BookSwapBuilder::new(Arc::clone(&token_programs));
        Self {
            chain,
            resolver,
            token_programs,
            curve,
            cpmm: CpmmSwapBuilder::new(),
            book,
            estimator,
            wallets,
            retry,
            blockhash_retries,
        }
    }

    /// Assemble one cycle: generate and persist wallets, fetch the shared
    /// blockhash, build the funding envelope and per-wallet swap envelopes.
    ///
    /// A wallet whose swap envelope fails to build is excluded from the
    /// swap set but keeps its funding transfer; the cycle continues
    /// degraded rather than aborting.
    pub async fn assemble_cycle(
        &self,
        main: &WalletManager,
        params: &CycleParams,
    ) -> Result<AssembledBundle, VolumeBotError> {
        let market = params.target.dir_name();
        let wallets = self
            .wallets
            .create_for_cycle(&market, params.wallet_count)
            .await?;

        let BlockhashInfo {
            blockhash,
            last_valid_block_height,
        } = self
            .retry
            .run(
                "blockhash fetch",
                &RetryPolicy::with_max_attempts(self.blockhash_retries),
                || {
                    let chain = Arc::clone(&self.chain);
                    async move { chain.latest_blockhash().await }
                },
            )
            .await?;

        let mut envelopes = Vec::with_capacity(1 + wallets.len());

        let funding_ixs = self.funding_instructions(&main.pubkey(), &wallets, params);
        envelopes.push(TransactionEnvelope::sign(
            &main.pubkey(),
            &funding_ixs,
            blockhash,
            &[main.keypair()],
        )?);

        let mut swap_wallets = Vec::with_capacity(wallets.len());
        for wallet in &wallets {
            match self
                .build_swap_envelope(main, wallet, params, blockhash)
                .await
            {
                Ok(envelope) => {
                    swap_wallets.push(wallet.pubkey());
                    envelopes.push(envelope);
                }
                Err(err) => {
                    // The funding transfer for this wallet stays in the
                    // bundle; accepted inefficiency, not a correctness issue
                    warn!(
                        wallet = %wallet.prefix(),
                        market = %abbreviate(&market),
                        %err,
                        "Excluding wallet from swap set"
                    );
                }
            }
        }

        if envelopes.len() > MAX_BUNDLE_TRANSACTIONS {
            return Err(VolumeBotError::build_failed(
                "assembler",
                format!(
                    "bundle of {} transactions exceeds the {}-transaction limit",
                    envelopes.len(),
                    MAX_BUNDLE_TRANSACTIONS
                ),
            ));
        }

        info!(
            market = %abbreviate(&market),
            funded = wallets.len(),
            swaps = swap_wallets.len(),
            "📦 Bundle assembled"
        );

        Ok(AssembledBundle {
            blockhash,
            last_valid_block_height,
            envelopes,
            market,
            funded_wallets: wallets.iter().map(|w| w.pubkey()).collect(),
            swap_wallets,
        })
    }

    /// Funding envelope body: priority fee, one transfer per requested
    /// wallet, then the relay tip when configured
    fn funding_instructions(
        &self,
        main: &Pubkey,
        wallets: &[EphemeralWallet],
        params: &CycleParams,
    ) -> Vec<Instruction> {
        let mut instructions = Vec::with_capacity(wallets.len() + 2);
        instructions.push(ComputeBudgetInstruction::set_compute_unit_price(
            params.priority_fee_micro_lamports,
        ));
        for wallet in wallets {
            instructions.push(self.wallets.funding_instruction(main, wallet));
        }
        if params.tip_lamports > 0 {
            instructions.push(system_instruction::transfer(
                main,
                &RELAY_TIP_ACCOUNT,
                params.tip_lamports,
            ));
        }
        instructions
    }

    async fn build_swap_envelope(
        &self,
        main: &WalletManager,
        wallet: &EphemeralWallet,
        params: &CycleParams,
        blockhash: Hash,
    ) -> Result<TransactionEnvelope, VolumeBotError> {
        let descriptor = self.resolver.resolve(&params.target).await?;
        let plan = self
            .plan_swap_instructions(&main.pubkey(), wallet, &descriptor, params)
            .await?;
        sanity_check_swap_order(&plan)?;

        TransactionEnvelope::sign(
            &wallet.pubkey(),
            &plan.instructions,
            blockhash,
            &[main.keypair(), &wallet.keypair],
        )
    }

    /// Build the ordered swap-envelope instruction sequence for one wallet.
    ///
    /// Order: priority fee, create wrapped-native account, wrap transfer,
    /// sync-native, create destination token account, buy, sell,
    /// conditional token-account close, wrapped-native close, return funds.
    pub async fn plan_swap_instructions(
        &self,
        main: &Pubkey,
        wallet: &EphemeralWallet,
        descriptor: &VenueDescriptor,
        params: &CycleParams,
    ) -> Result<SwapEnvelopePlan, VolumeBotError> {
        let native = spl_token::native_mint::id();
        let token_mint = descriptor.non_native_mint();
        let token_program = self.token_programs.resolve(&token_mint).await?;

        let wsol_ata =
            get_associated_token_address_with_program_id(main, &native, &spl_token::id());
        let token_ata =
            get_associated_token_address_with_program_id(main, &token_mint, &token_program);

        let swap_amount = params.random_amount();
        let wrap_lamports = swap_amount + swap_amount / WRAP_BUFFER_DIVISOR;

        let (buy_ixs, sell_ixs) = self
            .swap_instructions(descriptor, swap_amount, main)
            .await?;

        let mut instructions = Vec::with_capacity(10 + buy_ixs.len() + sell_ixs.len());
        instructions.push(ComputeBudgetInstruction::set_compute_unit_price(
            params.priority_fee_micro_lamports,
        ));
        instructions.push(create_associated_token_account_idempotent(
            main,
            main,
            &native,
            &spl_token::id(),
        ));
        let wrap_index = instructions.len();
        instructions.push(system_instruction::transfer(main, &wsol_ata, wrap_lamports));
        instructions.push(
            spl_token::instruction::sync_native(&spl_token::id(), &wsol_ata)
                .map_err(|e| VolumeBotError::build_failed("assembler", e.to_string()))?,
        );
        instructions.push(create_associated_token_account_idempotent(
            main,
            main,
            &token_mint,
            &token_program,
        ));
        instructions.extend(buy_ixs);
        instructions.extend(sell_ixs);

        if token_program == spl_token_2022::id() {
            // Closing accounts with withheld transfer fees fails; leave it open
            debug!(
                mint = %abbreviate(&token_mint.to_string()),
                "Token-2022 mint, skipping token account close"
            );
        } else {
            instructions.push(
                spl_token::instruction::close_account(&token_program, &token_ata, main, main, &[])
                    .map_err(|e| VolumeBotError::build_failed("assembler", e.to_string()))?,
            );
        }
        instructions.push(
            spl_token::instruction::close_account(&spl_token::id(), &wsol_ata, main, main, &[])
                .map_err(|e| VolumeBotError::build_failed("assembler", e.to_string()))?,
        );
        instructions.push(self.wallets.return_funds_instruction(wallet, main));

        Ok(SwapEnvelopePlan {
            instructions,
            wsol_ata,
            token_ata,
            wrap_index,
        })
    }

    /// Per-venue buy/sell sequences behind the uniform builder contract;
    /// dispatch is this single match
    async fn swap_instructions(
        &self,
        descriptor: &VenueDescriptor,
        swap_amount: u64,
        trader: &Pubkey,
    ) -> Result<(Vec<Instruction>, Vec<Instruction>), VolumeBotError> {
        match descriptor {
            VenueDescriptor::Curve(pool) => {
                let estimate = self.estimator.estimate(swap_amount, &pool.base_mint);
                let min_out = (estimate as u128 * 95 / 100) as u64;
                let buy = self
                    .curve
                    .build(Side::Buy, estimate, min_out, descriptor, trader)
                    .await?;
                let sell = self
                    .curve
                    .build(Side::Sell, estimate, 0, descriptor, trader)
                    .await?;
                Ok((buy, sell))
            }
            VenueDescriptor::Cpmm(_) => {
                let buy = self
                    .cpmm
                    .build(Side::Buy, swap_amount, 0, descriptor, trader)
                    .await?;
                let sell = self
                    .cpmm
                    .build(Side::Sell, swap_amount, 0, descriptor, trader)
                    .await?;
                Ok((buy, sell))
            }
            VenueDescriptor::Book(_) => {
                // One direction per call; the buy legs carry the round trip
                let buy = self
                    .book
                    .build(Side::Buy, swap_amount, 0, descriptor, trader)
                    .await?;
                Ok((buy, Vec::new()))
            }
        }
    }
}
