//! Volume cycle orchestrator
//!
//! Drives repeated build -> submit -> observe -> delay cycles. The
//! pre-flight balance check before the first cycle is the only hard abort
//! for a run; every other per-cycle failure is logged and the run proceeds
//! to the next cycle. Result observation is spawned per bundle and not
//! awaited before the next cycle begins.

use std::sync::Arc;
use tokio::sync::watch;
use tracing::{error, info, warn};

use crate::bundle::{AssembledBundle, BundleAssembler, BundleOutcome, BundleRelay};
use crate::chain::ChainQuery;
use crate::ephemeral::EphemeralWalletManager;
use crate::errors::{abbreviate, VolumeBotError};
use crate::retry::{cancellable_sleep, with_jitter};
use crate::types::CycleParams;
use crate::wallet::WalletManager;

/// Summary of one completed or aborted run
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RunOutcome {
    pub cycles_submitted: u32,
    pub cycles_failed: u32,
    pub aborted: bool,
}

/// Orchestrates volume cycles against one market
pub struct VolumeEngine {
    chain: Arc<dyn ChainQuery>,
    relay: Arc<dyn BundleRelay>,
    assembler: BundleAssembler,
    wallets: Arc<EphemeralWalletManager>,
    main_wallet: WalletManager,
    cancel: watch::Receiver<bool>,
}

impl VolumeEngine {
    pub fn new(
        chain: Arc<dyn ChainQuery>,
        relay: Arc<dyn BundleRelay>,
        assembler: BundleAssembler,
        wallets: Arc<EphemeralWalletManager>,
        main_wallet: WalletManager,
        cancel: watch::Receiver<bool>,
    ) -> Self {
        Self {
            chain,
            relay,
            assembler,
            wallets,
            main_wallet,
            cancel,
        }
    }

    /// Run `cycles` volume cycles with the given parameters.
    ///
    /// Fails fast only on the pre-flight balance check; per-cycle errors
    /// are absorbed into the returned counts.
    pub async fn run(&self, params: CycleParams, cycles: u32) -> Result<RunOutcome, VolumeBotError> {
        let params = params.normalized();
        let market = params.target.dir_name();

        self.preflight_balance_check(&params, cycles).await?;
        self.log_estimated_volume(&params, cycles);
        self.wallets
            .audit_unreclaimed(&market, self.chain.as_ref())
            .await;

        let mut outcome = RunOutcome {
            cycles_submitted: 0,
            cycles_failed: 0,
            aborted: false,
        };

        for cycle in 1..=cycles {
            if *self.cancel.borrow() {
                info!("🛑 Cancellation requested, stopping cycle loop");
                outcome.aborted = true;
                break;
            }

            info!(cycle, total = cycles, market = %abbreviate(&market), "🔄 Starting volume cycle");
            match self.run_cycle(&params).await {
                Ok(bundle_id) => {
                    outcome.cycles_submitted += 1;
                    info!(cycle, bundle_id = %bundle_id, "✅ Cycle submitted");
                }
                Err(err) => {
                    outcome.cycles_failed += 1;
                    error!(cycle, category = err.category(), %err, "❌ Cycle failed");
                }
            }

            if cycle < cycles {
                let delay = with_jitter(params.cycle_delay);
                info!(delay_ms = delay.as_millis() as u64, "Waiting before next cycle");
                let mut cancel = self.cancel.clone();
                if cancellable_sleep(delay, Some(&mut cancel)).await {
                    info!("🛑 Cancellation requested during inter-cycle delay");
                    outcome.aborted = true;
                    break;
                }
            }
        }

        info!(
            submitted = outcome.cycles_submitted,
            failed = outcome.cycles_failed,
            aborted = outcome.aborted,
            "🎉 Volume run finished"
        );
        Ok(outcome)
    }

    /// Build and submit one bundle, then spawn its result observer
    async fn run_cycle(&self, params: &CycleParams) -> Result<String, VolumeBotError> {
        let bundle = self.assembler.assemble_cycle(&self.main_wallet, params).await?;
        let bundle_id = self.relay.submit(&bundle.envelopes).await?;
        self.spawn_result_observer(bundle_id.clone(), bundle);
        Ok(bundle_id)
    }

    /// Observe the bundle result off the cycle path.
    ///
    /// A landed bundle retires the cycle's wallets; anything else logs them
    /// as abandoned so funds are never silently lost.
    fn spawn_result_observer(&self, bundle_id: String, bundle: AssembledBundle) {
        let rx = self.relay.watch(bundle_id.clone());
        let wallets = Arc::clone(&self.wallets);

        tokio::spawn(async move {
            let prefixes: Vec<String> = bundle
                .funded_wallets
                .iter()
                .map(|w| abbreviate(&w.to_string()))
                .collect();

            match rx.await {
                Ok(BundleOutcome::Landed {
                    slot,
                    compute_consumed,
                }) => {
                    info!(
                        bundle_id = %bundle_id,
                        slot,
                        compute_consumed = ?compute_consumed,
                        "✅ Bundle landed"
                    );
                    for pubkey in &bundle.swap_wallets {
                        if let Err(err) = wallets.mark_reclaimed(&bundle.market, pubkey).await {
                            warn!(wallet = %abbreviate(&pubkey.to_string()), %err, "Failed to retire reclaimed wallet");
                        }
                    }
                }
                Ok(BundleOutcome::Dropped { reason }) => {
                    let err = VolumeBotError::BundleResult(reason);
                    error!(bundle_id = %bundle_id, %err, wallets = ?prefixes, "❌ Bundle dropped; wallets abandoned");
                }
                Ok(BundleOutcome::Unknown) => {
                    warn!(
                        bundle_id = %bundle_id,
                        wallets = ?prefixes,
                        "Bundle outcome unknown after timeout; wallets treated as abandoned"
                    );
                }
                Err(_) => {
                    warn!(bundle_id = %bundle_id, "Result observer channel closed without an outcome");
                }
            }
        });
    }

    /// The sole hard-fail gate for a run: the main wallet must cover every
    /// cycle's worst-case spend plus tips
    async fn preflight_balance_check(
        &self,
        params: &CycleParams,
        cycles: u32,
    ) -> Result<(), VolumeBotError> {
        let balance = self.chain.balance(&self.main_wallet.pubkey()).await?;

        let per_wallet_max = params.max_amount_lamports + params.max_amount_lamports / 10;
        let need = (params.wallet_count as u128)
            * (cycles as u128)
            * (per_wallet_max as u128
                + self.wallets.funding_lamports() as u128)
            + (params.tip_lamports as u128) * (cycles as u128);
        let need = need.min(u64::MAX as u128) as u64;

        if balance < need {
            return Err(VolumeBotError::BalanceInsufficient {
                have: balance,
                need,
            });
        }
        info!(balance, estimated_cost = need, "💼 Pre-flight balance check passed");
        Ok(())
    }

    /// Notional volume the run is expected to print (both swap legs count)
    fn log_estimated_volume(&self, params: &CycleParams, cycles: u32) {
        let legs = 2u128;
        let min_notional =
            (params.wallet_count as u128) * (cycles as u128) * (params.min_amount_lamports as u128) * legs;
        let max_notional =
            (params.wallet_count as u128) * (cycles as u128) * (params.max_amount_lamports as u128) * legs;
        info!(
            min_notional_lamports = min_notional as u64,
            max_notional_lamports = max_notional as u64,
            wallet_creations = params.wallet_count as u32 * cycles,
            "📊 Estimated volume for this run"
        );
    }
}
