//! Common types used throughout the application

use serde::{Deserialize, Serialize};
use solana_sdk::pubkey::Pubkey;
use std::time::Duration;

/// Swap direction
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Side {
    /// Quote (SOL) -> base token
    Buy,
    /// Base token -> quote (SOL)
    Sell,
}

/// What a volume run targets: either a curve pool addressed by its base mint,
/// or a market/pool id that still needs venue classification.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MarketTarget {
    /// Curve-AMM pool, addressed by the traded token's mint (resolution hint)
    CurveBaseMint(Pubkey),
    /// Market or pool id of unknown venue kind
    MarketId(Pubkey),
}

impl MarketTarget {
    /// The identifier used for pool lookup and wallet persistence directories
    pub fn id(&self) -> Pubkey {
        match self {
            Self::CurveBaseMint(mint) => *mint,
            Self::MarketId(id) => *id,
        }
    }

    /// Directory-safe name for the per-market wallet store
    pub fn dir_name(&self) -> String {
        self.id().to_string()
    }
}

/// Hard cap on wallets per bundle: 1 funding tx + N swap txs must fit the
/// relay's 5-transaction bundle limit.
pub const MAX_WALLETS_PER_CYCLE: usize = 4;

/// Parameters for one volume cycle
#[derive(Debug, Clone)]
pub struct CycleParams {
    /// Venue target (curve base-mint hint or raw market id)
    pub target: MarketTarget,

    /// Ephemeral wallets per cycle (clamped to [1, 4])
    pub wallet_count: usize,

    /// Minimum random swap amount in lamports
    pub min_amount_lamports: u64,

    /// Maximum random swap amount in lamports
    pub max_amount_lamports: u64,

    /// Base delay between cycles (jitter applied on top)
    pub cycle_delay: Duration,

    /// Relay tip in lamports (0 = no tip transfer)
    pub tip_lamports: u64,

    /// Priority fee in micro-lamports per compute unit
    pub priority_fee_micro_lamports: u64,
}

impl CycleParams {
    /// Clamp parameters to their accepted ranges.
    ///
    /// Wallet count is bounded to [1, 4]; the priority fee to
    /// [1_000, 1_000_000] micro-lamports (the 1-1000 priority scale times
    /// 1000); the amount range is normalized so min <= max.
    pub fn normalized(mut self) -> Self {
        self.wallet_count = self.wallet_count.clamp(1, MAX_WALLETS_PER_CYCLE);
        self.priority_fee_micro_lamports =
            self.priority_fee_micro_lamports.clamp(1_000, 1_000_000);
        if self.min_amount_lamports > self.max_amount_lamports {
            std::mem::swap(&mut self.min_amount_lamports, &mut self.max_amount_lamports);
        }
        self
    }

    /// Draw a random swap amount from the configured range (inclusive)
    pub fn random_amount(&self) -> u64 {
        if self.min_amount_lamports == self.max_amount_lamports {
            return self.min_amount_lamports;
        }
        fastrand::u64(self.min_amount_lamports..=self.max_amount_lamports)
    }
}
