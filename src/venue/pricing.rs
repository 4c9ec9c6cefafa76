//! Buy-amount estimation for curve pools
//!
//! The curve venue quotes its buy size up front, so the assembler needs an
//! estimate of base-token output for a given quote input. The estimator is
//! injectable: production use swaps in an implementation backed by live pool
//! reserves without touching the builder.

use sha2::{Digest, Sha256};
use solana_sdk::pubkey::Pubkey;

/// Deterministic, monotonic-in-input estimate of base-token output for a
/// quote-currency input
pub trait BuyAmountEstimator: Send + Sync {
    fn estimate(&self, quote_lamports_in: u64, base_mint: &Pubkey) -> u64;
}

/// Stand-in estimator deriving a fixed per-mint price from a hash of the
/// mint address.
///
/// Output grows monotonically with the input amount for any fixed mint;
/// different mints get different price scales and token decimals (4-8).
#[derive(Debug, Default, Clone, Copy)]
pub struct HashPriceEstimator;

impl HashPriceEstimator {
    pub fn new() -> Self {
        Self
    }
}

impl BuyAmountEstimator for HashPriceEstimator {
    fn estimate(&self, quote_lamports_in: u64, base_mint: &Pubkey) -> u64 {
        let mut hasher = Sha256::new();
        hasher.update(base_mint.as_ref());
        let digest: [u8; 32] = hasher.finalize().into();

        let scale = 1 + (u16::from_le_bytes([digest[0], digest[1]]) as u128 % 10_000);
        let decimals = 4 + (digest[2] % 5) as u32;

        // lamports -> whole SOL -> tokens at the per-mint price -> token base units
        let out = (quote_lamports_in as u128)
            .saturating_mul(scale)
            .saturating_mul(10u128.pow(decimals))
            / 1_000_000_000
            / 100;
        out.min(u64::MAX as u128) as u64
    }
}
