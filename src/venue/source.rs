//! Pool metadata sources
//!
//! Venue descriptors come from a `PoolDataSource`. The synthetic
//! implementation below derives deterministic pool metadata from the market
//! identifier; it exists for dry runs and tests and is selected explicitly
//! in configuration. A production deployment implements this trait with a
//! real on-chain account decoder.

use async_trait::async_trait;
use sha2::{Digest, Sha256};
use solana_sdk::pubkey::Pubkey;

use super::{BookPool, CpmmPool, CurvePool, BOOK_MARKET_PROGRAM};
use crate::errors::VolumeBotError;

/// Source of venue descriptors for the resolver
#[async_trait]
pub trait PoolDataSource: Send + Sync {
    /// Fetch a curve pool addressed by its base mint
    async fn fetch_curve_pool(&self, base_mint: &Pubkey) -> Result<CurvePool, VolumeBotError>;

    /// Fetch a constant-product pool; errors when the id is not one
    async fn fetch_cpmm_pool(&self, market_id: &Pubkey) -> Result<CpmmPool, VolumeBotError>;

    /// Fetch an order-book market; errors when the id is not one
    async fn fetch_book_pool(&self, market_id: &Pubkey) -> Result<BookPool, VolumeBotError>;
}

fn seed_digest(seed: &str) -> [u8; 32] {
    let mut hasher = Sha256::new();
    hasher.update(seed.as_bytes());
    hasher.finalize().into()
}

fn derived_key(seed: &str, index: u8) -> Pubkey {
    let mut hasher = Sha256::new();
    hasher.update(seed.as_bytes());
    hasher.update([index]);
    let digest: [u8; 32] = hasher.finalize().into();
    Pubkey::new_from_array(digest)
}

/// Deterministic pool metadata derived from the market identifier.
///
/// Market ids are hash-classified between the constant-product and
/// order-book shapes so both resolver paths occur in practice. The same id
/// always yields the same descriptor.
#[derive(Debug, Default, Clone, Copy)]
pub struct SyntheticPoolSource;

impl SyntheticPoolSource {
    pub fn new() -> Self {
        Self
    }

    fn classifies_as_cpmm(market_id: &Pubkey) -> bool {
        let digest = seed_digest(&format!("venue-class:{}", market_id));
        digest[0] % 2 == 0
    }
}

#[async_trait]
impl PoolDataSource for SyntheticPoolSource {
    async fn fetch_curve_pool(&self, base_mint: &Pubkey) -> Result<CurvePool, VolumeBotError> {
        let seed = format!("curve:{}:v1", base_mint);
        Ok(CurvePool {
            address: derived_key(&seed, 0),
            authority: derived_key(&seed, 1),
            base_vault: derived_key(&seed, 2),
            quote_vault: derived_key(&seed, 3),
            base_mint: *base_mint,
            quote_mint: spl_token::native_mint::id(),
            fee_account: derived_key(&seed, 4),
            curve_type: 0,
            swap_fee_numerator: 25,
            swap_fee_denominator: 10_000,
        })
    }

    async fn fetch_cpmm_pool(&self, market_id: &Pubkey) -> Result<CpmmPool, VolumeBotError> {
        if !Self::classifies_as_cpmm(market_id) {
            return Err(VolumeBotError::venue_unresolvable(
                market_id,
                "account layout does not match a constant-product pool",
            ));
        }

        let seed = format!("cpmm:{}:v1", market_id);
        let digest = seed_digest(&seed);
        let native = spl_token::native_mint::id();
        let token_mint = derived_key(&seed, 10);
        // Which slot holds the native mint, and which token standard the
        // traded mint uses, both follow the seed hash
        let a_is_native = digest[1] % 2 == 0;
        let token_program = if digest[2] % 4 == 0 {
            spl_token_2022::id()
        } else {
            spl_token::id()
        };

        let (mint_a, mint_b, mint_program_a, mint_program_b) = if a_is_native {
            (native, token_mint, spl_token::id(), token_program)
        } else {
            (token_mint, native, token_program, spl_token::id())
        };

        Ok(CpmmPool {
            id: *market_id,
            config_id: derived_key(&seed, 0),
            mint_a,
            mint_b,
            vault_a: derived_key(&seed, 1),
            vault_b: derived_key(&seed, 2),
            mint_program_a,
            mint_program_b,
            observation_id: derived_key(&seed, 3),
        })
    }

    async fn fetch_book_pool(&self, market_id: &Pubkey) -> Result<BookPool, VolumeBotError> {
        if Self::classifies_as_cpmm(market_id) {
            return Err(VolumeBotError::venue_unresolvable(
                market_id,
                "id belongs to a constant-product pool, not an order-book market",
            ));
        }

        let seed = format!("book:{}:v1", market_id);
        Ok(BookPool {
            id: derived_key(&seed, 0),
            base_mint: derived_key(&seed, 1),
            quote_mint: spl_token::native_mint::id(),
            base_vault: derived_key(&seed, 2),
            quote_vault: derived_key(&seed, 3),
            authority: derived_key(&seed, 4),
            open_orders: derived_key(&seed, 5),
            target_orders: derived_key(&seed, 6),
            market_id: *market_id,
            market_program_id: BOOK_MARKET_PROGRAM,
            market_bids: derived_key(&seed, 7),
            market_asks: derived_key(&seed, 8),
            market_event_queue: derived_key(&seed, 9),
            market_base_vault: derived_key(&seed, 10),
            market_quote_vault: derived_key(&seed, 11),
            market_authority: derived_key(&seed, 12),
        })
    }
}
