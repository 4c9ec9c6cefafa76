//! Venue classification and per-venue swap instruction builders
//!
//! Three structurally different venue shapes sit behind one builder
//! contract:
//! - **curve**: curve-AMM pools addressed by base mint, single instruction
//! - **cpmm**: constant-product pools routed through an aggregator proxy
//! - **book**: order-book-backed AMM markets, three-instruction swaps
//!
//! Dispatch is a single match on the resolved descriptor variant.

use async_trait::async_trait;
use solana_sdk::{instruction::Instruction, pubkey::Pubkey};
use std::sync::Arc;
use tracing::debug;

use crate::errors::{abbreviate, VolumeBotError};
use crate::types::{MarketTarget, Side};

pub mod book;
pub mod cpmm;
pub mod curve;
pub mod pricing;
pub mod source;

pub use book::BookSwapBuilder;
pub use cpmm::CpmmSwapBuilder;
pub use curve::CurveSwapBuilder;
pub use pricing::{BuyAmountEstimator, HashPriceEstimator};
pub use source::{PoolDataSource, SyntheticPoolSource};

/// Curve-AMM swap program
pub const CURVE_SWAP_PROGRAM: Pubkey =
    solana_sdk::pubkey!("PSWAPpZXFHMVKRvYcEyPWkGQR5LQwV9e8WNY9Ssv3qV");

/// Order-book AMM program (v4)
pub const AMM_V4_PROGRAM: Pubkey =
    solana_sdk::pubkey!("675kPX9MHTjS2zt1qfr1NYHuzeLXfQM9H24wFSUt1Mp8");

/// Constant-product pool program
pub const CPMM_PROGRAM: Pubkey =
    solana_sdk::pubkey!("CPMMoo8L3F4NbTegBCKVNunggL7H1ZpdTHKxQB5qKP1C");

/// Fixed authority account referenced by constant-product swaps
pub const CPMM_AUTHORITY: Pubkey =
    solana_sdk::pubkey!("5Q544fKrFoe6tsEbD7S8EmxGTJYAKtTVhAW5Q5pge4j1");

/// Aggregator proxy the constant-product swap is routed through
pub const CPMM_ROUTER_PROGRAM: Pubkey =
    solana_sdk::pubkey!("JUP6LkbZbjS1jKKwapdHNy74zcZ3tLUZoi5QNyVTaV4");

/// Order-book market program backing the book venue
pub const BOOK_MARKET_PROGRAM: Pubkey =
    solana_sdk::pubkey!("srmqPvymJeFKQ4zGQed1GFppgkRHL9kaELCbyksJtPX");

/// The three supported venue shapes
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VenueKind {
    CurveAmm,
    ConstantProductAmm,
    OrderBook,
}

/// Curve-AMM pool descriptor
#[derive(Debug, Clone)]
pub struct CurvePool {
    pub address: Pubkey,
    pub authority: Pubkey,
    pub base_vault: Pubkey,
    pub quote_vault: Pubkey,
    pub base_mint: Pubkey,
    pub quote_mint: Pubkey,
    pub fee_account: Pubkey,
    pub curve_type: u8,
    pub swap_fee_numerator: u64,
    pub swap_fee_denominator: u64,
}

/// Constant-product pool descriptor
#[derive(Debug, Clone)]
pub struct CpmmPool {
    pub id: Pubkey,
    pub config_id: Pubkey,
    pub mint_a: Pubkey,
    pub mint_b: Pubkey,
    pub vault_a: Pubkey,
    pub vault_b: Pubkey,
    pub mint_program_a: Pubkey,
    pub mint_program_b: Pubkey,
    pub observation_id: Pubkey,
}

/// Order-book market descriptor
#[derive(Debug, Clone)]
pub struct BookPool {
    pub id: Pubkey,
    pub base_mint: Pubkey,
    pub quote_mint: Pubkey,
    pub base_vault: Pubkey,
    pub quote_vault: Pubkey,
    pub authority: Pubkey,
    pub open_orders: Pubkey,
    pub target_orders: Pubkey,
    pub market_id: Pubkey,
    pub market_program_id: Pubkey,
    pub market_bids: Pubkey,
    pub market_asks: Pubkey,
    pub market_event_queue: Pubkey,
    pub market_base_vault: Pubkey,
    pub market_quote_vault: Pubkey,
    pub market_authority: Pubkey,
}

/// Resolved venue metadata, immutable once fetched
#[derive(Debug, Clone)]
pub enum VenueDescriptor {
    Curve(CurvePool),
    Cpmm(CpmmPool),
    Book(BookPool),
}

impl VenueDescriptor {
    pub fn kind(&self) -> VenueKind {
        match self {
            Self::Curve(_) => VenueKind::CurveAmm,
            Self::Cpmm(_) => VenueKind::ConstantProductAmm,
            Self::Book(_) => VenueKind::OrderBook,
        }
    }

    /// The traded (non-wrapped-native) mint.
    ///
    /// Constant-product pools where neither slot holds the native mint
    /// default to mint A.
    pub fn non_native_mint(&self) -> Pubkey {
        let native = spl_token::native_mint::id();
        match self {
            Self::Curve(pool) => pool.base_mint,
            Self::Cpmm(pool) => {
                if pool.mint_a == native {
                    pool.mint_b
                } else if pool.mint_b == native {
                    pool.mint_a
                } else {
                    pool.mint_a
                }
            }
            Self::Book(pool) => pool.base_mint,
        }
    }
}

/// Uniform per-venue instruction builder contract.
///
/// `min_output_amount` is a caller-supplied slippage bound; builders do not
/// validate it.
#[async_trait]
pub trait SwapInstructionBuilder: Send + Sync {
    async fn build(
        &self,
        side: Side,
        input_amount: u64,
        min_output_amount: u64,
        descriptor: &VenueDescriptor,
        trader: &Pubkey,
    ) -> Result<Vec<Instruction>, VolumeBotError>;
}

/// Classifies a market target into a venue and fetches its descriptor.
///
/// Pure read: no side effects beyond the data source's own queries.
pub struct VenueResolver {
    source: Arc<dyn PoolDataSource>,
}

impl VenueResolver {
    pub fn new(source: Arc<dyn PoolDataSource>) -> Self {
        Self { source }
    }

    /// Resolve a market target.
    ///
    /// A curve base-mint hint resolves directly as a curve pool. Otherwise
    /// the id is tried as a constant-product pool first, falling back to an
    /// order-book market; if both fail the market is unclassifiable.
    pub async fn resolve(&self, target: &MarketTarget) -> Result<VenueDescriptor, VolumeBotError> {
        match target {
            MarketTarget::CurveBaseMint(mint) => {
                let pool = self.source.fetch_curve_pool(mint).await?;
                Ok(VenueDescriptor::Curve(pool))
            }
            MarketTarget::MarketId(id) => match self.source.fetch_cpmm_pool(id).await {
                Ok(pool) => Ok(VenueDescriptor::Cpmm(pool)),
                Err(cpmm_err) => {
                    debug!(
                        market = %abbreviate(&id.to_string()),
                        %cpmm_err,
                        "Not a constant-product pool, trying order-book"
                    );
                    match self.source.fetch_book_pool(id).await {
                        Ok(pool) => Ok(VenueDescriptor::Book(pool)),
                        Err(book_err) => Err(VolumeBotError::venue_unresolvable(
                            id,
                            format!(
                                "not constant-product ({}) nor order-book ({})",
                                cpmm_err, book_err
                            ),
                        )),
                    }
                }
            },
        }
    }
}
