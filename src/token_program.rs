//! Token program resolution with process-lifetime caching
//!
//! Classifies a mint as classic SPL Token or Token-2022 by querying the mint
//! account's owner. Results are cached for the process lifetime with no
//! eviction; once resolved, a mint's owning program never changes.

use dashmap::DashMap;
use solana_sdk::pubkey::Pubkey;
use std::sync::Arc;
use tracing::{debug, warn};

use crate::chain::ChainQuery;
use crate::errors::{abbreviate, VolumeBotError};

/// Resolves which token-standard program owns a mint
pub struct TokenProgramResolver {
    chain: Arc<dyn ChainQuery>,
    cache: DashMap<Pubkey, Pubkey>,
    strict: bool,
}

impl TokenProgramResolver {
    /// Resolver with the default lenient policy (classic-program fallback
    /// on resolution errors)
    pub fn new(chain: Arc<dyn ChainQuery>) -> Self {
        Self {
            chain,
            cache: DashMap::new(),
            strict: false,
        }
    }

    /// Strict mode: resolution errors propagate instead of falling back to
    /// the classic program
    pub fn strict(chain: Arc<dyn ChainQuery>) -> Self {
        Self {
            chain,
            cache: DashMap::new(),
            strict: true,
        }
    }

    /// Resolve the owning token program for `mint`.
    ///
    /// The wrapped-native mint always resolves to the classic program.
    /// Cache hits make no network call.
    pub async fn resolve(&self, mint: &Pubkey) -> Result<Pubkey, VolumeBotError> {
        if *mint == spl_token::native_mint::id() {
            return Ok(spl_token::id());
        }

        if let Some(cached) = self.cache.get(mint) {
            return Ok(*cached.value());
        }

        match self.query_owner(mint).await {
            Ok(program) => {
                self.cache.insert(*mint, program);
                Ok(program)
            }
            Err(err) if self.strict => Err(err),
            Err(err) => {
                warn!(
                    mint = %abbreviate(&mint.to_string()),
                    %err,
                    "Token program resolution failed, falling back to classic program"
                );
                // Fallback is cached too: the cache stays monotonic
                self.cache.insert(*mint, spl_token::id());
                Ok(spl_token::id())
            }
        }
    }

    async fn query_owner(&self, mint: &Pubkey) -> Result<Pubkey, VolumeBotError> {
        let owner = self
            .chain
            .account_owner(mint)
            .await?
            .ok_or_else(|| VolumeBotError::unknown_token_program(mint, "mint account not found"))?;

        if owner == spl_token_2022::id() {
            debug!(mint = %abbreviate(&mint.to_string()), "MINT-2022 detected");
            Ok(spl_token_2022::id())
        } else if owner == spl_token::id() {
            Ok(spl_token::id())
        } else {
            Err(VolumeBotError::unknown_token_program(
                mint,
                format!("unknown owner program {}", abbreviate(&owner.to_string())),
            ))
        }
    }

    /// Number of cached resolutions (test observability)
    pub fn cached_len(&self) -> usize {
        self.cache.len()
    }
}
