//! Error taxonomy for the volume bundle engine
//!
//! Every failure surfaced to the orchestrator goes through `VolumeBotError`.
//! Messages carry market/wallet prefixes and attempt counts, never secret key
//! material.

use thiserror::Error;

/// Error type covering the bundle construction and submission lifecycle
#[derive(Error, Debug)]
pub enum VolumeBotError {
    /// Market identifier could not be classified as any known venue kind
    #[error("Venue resolution failed for market {market}: {reason}")]
    VenueResolution {
        /// Market id prefix (never the full secret context)
        market: String,
        /// Why classification failed
        reason: String,
    },

    /// Mint account owner is not a known token-standard program
    ///
    /// Recovered by default via classic-program fallback; propagated only in
    /// strict mode.
    #[error("Token program resolution failed for mint {mint}: {reason}")]
    TokenProgramResolution {
        /// Mint address prefix
        mint: String,
        /// Underlying cause
        reason: String,
    },

    /// A venue builder could not produce its instruction sequence
    #[error("Instruction build error (venue={venue}): {reason}")]
    InstructionBuild {
        /// Which venue builder failed
        venue: &'static str,
        /// Detailed reason
        reason: String,
    },

    /// Pre-flight balance check failed; fatal for the whole run
    #[error("Insufficient balance: have {have} lamports, need {need} lamports")]
    BalanceInsufficient {
        /// Current main-wallet balance
        have: u64,
        /// Estimated cost of the full run
        need: u64,
    },

    /// All retry attempts exhausted; wraps the last underlying error
    #[error("{operation} failed after {attempts} attempts: {source}")]
    RetryExhausted {
        /// Operation name supplied to the retry executor
        operation: String,
        /// How many attempts were made
        attempts: u32,
        /// The last error observed
        #[source]
        source: Box<VolumeBotError>,
    },

    /// The relay rejected the bundle at submission time
    #[error("Bundle submission failed: {0}")]
    BundleSubmission(String),

    /// Asynchronous bundle-result failure (e.g. dropped with no leader)
    #[error("Bundle result error: {0}")]
    BundleResult(String),

    /// Ephemeral wallet could not be persisted or read back
    #[error("Wallet persistence error: {0}")]
    WalletPersistence(String),

    /// RPC communication failure
    #[error("RPC error: {0}")]
    Rpc(String),

    /// Invalid configuration or parameter set
    #[error("Configuration error: {0}")]
    Configuration(String),
}

impl VolumeBotError {
    /// Check if this error is potentially retryable
    ///
    /// Returns `true` if retrying the operation might succeed,
    /// `false` if the error is fatal or non-retryable.
    pub fn is_retryable(&self) -> bool {
        match self {
            Self::Rpc(_) => true,
            Self::BundleSubmission(_) => true,
            Self::BundleResult(_) => true,

            Self::VenueResolution { .. } => false,
            Self::TokenProgramResolution { .. } => false,
            Self::InstructionBuild { .. } => false,
            Self::BalanceInsufficient { .. } => false,
            Self::RetryExhausted { .. } => false,
            Self::WalletPersistence(_) => false,
            Self::Configuration(_) => false,
        }
    }

    /// Get the error category for metrics and log fields
    pub fn category(&self) -> &'static str {
        match self {
            Self::VenueResolution { .. } => "venue",
            Self::TokenProgramResolution { .. } => "token_program",
            Self::InstructionBuild { .. } => "instruction",
            Self::BalanceInsufficient { .. } => "balance",
            Self::RetryExhausted { .. } => "retry",
            Self::BundleSubmission(_) => "submission",
            Self::BundleResult(_) => "result",
            Self::WalletPersistence(_) => "persistence",
            Self::Rpc(_) => "rpc",
            Self::Configuration(_) => "config",
        }
    }
}

// Convenience constructors for common scenarios
impl VolumeBotError {
    /// Venue resolution failure for a market id, abbreviating the id
    pub fn venue_unresolvable(market: impl std::fmt::Display, reason: impl Into<String>) -> Self {
        Self::VenueResolution {
            market: abbreviate(&market.to_string()),
            reason: reason.into(),
        }
    }

    /// Token program resolution failure for a mint, abbreviating the address
    pub fn unknown_token_program(mint: impl std::fmt::Display, reason: impl Into<String>) -> Self {
        Self::TokenProgramResolution {
            mint: abbreviate(&mint.to_string()),
            reason: reason.into(),
        }
    }

    /// Instruction build failure for a named venue
    pub fn build_failed(venue: &'static str, reason: impl Into<String>) -> Self {
        Self::InstructionBuild {
            venue,
            reason: reason.into(),
        }
    }

    /// RPC failure from any underlying client error
    pub fn rpc(err: impl std::fmt::Display) -> Self {
        Self::Rpc(err.to_string())
    }
}

/// Shorten an address-like string to `prefix...suffix` for log-safe display
pub fn abbreviate(addr: &str) -> String {
    if addr.len() <= 12 {
        addr.to_string()
    } else {
        format!("{}...{}", &addr[..6], &addr[addr.len() - 4..])
    }
}
