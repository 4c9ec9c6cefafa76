//! Volume bundle engine for Solana
//!
//! Builds and atomically submits coordinated multi-wallet swap bundles
//! against three venue shapes (curve AMM, constant-product AMM, order-book
//! market) behind one builder contract.

pub mod bundle;
pub mod chain;
pub mod config;
pub mod engine;
pub mod ephemeral;
pub mod errors;
pub mod retry;
pub mod token_program;
pub mod types;
pub mod venue;
pub mod wallet;

// Re-export commonly used types
pub use solana_sdk::{pubkey::Pubkey, signature::Signature};

#[cfg(test)]
mod tests;
