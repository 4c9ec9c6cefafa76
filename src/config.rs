//! Configuration module for the volume bundle engine
//!
//! This module handles all configuration loading from TOML files,
//! environment variables, and provides structured configuration types.

use serde::{Deserialize, Serialize};

/// Main application configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// RPC endpoint configuration
    pub rpc: RpcConfig,

    /// Wallet configuration
    pub wallet: WalletConfig,

    /// Bundle relay configuration
    pub relay: RelayConfig,

    /// Volume generation configuration
    pub volume: VolumeConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RpcConfig {
    /// RPC endpoint URL
    pub endpoint: String,

    /// Request timeout in seconds
    #[serde(default = "default_rpc_timeout")]
    pub timeout_secs: u64,

    /// Max retries for blockhash retrieval
    #[serde(default = "default_blockhash_retries")]
    pub blockhash_retries: u32,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WalletConfig {
    /// Path to the main wallet keypair file
    pub keypair_path: String,

    /// Root directory for persisted ephemeral wallet keypairs
    #[serde(default = "default_keypairs_dir")]
    pub keypairs_dir: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RelayConfig {
    /// Block-engine bundle endpoint
    #[serde(default = "default_block_engine_url")]
    pub block_engine_url: String,

    /// Bundle status poll interval in milliseconds
    #[serde(default = "default_poll_interval_ms")]
    pub poll_interval_ms: u64,

    /// Give up observing a bundle result after this many seconds and
    /// report an unknown outcome
    #[serde(default = "default_result_timeout")]
    pub result_timeout_secs: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VolumeConfig {
    /// Ephemeral wallets per cycle (max 4)
    #[serde(default = "default_wallet_count")]
    pub wallet_count: usize,

    /// Number of volume cycles to run
    #[serde(default = "default_cycles")]
    pub cycles: u32,

    /// Minimum random swap amount in lamports
    pub min_amount_lamports: u64,

    /// Maximum random swap amount in lamports
    pub max_amount_lamports: u64,

    /// Delay between cycles in seconds (jitter applied on top)
    #[serde(default = "default_cycle_delay")]
    pub cycle_delay_secs: u64,

    /// Relay tip in lamports
    #[serde(default = "default_tip")]
    pub tip_lamports: u64,

    /// Priority fee in micro-lamports per compute unit
    #[serde(default = "default_priority_fee")]
    pub priority_fee_micro_lamports: u64,

    /// Lamports transferred to each ephemeral wallet
    #[serde(default = "default_funding")]
    pub funding_lamports: u64,

    /// Lamports left behind in each ephemeral wallet to cover fees
    #[serde(default = "default_fee_reserve")]
    pub fee_reserve_lamports: u64,

    /// Pool metadata source; only "synthetic" is currently wired
    #[serde(default = "default_data_source")]
    pub data_source: String,

    /// Propagate token-program resolution errors instead of falling back
    /// to the classic program
    #[serde(default)]
    pub strict_token_resolution: bool,
}

// Default value functions
fn default_rpc_timeout() -> u64 {
    30
}
fn default_blockhash_retries() -> u32 {
    5
}
fn default_keypairs_dir() -> String {
    "keypairs".to_string()
}
fn default_block_engine_url() -> String {
    "https://mainnet.block-engine.jito.wtf/api/v1/bundles".to_string()
}
fn default_poll_interval_ms() -> u64 {
    1_000
}
fn default_result_timeout() -> u64 {
    30
}
fn default_wallet_count() -> usize {
    2
}
fn default_cycles() -> u32 {
    1
}
fn default_cycle_delay() -> u64 {
    10
}
fn default_tip() -> u64 {
    1_000_000
}
fn default_priority_fee() -> u64 {
    1_000
}
fn default_funding() -> u64 {
    1_200_000
}
fn default_fee_reserve() -> u64 {
    10_000
}
fn default_data_source() -> String {
    "synthetic".to_string()
}

impl Config {
    /// Load configuration from a TOML file
    pub fn from_file(path: &str) -> anyhow::Result<Self> {
        let content = std::fs::read_to_string(path)?;
        let config: Config = toml::from_str(&content)?;
        config.validate()?;
        Ok(config)
    }

    /// Load configuration with environment variable overrides
    pub fn from_file_with_env(path: &str) -> anyhow::Result<Self> {
        dotenvy::dotenv().ok();
        Self::from_file(path)
    }

    /// Reject configurations that can never produce a valid bundle
    pub fn validate(&self) -> anyhow::Result<()> {
        if self.volume.wallet_count == 0 || self.volume.wallet_count > 4 {
            anyhow::bail!(
                "volume.wallet_count must be in [1, 4], got {}",
                self.volume.wallet_count
            );
        }
        if self.volume.min_amount_lamports > self.volume.max_amount_lamports {
            anyhow::bail!("volume.min_amount_lamports exceeds max_amount_lamports");
        }
        if self.volume.fee_reserve_lamports >= self.volume.funding_lamports {
            anyhow::bail!("volume.fee_reserve_lamports must be below funding_lamports");
        }
        Ok(())
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            rpc: RpcConfig {
                endpoint: "https://api.mainnet-beta.solana.com".to_string(),
                timeout_secs: default_rpc_timeout(),
                blockhash_retries: default_blockhash_retries(),
            },
            wallet: WalletConfig {
                keypair_path: "~/.config/solana/id.json".to_string(),
                keypairs_dir: default_keypairs_dir(),
            },
            relay: RelayConfig {
                block_engine_url: default_block_engine_url(),
                poll_interval_ms: default_poll_interval_ms(),
                result_timeout_secs: default_result_timeout(),
            },
            volume: VolumeConfig {
                wallet_count: default_wallet_count(),
                cycles: default_cycles(),
                min_amount_lamports: 10_000_000,
                max_amount_lamports: 20_000_000,
                cycle_delay_secs: default_cycle_delay(),
                tip_lamports: default_tip(),
                priority_fee_micro_lamports: default_priority_fee(),
                funding_lamports: default_funding(),
                fee_reserve_lamports: default_fee_reserve(),
                data_source: default_data_source(),
                strict_token_resolution: false,
            },
        }
    }
}
