//! Ephemeral wallet lifecycle
//!
//! Each cycle gets N freshly generated keypairs. Every keypair is persisted
//! to disk before any instruction references it, so a crash mid-cycle never
//! strands funds without recovery material. Wallets are single-use: funded
//! at cycle start, drained back to the main wallet by the last instruction
//! of their swap envelope, never reused.

use chrono::{DateTime, Utc};
use solana_sdk::{
    instruction::Instruction,
    pubkey::Pubkey,
    signature::{Keypair, Signer},
    system_instruction,
};
use std::path::{Path, PathBuf};
use tracing::{info, warn};

use crate::chain::ChainQuery;
use crate::errors::{abbreviate, VolumeBotError};

/// Balances at or below this are not worth sweeping
pub const DUST_THRESHOLD_LAMPORTS: u64 = 5_000;

/// A short-lived keypair created for one cycle
pub struct EphemeralWallet {
    pub keypair: Keypair,
    pub funded_lamports: u64,
    pub created_at: DateTime<Utc>,
    pub reclaimed: bool,
}

impl EphemeralWallet {
    pub fn pubkey(&self) -> Pubkey {
        self.keypair.pubkey()
    }

    /// Log-safe identifier (the filename prefix)
    pub fn prefix(&self) -> String {
        key_prefix(&self.pubkey())
    }
}

fn key_prefix(pubkey: &Pubkey) -> String {
    let s = pubkey.to_string();
    s[..8.min(s.len())].to_string()
}

/// On-disk store of ephemeral wallet secret keys, one file per wallet under
/// a per-market directory.
///
/// File format matches the standard keypair tooling: the 64-byte secret key
/// serialized as a JSON numeric array. Filenames are derived from a
/// public-key prefix, so recovery only needs the market id and the files.
pub struct WalletRepository {
    root: PathBuf,
}

impl WalletRepository {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    fn market_dir(&self, market: &str) -> PathBuf {
        self.root.join(market)
    }

    fn wallet_path(&self, market: &str, pubkey: &Pubkey) -> PathBuf {
        self.market_dir(market)
            .join(format!("wallet-{}.json", key_prefix(pubkey)))
    }

    fn reclaimed_path(&self, market: &str, pubkey: &Pubkey) -> PathBuf {
        self.market_dir(market)
            .join(format!("wallet-{}.reclaimed.json", key_prefix(pubkey)))
    }

    /// Persist a keypair; must complete before the keypair is referenced by
    /// any instruction
    pub async fn persist(&self, market: &str, keypair: &Keypair) -> Result<PathBuf, VolumeBotError> {
        let dir = self.market_dir(market);
        tokio::fs::create_dir_all(&dir)
            .await
            .map_err(|e| VolumeBotError::WalletPersistence(format!("create {:?}: {}", dir, e)))?;

        let path = self.wallet_path(market, &keypair.pubkey());
        let bytes = serde_json::to_vec(&keypair.to_bytes().to_vec())
            .map_err(|e| VolumeBotError::WalletPersistence(e.to_string()))?;
        tokio::fs::write(&path, bytes)
            .await
            .map_err(|e| VolumeBotError::WalletPersistence(format!("write {:?}: {}", path, e)))?;
        Ok(path)
    }

    /// Load every not-yet-reclaimed keypair persisted for a market
    pub async fn list_by_market(&self, market: &str) -> Result<Vec<Keypair>, VolumeBotError> {
        let dir = self.market_dir(market);
        if !dir.exists() {
            return Ok(Vec::new());
        }

        let mut entries = tokio::fs::read_dir(&dir)
            .await
            .map_err(|e| VolumeBotError::WalletPersistence(format!("read {:?}: {}", dir, e)))?;

        let mut keypairs = Vec::new();
        while let Some(entry) = entries
            .next_entry()
            .await
            .map_err(|e| VolumeBotError::WalletPersistence(e.to_string()))?
        {
            let name = entry.file_name().to_string_lossy().into_owned();
            if !name.starts_with("wallet-")
                || !name.ends_with(".json")
                || name.ends_with(".reclaimed.json")
            {
                continue;
            }
            match Self::load_keypair(&entry.path()).await {
                Ok(keypair) => keypairs.push(keypair),
                Err(err) => warn!(file = %name, %err, "Skipping unreadable wallet file"),
            }
        }
        Ok(keypairs)
    }

    /// Rename a wallet file so it is excluded from future recovery sweeps
    pub async fn mark_reclaimed(&self, market: &str, pubkey: &Pubkey) -> Result<(), VolumeBotError> {
        let from = self.wallet_path(market, pubkey);
        if !from.exists() {
            return Ok(());
        }
        let to = self.reclaimed_path(market, pubkey);
        tokio::fs::rename(&from, &to)
            .await
            .map_err(|e| VolumeBotError::WalletPersistence(format!("rename {:?}: {}", from, e)))
    }

    async fn load_keypair(path: &Path) -> Result<Keypair, VolumeBotError> {
        let bytes = tokio::fs::read(path)
            .await
            .map_err(|e| VolumeBotError::WalletPersistence(e.to_string()))?;
        let json: Vec<u8> = serde_json::from_slice(&bytes)
            .map_err(|e| VolumeBotError::WalletPersistence(format!("parse {:?}: {}", path, e)))?;
        Keypair::try_from(json.as_slice())
            .map_err(|e| VolumeBotError::WalletPersistence(format!("invalid key in {:?}: {}", path, e)))
    }
}

/// Generates, funds, and reclaims per-cycle ephemeral wallets
pub struct EphemeralWalletManager {
    repository: WalletRepository,
    funding_lamports: u64,
    fee_reserve_lamports: u64,
}

impl EphemeralWalletManager {
    pub fn new(repository: WalletRepository, funding_lamports: u64, fee_reserve_lamports: u64) -> Self {
        Self {
            repository,
            funding_lamports,
            fee_reserve_lamports,
        }
    }

    pub fn funding_lamports(&self) -> u64 {
        self.funding_lamports
    }

    /// Generate `count` fresh keypairs for one cycle, persisting each before
    /// returning it
    pub async fn create_for_cycle(
        &self,
        market: &str,
        count: usize,
    ) -> Result<Vec<EphemeralWallet>, VolumeBotError> {
        let mut wallets = Vec::with_capacity(count);
        for _ in 0..count {
            let keypair = Keypair::new();
            self.repository.persist(market, &keypair).await?;
            wallets.push(EphemeralWallet {
                keypair,
                funded_lamports: self.funding_lamports,
                created_at: Utc::now(),
                reclaimed: false,
            });
        }
        info!(market = %abbreviate(market), count, "Generated ephemeral wallets for cycle");
        Ok(wallets)
    }

    /// Funding transfer: main wallet -> ephemeral wallet
    pub fn funding_instruction(&self, main: &Pubkey, wallet: &EphemeralWallet) -> Instruction {
        system_instruction::transfer(main, &wallet.pubkey(), wallet.funded_lamports)
    }

    /// Return transfer: ephemeral wallet -> main wallet, leaving the fee
    /// reserve behind
    pub fn return_funds_instruction(&self, wallet: &EphemeralWallet, main: &Pubkey) -> Instruction {
        let amount = wallet.funded_lamports.saturating_sub(self.fee_reserve_lamports);
        system_instruction::transfer(&wallet.pubkey(), main, amount)
    }

    /// Mark a wallet's persisted key as reclaimed
    pub async fn mark_reclaimed(&self, market: &str, pubkey: &Pubkey) -> Result<(), VolumeBotError> {
        self.repository.mark_reclaimed(market, pubkey).await
    }

    /// Persisted, not-yet-reclaimed keypairs for a market
    pub async fn list_by_market(&self, market: &str) -> Result<Vec<Keypair>, VolumeBotError> {
        self.repository.list_by_market(market).await
    }

    /// Recovery sweep: log any previously persisted, never-reclaimed wallet
    /// that still holds more than dust.
    ///
    /// Surfaces funds stranded by a crash in an earlier run; nothing is
    /// moved automatically.
    pub async fn audit_unreclaimed(&self, market: &str, chain: &dyn ChainQuery) {
        let leftovers = match self.repository.list_by_market(market).await {
            Ok(keypairs) => keypairs,
            Err(err) => {
                warn!(market = %abbreviate(market), %err, "Recovery sweep failed to list wallets");
                return;
            }
        };

        for keypair in leftovers {
            let pubkey = keypair.pubkey();
            match chain.balance(&pubkey).await {
                Ok(balance) if balance > DUST_THRESHOLD_LAMPORTS => {
                    warn!(
                        wallet = %key_prefix(&pubkey),
                        balance,
                        "Unreclaimed ephemeral wallet holds funds; recover manually from the keypair file"
                    );
                }
                Ok(_) => {
                    // Drained or dust only; safe to retire
                    if let Err(err) = self.repository.mark_reclaimed(market, &pubkey).await {
                        warn!(wallet = %key_prefix(&pubkey), %err, "Failed to retire drained wallet");
                    }
                }
                Err(err) => {
                    warn!(wallet = %key_prefix(&pubkey), %err, "Balance probe failed during recovery sweep");
                }
            }
        }
    }
}
