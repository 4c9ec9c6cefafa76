//! Main wallet management module

use anyhow::{Context, Result};
use solana_sdk::{
    pubkey::Pubkey,
    signature::{Keypair, Signer},
};
use std::sync::Arc;

/// Wallet manager for the operator's main keypair
pub struct WalletManager {
    keypair: Arc<Keypair>,
}

impl WalletManager {
    /// Create a new wallet manager from a keypair file
    ///
    /// Accepts either raw 64-byte secret keys or the JSON numeric-array
    /// format written by the standard tooling.
    pub fn from_file(path: &str) -> Result<Self> {
        let keypair_bytes =
            std::fs::read(path).with_context(|| format!("Failed to read keypair file: {}", path))?;

        let keypair = if keypair_bytes.len() == 64 {
            // Raw bytes format - validate before conversion
            if keypair_bytes.iter().all(|&b| b == 0) {
                anyhow::bail!("Invalid keypair: all-zero key rejected");
            }
            Keypair::try_from(keypair_bytes.as_slice()).context("Invalid keypair bytes")?
        } else {
            // JSON format
            let json: Vec<u8> =
                serde_json::from_slice(&keypair_bytes).context("Failed to parse keypair JSON")?;
            if json.len() != 64 {
                anyhow::bail!(
                    "Invalid keypair length: expected 64 bytes, got {}",
                    json.len()
                );
            }
            if json.iter().all(|&b| b == 0) {
                anyhow::bail!("Invalid keypair: all-zero key rejected");
            }
            Keypair::try_from(json.as_slice()).context("Invalid keypair from JSON")?
        };

        Ok(Self {
            keypair: Arc::new(keypair),
        })
    }

    /// Create a new wallet manager from a keypair
    pub fn from_keypair(keypair: Keypair) -> Self {
        Self {
            keypair: Arc::new(keypair),
        }
    }

    /// Get the public key
    pub fn pubkey(&self) -> Pubkey {
        self.keypair.pubkey()
    }

    /// Get a reference to the keypair
    pub fn keypair(&self) -> &Keypair {
        &self.keypair
    }

    /// Get an Arc reference to the keypair (for use with code expecting Arc<Keypair>)
    pub fn keypair_arc(&self) -> Arc<Keypair> {
        Arc::clone(&self.keypair)
    }
}

impl Clone for WalletManager {
    fn clone(&self) -> Self {
        Self {
            keypair: Arc::clone(&self.keypair),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_from_keypair_roundtrip() {
        let kp = Keypair::new();
        let expected = kp.pubkey();
        let manager = WalletManager::from_keypair(kp);
        assert_eq!(manager.pubkey(), expected);
    }

    #[test]
    fn test_from_file_json_format() {
        let kp = Keypair::new();
        let mut file = tempfile::NamedTempFile::new().expect("tempfile");
        let json = serde_json::to_vec(&kp.to_bytes().to_vec()).expect("serialize");
        file.write_all(&json).expect("write");

        let manager =
            WalletManager::from_file(file.path().to_str().expect("utf8 path")).expect("load");
        assert_eq!(manager.pubkey(), kp.pubkey());
    }

    #[test]
    fn test_from_file_rejects_all_zero_key() {
        let mut file = tempfile::NamedTempFile::new().expect("tempfile");
        let json = serde_json::to_vec(&vec![0u8; 64]).expect("serialize");
        file.write_all(&json).expect("write");

        assert!(WalletManager::from_file(file.path().to_str().expect("utf8 path")).is_err());
    }
}
