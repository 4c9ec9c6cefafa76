//! Chain query abstraction
//!
//! The engine consumes a narrow slice of RPC functionality (blockhash,
//! account owner, balance) behind a trait so tests can substitute a mock
//! without a running validator.

use async_trait::async_trait;
use solana_client::nonblocking::rpc_client::RpcClient;
use solana_sdk::{commitment_config::CommitmentConfig, hash::Hash, pubkey::Pubkey};
use std::time::Duration;

use crate::errors::VolumeBotError;

/// Latest blockhash together with the block height bounding its validity
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BlockhashInfo {
    pub blockhash: Hash,
    pub last_valid_block_height: u64,
}

/// Read-only chain queries consumed by the engine
#[async_trait]
pub trait ChainQuery: Send + Sync {
    /// Fetch the latest blockhash at finalized commitment
    async fn latest_blockhash(&self) -> Result<BlockhashInfo, VolumeBotError>;

    /// Owner program of an account, or None if the account does not exist
    async fn account_owner(&self, pubkey: &Pubkey) -> Result<Option<Pubkey>, VolumeBotError>;

    /// Lamport balance of an account
    async fn balance(&self, pubkey: &Pubkey) -> Result<u64, VolumeBotError>;
}

/// `ChainQuery` over a nonblocking RPC client
pub struct RpcChainClient {
    client: RpcClient,
    commitment: CommitmentConfig,
}

impl RpcChainClient {
    pub fn new(endpoint: impl Into<String>, timeout: Duration) -> Self {
        let commitment = CommitmentConfig::finalized();
        Self {
            client: RpcClient::new_with_timeout_and_commitment(
                endpoint.into(),
                timeout,
                commitment,
            ),
            commitment,
        }
    }
}

#[async_trait]
impl ChainQuery for RpcChainClient {
    async fn latest_blockhash(&self) -> Result<BlockhashInfo, VolumeBotError> {
        let (blockhash, last_valid_block_height) = self
            .client
            .get_latest_blockhash_with_commitment(self.commitment)
            .await
            .map_err(VolumeBotError::rpc)?;
        Ok(BlockhashInfo {
            blockhash,
            last_valid_block_height,
        })
    }

    async fn account_owner(&self, pubkey: &Pubkey) -> Result<Option<Pubkey>, VolumeBotError> {
        let response = self
            .client
            .get_account_with_commitment(pubkey, self.commitment)
            .await
            .map_err(VolumeBotError::rpc)?;
        Ok(response.value.map(|account| account.owner))
    }

    async fn balance(&self, pubkey: &Pubkey) -> Result<u64, VolumeBotError> {
        self.client
            .get_balance(pubkey)
            .await
            .map_err(VolumeBotError::rpc)
    }
}
