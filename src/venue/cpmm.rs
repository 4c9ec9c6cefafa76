//! Constant-product swap instruction builder
//!
//! One instruction, routed through an aggregator proxy program. Vaults,
//! token programs and associated accounts are selected by comparing each
//! side's mint against the descriptor's mint-A/mint-B slots, so the builder
//! is agnostic to which slot holds the wrapped-native mint.

use async_trait::async_trait;
use solana_sdk::{
    instruction::{AccountMeta, Instruction},
    pubkey::Pubkey,
};
use spl_associated_token_account::get_associated_token_address_with_program_id;

use super::{
    CpmmPool, SwapInstructionBuilder, VenueDescriptor, CPMM_AUTHORITY, CPMM_PROGRAM,
    CPMM_ROUTER_PROGRAM,
};
use crate::errors::VolumeBotError;
use crate::types::Side;

const SWAP_DISCRIMINATOR: u8 = 0x09;
const SWAP_FLAGS: u8 = 0x00;

#[derive(Debug, Default, Clone, Copy)]
pub struct CpmmSwapBuilder;

impl CpmmSwapBuilder {
    pub fn new() -> Self {
        Self
    }

    /// Vault and token program for whichever slot holds `mint`
    fn slot_for(pool: &CpmmPool, mint: &Pubkey) -> (Pubkey, Pubkey) {
        if *mint == pool.mint_a {
            (pool.vault_a, pool.mint_program_a)
        } else {
            (pool.vault_b, pool.mint_program_b)
        }
    }
}

#[async_trait]
impl SwapInstructionBuilder for CpmmSwapBuilder {
    async fn build(
        &self,
        side: Side,
        input_amount: u64,
        min_output_amount: u64,
        descriptor: &VenueDescriptor,
        trader: &Pubkey,
    ) -> Result<Vec<Instruction>, VolumeBotError> {
        let VenueDescriptor::Cpmm(pool) = descriptor else {
            return Err(VolumeBotError::build_failed(
                "cpmm",
                "descriptor is not a constant-product pool",
            ));
        };

        let native = spl_token::native_mint::id();
        let a_is_native = pool.mint_a == native;

        // buy: native (quote) -> token, sell: token -> native
        let (input_mint, output_mint) = match side {
            Side::Buy if a_is_native => (pool.mint_a, pool.mint_b),
            Side::Buy => (pool.mint_b, pool.mint_a),
            Side::Sell if a_is_native => (pool.mint_b, pool.mint_a),
            Side::Sell => (pool.mint_a, pool.mint_b),
        };

        let (input_vault, input_token_program) = Self::slot_for(pool, &input_mint);
        let (output_vault, output_token_program) = Self::slot_for(pool, &output_mint);

        let input_ata =
            get_associated_token_address_with_program_id(trader, &input_mint, &input_token_program);
        let output_ata = get_associated_token_address_with_program_id(
            trader,
            &output_mint,
            &output_token_program,
        );

        let mut data = Vec::with_capacity(18);
        data.push(SWAP_DISCRIMINATOR);
        data.extend_from_slice(&input_amount.to_le_bytes());
        data.extend_from_slice(&min_output_amount.to_le_bytes());
        data.push(SWAP_FLAGS);

        let accounts = vec![
            AccountMeta::new_readonly(CPMM_PROGRAM, false),
            AccountMeta::new(*trader, true),
            AccountMeta::new_readonly(CPMM_AUTHORITY, false),
            AccountMeta::new_readonly(pool.config_id, false),
            AccountMeta::new(pool.id, false),
            AccountMeta::new(input_ata, false),
            AccountMeta::new(output_ata, false),
            AccountMeta::new(input_vault, false),
            AccountMeta::new(output_vault, false),
            AccountMeta::new_readonly(input_token_program, false),
            AccountMeta::new_readonly(output_token_program, false),
            AccountMeta::new_readonly(input_mint, false),
            AccountMeta::new_readonly(output_mint, false),
            AccountMeta::new(pool.observation_id, false),
        ];

        Ok(vec![Instruction {
            program_id: CPMM_ROUTER_PROGRAM,
            accounts,
            data,
        }])
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn pool(a_is_native: bool) -> CpmmPool {
        let native = spl_token::native_mint::id();
        let token = Pubkey::new_unique();
        let (mint_a, mint_b) = if a_is_native {
            (native, token)
        } else {
            (token, native)
        };
        CpmmPool {
            id: Pubkey::new_unique(),
            config_id: Pubkey::new_unique(),
            mint_a,
            mint_b,
            vault_a: Pubkey::new_unique(),
            vault_b: Pubkey::new_unique(),
            mint_program_a: if a_is_native {
                spl_token::id()
            } else {
                spl_token_2022::id()
            },
            mint_program_b: if a_is_native {
                spl_token_2022::id()
            } else {
                spl_token::id()
            },
            observation_id: Pubkey::new_unique(),
        }
    }

    #[tokio::test]
    async fn test_buy_selects_native_side_as_input() {
        for a_is_native in [true, false] {
            let pool = pool(a_is_native);
            let native_vault = if a_is_native { pool.vault_a } else { pool.vault_b };
            let token_vault = if a_is_native { pool.vault_b } else { pool.vault_a };
            let descriptor = VenueDescriptor::Cpmm(pool);
            let trader = Pubkey::new_unique();

            let ixs = CpmmSwapBuilder::new()
                .build(Side::Buy, 10_000_000, 0, &descriptor, &trader)
                .await
                .expect("build");
            let ix = &ixs[0];

            // Account order: ..., input_vault at 7, output_vault at 8
            assert_eq!(ix.accounts[7].pubkey, native_vault, "input vault is native");
            assert_eq!(ix.accounts[8].pubkey, token_vault, "output vault is token");
            // Input mint at 11 is the native mint
            assert_eq!(ix.accounts[11].pubkey, spl_token::native_mint::id());
        }
    }

    #[tokio::test]
    async fn test_sell_selects_token_side_as_input() {
        for a_is_native in [true, false] {
            let pool = pool(a_is_native);
            let native_vault = if a_is_native { pool.vault_a } else { pool.vault_b };
            let descriptor = VenueDescriptor::Cpmm(pool);
            let trader = Pubkey::new_unique();

            let ixs = CpmmSwapBuilder::new()
                .build(Side::Sell, 10_000_000, 0, &descriptor, &trader)
                .await
                .expect("build");
            let ix = &ixs[0];

            assert_eq!(ix.accounts[8].pubkey, native_vault, "output vault is native");
            assert_eq!(ix.accounts[12].pubkey, spl_token::native_mint::id());
        }
    }

    #[tokio::test]
    async fn test_routed_through_proxy_with_pool_program_first() {
        let descriptor = VenueDescriptor::Cpmm(pool(true));
        let trader = Pubkey::new_unique();

        let ixs = CpmmSwapBuilder::new()
            .build(Side::Buy, 1, 0, &descriptor, &trader)
            .await
            .expect("build");

        assert_eq!(ixs.len(), 1);
        assert_eq!(ixs[0].program_id, CPMM_ROUTER_PROGRAM);
        assert_eq!(ixs[0].accounts[0].pubkey, CPMM_PROGRAM);
        assert_eq!(ixs[0].data[0], SWAP_DISCRIMINATOR);
    }

    #[tokio::test]
    async fn test_observation_account_included_writable() {
        let pool = pool(false);
        let observation = pool.observation_id;
        let descriptor = VenueDescriptor::Cpmm(pool);
        let trader = Pubkey::new_unique();

        let ixs = CpmmSwapBuilder::new()
            .build(Side::Buy, 1, 0, &descriptor, &trader)
            .await
            .expect("build");
        let last = ixs[0].accounts.last().expect("accounts");

        assert_eq!(last.pubkey, observation);
        assert!(last.is_writable);
    }
}
