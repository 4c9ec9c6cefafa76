//! Curve-AMM swap instruction builder
//!
//! One instruction per swap; a one-byte discriminator selects buy or sell.
//! The base mint may live under either token standard, so its token program
//! is resolved (and cached) before the trader's associated account is
//! derived. Wrapped SOL always uses the classic program.

use async_trait::async_trait;
use solana_sdk::{
    instruction::{AccountMeta, Instruction},
    pubkey::Pubkey,
    system_program,
};
use spl_associated_token_account::get_associated_token_address_with_program_id;
use std::sync::Arc;

use super::{SwapInstructionBuilder, VenueDescriptor, CURVE_SWAP_PROGRAM};
use crate::errors::VolumeBotError;
use crate::token_program::TokenProgramResolver;
use crate::types::Side;

const BUY_DISCRIMINATOR: u8 = 0x1f;
const SELL_DISCRIMINATOR: u8 = 0x2e;

pub struct CurveSwapBuilder {
    token_programs: Arc<TokenProgramResolver>,
}

impl CurveSwapBuilder {
    pub fn new(token_programs: Arc<TokenProgramResolver>) -> Self {
        Self { token_programs }
    }
}

#[async_trait]
impl SwapInstructionBuilder for CurveSwapBuilder {
    async fn build(
        &self,
        side: Side,
        input_amount: u64,
        min_output_amount: u64,
        descriptor: &VenueDescriptor,
        trader: &Pubkey,
    ) -> Result<Vec<Instruction>, VolumeBotError> {
        let VenueDescriptor::Curve(pool) = descriptor else {
            return Err(VolumeBotError::build_failed(
                "curve",
                "descriptor is not a curve pool",
            ));
        };

        let base_token_program = self.token_programs.resolve(&pool.base_mint).await?;
        let quote_token_program = spl_token::id();

        let user_base_ata = get_associated_token_address_with_program_id(
            trader,
            &pool.base_mint,
            &base_token_program,
        );
        let user_quote_ata = get_associated_token_address_with_program_id(
            trader,
            &pool.quote_mint,
            &quote_token_program,
        );

        let discriminator = match side {
            Side::Buy => BUY_DISCRIMINATOR,
            Side::Sell => SELL_DISCRIMINATOR,
        };
        let mut data = Vec::with_capacity(17);
        data.push(discriminator);
        data.extend_from_slice(&input_amount.to_le_bytes());
        data.extend_from_slice(&min_output_amount.to_le_bytes());

        let accounts = vec![
            AccountMeta::new(pool.address, false),
            AccountMeta::new_readonly(pool.authority, false),
            AccountMeta::new(pool.base_vault, false),
            AccountMeta::new(pool.quote_vault, false),
            AccountMeta::new(user_base_ata, false),
            AccountMeta::new(user_quote_ata, false),
            AccountMeta::new_readonly(*trader, true),
            AccountMeta::new_readonly(base_token_program, false),
            AccountMeta::new_readonly(quote_token_program, false),
            AccountMeta::new_readonly(spl_associated_token_account::id(), false),
            AccountMeta::new_readonly(system_program::id(), false),
        ];

        Ok(vec![Instruction {
            program_id: CURVE_SWAP_PROGRAM,
            accounts,
            data,
        }])
    }
}
