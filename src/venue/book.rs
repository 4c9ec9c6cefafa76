//! Order-book swap instruction builder
//!
//! Three instructions per swap: the primary swap against the AMM plus two
//! auxiliary leg instructions. The requested side decides which leg set is
//! populated; buy and sell legs are mutually exclusive per call.

use async_trait::async_trait;
use solana_sdk::{
    instruction::{AccountMeta, Instruction},
    pubkey::Pubkey,
};
use spl_associated_token_account::get_associated_token_address_with_program_id;
use std::sync::Arc;

use super::{SwapInstructionBuilder, VenueDescriptor, AMM_V4_PROGRAM};
use crate::errors::VolumeBotError;
use crate::token_program::TokenProgramResolver;
use crate::types::Side;

const SWAP_DISCRIMINATOR: u8 = 0x09;
const IN_LEG_DISCRIMINATOR: u8 = 0xbb;
const OUT_LEG_DISCRIMINATOR: u8 = 0xcc;

pub struct BookSwapBuilder {
    token_programs: Arc<TokenProgramResolver>,
}

impl BookSwapBuilder {
    pub fn new(token_programs: Arc<TokenProgramResolver>) -> Self {
        Self { token_programs }
    }
}

#[async_trait]
impl SwapInstructionBuilder for BookSwapBuilder {
    async fn build(
        &self,
        side: Side,
        input_amount: u64,
        min_output_amount: u64,
        descriptor: &VenueDescriptor,
        trader: &Pubkey,
    ) -> Result<Vec<Instruction>, VolumeBotError> {
        let VenueDescriptor::Book(pool) = descriptor else {
            return Err(VolumeBotError::build_failed(
                "book",
                "descriptor is not an order-book market",
            ));
        };

        let base_token_program = self.token_programs.resolve(&pool.base_mint).await?;
        let wsol_ata = get_associated_token_address_with_program_id(
            trader,
            &spl_token::native_mint::id(),
            &spl_token::id(),
        );
        let token_ata = get_associated_token_address_with_program_id(
            trader,
            &pool.base_mint,
            &base_token_program,
        );

        // buy: wrapped SOL in, token out; sell: the reverse
        let (source_ata, dest_ata) = match side {
            Side::Buy => (wsol_ata, token_ata),
            Side::Sell => (token_ata, wsol_ata),
        };

        let mut swap_data = Vec::with_capacity(17);
        swap_data.push(SWAP_DISCRIMINATOR);
        swap_data.extend_from_slice(&input_amount.to_le_bytes());
        swap_data.extend_from_slice(&min_output_amount.to_le_bytes());

        let swap_ix = Instruction {
            program_id: AMM_V4_PROGRAM,
            accounts: vec![
                AccountMeta::new_readonly(spl_token::id(), false),
                AccountMeta::new(pool.id, false),
                AccountMeta::new_readonly(pool.authority, false),
                AccountMeta::new(pool.base_vault, false),
                AccountMeta::new(pool.quote_vault, false),
                AccountMeta::new_readonly(pool.market_program_id, false),
                AccountMeta::new(pool.market_event_queue, false),
                AccountMeta::new(pool.market_base_vault, false),
                AccountMeta::new(pool.market_quote_vault, false),
                AccountMeta::new_readonly(pool.market_authority, false),
                AccountMeta::new(source_ata, false),
                AccountMeta::new(dest_ata, false),
                AccountMeta::new(*trader, true),
                AccountMeta::new_readonly(AMM_V4_PROGRAM, false),
            ],
            data: swap_data,
        };

        let mut in_leg_data = Vec::with_capacity(9);
        in_leg_data.push(IN_LEG_DISCRIMINATOR);
        in_leg_data.extend_from_slice(&[0u8; 8]);
        let in_leg_ix = Instruction {
            program_id: AMM_V4_PROGRAM,
            accounts: vec![
                AccountMeta::new(pool.id, false),
                AccountMeta::new(source_ata, false),
                AccountMeta::new(*trader, true),
            ],
            data: in_leg_data,
        };

        let mut out_leg_data = Vec::with_capacity(9);
        out_leg_data.push(OUT_LEG_DISCRIMINATOR);
        out_leg_data.extend_from_slice(&[0u8; 8]);
        let out_leg_ix = Instruction {
            program_id: AMM_V4_PROGRAM,
            accounts: vec![
                AccountMeta::new(pool.id, false),
                AccountMeta::new(dest_ata, false),
                AccountMeta::new(*trader, true),
            ],
            data: out_leg_data,
        };

        Ok(vec![swap_ix, in_leg_ix, out_leg_ix])
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::chain::{BlockhashInfo, ChainQuery};
    use crate::venue::source::{PoolDataSource, SyntheticPoolSource};

    struct ClassicOwnerChain;

    #[async_trait]
    impl ChainQuery for ClassicOwnerChain {
        async fn latest_blockhash(&self) -> Result<BlockhashInfo, VolumeBotError> {
            unimplemented!("not used")
        }
        async fn account_owner(&self, _pubkey: &Pubkey) -> Result<Option<Pubkey>, VolumeBotError> {
            Ok(Some(spl_token::id()))
        }
        async fn balance(&self, _pubkey: &Pubkey) -> Result<u64, VolumeBotError> {
            unimplemented!("not used")
        }
    }

    async fn book_descriptor() -> VenueDescriptor {
        let source = SyntheticPoolSource::new();
        for _ in 0..64 {
            let id = Pubkey::new_unique();
            if let Ok(pool) = source.fetch_book_pool(&id).await {
                return VenueDescriptor::Book(pool);
            }
        }
        panic!("no book-classified id found");
    }

    fn builder() -> BookSwapBuilder {
        let resolver = TokenProgramResolver::new(Arc::new(ClassicOwnerChain));
        BookSwapBuilder::new(Arc::new(resolver))
    }

    #[tokio::test]
    async fn test_three_instructions_per_call() {
        let descriptor = book_descriptor().await;
        let trader = Pubkey::new_unique();

        let ixs = builder()
            .build(Side::Buy, 10_000_000, 0, &descriptor, &trader)
            .await
            .expect("build");

        assert_eq!(ixs.len(), 3);
        assert_eq!(ixs[0].data[0], SWAP_DISCRIMINATOR);
        assert_eq!(ixs[1].data[0], IN_LEG_DISCRIMINATOR);
        assert_eq!(ixs[2].data[0], OUT_LEG_DISCRIMINATOR);
        for ix in &ixs {
            assert_eq!(ix.program_id, AMM_V4_PROGRAM);
        }
    }

    #[tokio::test]
    async fn test_buy_and_sell_swap_source_and_dest() {
        let descriptor = book_descriptor().await;
        let trader = Pubkey::new_unique();
        let builder = builder();

        let buy = builder
            .build(Side::Buy, 1, 0, &descriptor, &trader)
            .await
            .expect("buy");
        let sell = builder
            .build(Side::Sell, 1, 0, &descriptor, &trader)
            .await
            .expect("sell");

        // Source ATA sits at index 10, destination at 11 of the primary swap
        let buy_source = buy[0].accounts[10].pubkey;
        let buy_dest = buy[0].accounts[11].pubkey;
        let sell_source = sell[0].accounts[10].pubkey;
        let sell_dest = sell[0].accounts[11].pubkey;

        assert_eq!(buy_source, sell_dest, "buy input is sell output");
        assert_eq!(buy_dest, sell_source, "buy output is sell input");

        let wsol_ata = get_associated_token_address_with_program_id(
            &trader,
            &spl_token::native_mint::id(),
            &spl_token::id(),
        );
        assert_eq!(buy_source, wsol_ata, "buys spend wrapped SOL");
    }

    #[tokio::test]
    async fn test_legs_reference_trader_as_signer() {
        let descriptor = book_descriptor().await;
        let trader = Pubkey::new_unique();

        let ixs = builder()
            .build(Side::Sell, 1, 0, &descriptor, &trader)
            .await
            .expect("build");

        for leg in &ixs[1..] {
            assert_eq!(leg.accounts.len(), 3);
            let signer = &leg.accounts[2];
            assert_eq!(signer.pubkey, trader);
            assert!(signer.is_signer);
        }
    }
}
