use anchor_lang::prelude::*;

declare_id!("7M3NZBmxFmhABQznjPvy9hGUYQerEQMvfeDGEHnfTyfk");

pub mod events;
pub mod instructions;
pub mod state;
pub mod types;

use instructions::*;

/// Cross-chain intent settlement. One deployment serves both roles: the
/// source-chain ledger (publish, fund, withdraw, refund) escrowing rewards
/// in per-intent vaults, and the destination-chain engine (fulfill, prove)
/// executing routes and recording who settled them.
#[program]
pub mod portal {
    use super::*;

    pub fn publish(ctx: Context<Publish>, args: PublishArgs) -> Result<()> {
        publish_intent(ctx, args)
    }

    pub fn publish_and_fund<'info>(
        ctx: Context<'_, '_, '_, 'info, Fund<'info>>,
        args: PublishAndFundArgs,
    ) -> Result<()> {
        publish_and_fund_intent(ctx, args)
    }

    pub fn fund<'info>(ctx: Context<'_, '_, '_, 'info, Fund<'info>>, args: FundArgs) -> Result<()> {
        fund_intent(ctx, args)
    }

    pub fn fund_for<'info>(
        ctx: Context<'_, '_, '_, 'info, FundFor<'info>>,
        args: FundForArgs,
    ) -> Result<()> {
        fund_intent_for(ctx, args)
    }

    pub fn withdraw<'info>(
        ctx: Context<'_, '_, '_, 'info, Withdraw<'info>>,
        args: WithdrawArgs,
    ) -> Result<()> {
        withdraw_intent(ctx, args)
    }

    pub fn batch_withdraw<'info>(
        ctx: Context<'_, '_, '_, 'info, BatchWithdraw<'info>>,
        args: BatchWithdrawArgs,
    ) -> Result<()> {
        batch_withdraw_intents(ctx, args)
    }

    pub fn refund<'info>(
        ctx: Context<'_, '_, '_, 'info, Refund<'info>>,
        args: RefundArgs,
    ) -> Result<()> {
        refund_intent(ctx, args)
    }

    pub fn batch_refund<'info>(
        ctx: Context<'_, '_, '_, 'info, BatchRefund<'info>>,
        args: BatchRefundArgs,
    ) -> Result<()> {
        batch_refund_intents(ctx, args)
    }

    pub fn recover_token<'info>(
        ctx: Context<'_, '_, '_, 'info, RecoverToken<'info>>,
        args: RecoverTokenArgs,
    ) -> Result<()> {
        recover_token_from_vault(ctx, args)
    }

    pub fn fulfill<'info>(
        ctx: Context<'_, '_, '_, 'info, Fulfill<'info>>,
        args: FulfillArgs,
    ) -> Result<()> {
        fulfill_intent(ctx, args)
    }

    pub fn prove<'info>(
        ctx: Context<'_, '_, '_, 'info, Prove<'info>>,
        args: ProveArgs,
    ) -> Result<()> {
        prove_intents(ctx, args)
    }

    pub fn fulfill_and_prove<'info>(
        ctx: Context<'_, '_, '_, 'info, FulfillAndProve<'info>>,
        args: FulfillAndProveArgs,
    ) -> Result<()> {
        fulfill_and_prove_intent(ctx, args)
    }
}
