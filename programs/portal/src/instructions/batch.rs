use anchor_lang::prelude::*;
use anchor_spl::{token, token_2022};
use intents_svm_std::Bytes32;

use crate::instructions::refund::{refund_one, RefundAccounts};
use crate::instructions::withdraw::{withdraw_one, SettlementPrograms, WithdrawAccounts};
use crate::instructions::PortalError;
use crate::state::dispatcher_pda;
use crate::types::Reward;

#[derive(AnchorSerialize, AnchorDeserialize)]
pub struct BatchWithdrawArgs {
    pub destinations: Vec<u64>,
    pub route_hashes: Vec<Bytes32>,
    pub rewards: Vec<Reward>,
}

#[derive(Accounts)]
pub struct BatchWithdraw<'info> {
    #[account(mut)]
    pub payer: Signer<'info>,
    /// CHECK: address is validated
    #[account(address = dispatcher_pda().0 @ PortalError::InvalidDispatcher)]
    pub dispatcher: UncheckedAccount<'info>,
    pub token_program: Program<'info, token::Token>,
    pub token_2022_program: Program<'info, token_2022::Token2022>,
    pub system_program: Program<'info, System>,
}

pub fn batch_withdraw_intents<'info>(
    ctx: Context<'_, '_, '_, 'info, BatchWithdraw<'info>>,
    args: BatchWithdrawArgs,
) -> Result<()> {
    let BatchWithdrawArgs {
        destinations,
        route_hashes,
        rewards,
    } = args;
    ensure_parallel_lengths(&[destinations.len(), route_hashes.len(), rewards.len()])?;

    let programs = SettlementPrograms {
        payer: ctx.accounts.payer.to_account_info(),
        token_program: &ctx.accounts.token_program,
        token_2022_program: &ctx.accounts.token_2022_program,
        system_program: &ctx.accounts.system_program,
    };
    let dispatcher = ctx.accounts.dispatcher.to_account_info();
    let mut remaining = ctx.remaining_accounts;

    destinations
        .into_iter()
        .zip(route_hashes)
        .zip(rewards)
        .try_for_each(|((destination, route_hash), reward)| {
            let (accounts, consumed) = WithdrawAccounts::split_from(&reward, remaining)?;
            remaining = &remaining[consumed..];

            withdraw_one(
                &programs,
                &dispatcher,
                &accounts,
                destination,
                route_hash,
                &reward,
            )
        })
}

#[derive(AnchorSerialize, AnchorDeserialize)]
pub struct BatchRefundArgs {
    pub destinations: Vec<u64>,
    pub route_hashes: Vec<Bytes32>,
    pub rewards: Vec<Reward>,
}

#[derive(Accounts)]
pub struct BatchRefund<'info> {
    #[account(mut)]
    pub payer: Signer<'info>,
    pub token_program: Program<'info, token::Token>,
    pub token_2022_program: Program<'info, token_2022::Token2022>,
    pub system_program: Program<'info, System>,
}

pub fn batch_refund_intents<'info>(
    ctx: Context<'_, '_, '_, 'info, BatchRefund<'info>>,
    args: BatchRefundArgs,
) -> Result<()> {
    let BatchRefundArgs {
        destinations,
        route_hashes,
        rewards,
    } = args;
    ensure_parallel_lengths(&[destinations.len(), route_hashes.len(), rewards.len()])?;

    let programs = SettlementPrograms {
        payer: ctx.accounts.payer.to_account_info(),
        token_program: &ctx.accounts.token_program,
        token_2022_program: &ctx.accounts.token_2022_program,
        system_program: &ctx.accounts.system_program,
    };
    let mut remaining = ctx.remaining_accounts;

    destinations
        .into_iter()
        .zip(route_hashes)
        .zip(rewards)
        .try_for_each(|((destination, route_hash), reward)| {
            let (accounts, consumed) = RefundAccounts::split_from(&reward, remaining)?;
            remaining = &remaining[consumed..];

            refund_one(&programs, &accounts, destination, route_hash, &reward)
        })
}

/// Checked before any intent in the batch is touched, so a malformed batch
/// fails without partial processing.
pub(crate) fn ensure_parallel_lengths(lengths: &[usize]) -> Result<()> {
    require!(
        lengths.windows(2).all(|pair| pair[0] == pair[1]),
        PortalError::ArrayLengthMismatch
    );

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn equal_lengths_pass() {
        assert!(ensure_parallel_lengths(&[3, 3, 3]).is_ok());
        assert!(ensure_parallel_lengths(&[0, 0, 0]).is_ok());
    }

    #[test]
    fn mismatched_lengths_fail() {
        assert!(ensure_parallel_lengths(&[3, 2, 3]).is_err());
        assert!(ensure_parallel_lengths(&[1, 1, 0]).is_err());
    }
}
