use anchor_lang::prelude::*;
use anchor_lang::system_program;
use anchor_spl::{associated_token, token, token_2022};

use crate::events::IntentFunded;
use crate::instructions::fund_context::FundTokenContext;
use crate::instructions::PortalError;
use crate::state::{vault_pda, VaultState, VaultStatus};
use crate::types::{self, Bytes32, Reward};

#[derive(AnchorSerialize, AnchorDeserialize)]
pub struct FundArgs {
    pub destination: u64,
    pub route_hash: Bytes32,
    pub reward: Reward,
    pub allow_partial: bool,
}

#[derive(Accounts)]
pub struct Fund<'info> {
    #[account(mut)]
    pub payer: Signer<'info>,
    #[account(mut)]
    pub funder: Signer<'info>,
    /// CHECK: address is validated
    #[account(mut)]
    pub vault: UncheckedAccount<'info>,
    /// CHECK: address is validated
    #[account(mut)]
    pub vault_state: UncheckedAccount<'info>,
    pub token_program: Program<'info, token::Token>,
    pub token_2022_program: Program<'info, token_2022::Token2022>,
    pub associated_token_program: Program<'info, associated_token::AssociatedToken>,
    pub system_program: Program<'info, System>,
}

pub fn fund_intent<'info>(
    ctx: Context<'_, '_, '_, 'info, Fund<'info>>,
    args: FundArgs,
) -> Result<()> {
    let FundArgs {
        destination,
        route_hash,
        reward,
        allow_partial,
    } = args;
    let intent_hash = types::intent_hash(destination, &route_hash, &reward.hash());

    fund_vault(&ctx, &intent_hash, &reward, allow_partial)
}

pub(crate) fn fund_vault<'info>(
    ctx: &Context<'_, '_, '_, 'info, Fund<'info>>,
    intent_hash: &Bytes32,
    reward: &Reward,
    allow_partial: bool,
) -> Result<()> {
    require!(
        ctx.accounts.vault.key() == vault_pda(intent_hash).0,
        PortalError::InvalidVault
    );
    require!(
        ctx.accounts.vault_state.key() == VaultState::pda(intent_hash).0,
        PortalError::InvalidVaultState
    );

    let status = VaultState::status_of(&ctx.accounts.vault_state)?;
    require!(!status.is_terminal(), PortalError::IntentAlreadyFunded);

    let native_funded = fund_vault_native(ctx, reward)?;

    let reward_token_amounts = reward.token_amounts()?;
    let funded_mints = FundTokenContext::from(ctx)
        .fund_tokens(ctx.remaining_accounts.try_into()?, &reward_token_amounts)?;
    let tokens_funded = funded_mints.iter().eq(reward_token_amounts.keys());

    let complete = native_funded && tokens_funded;
    if !complete && !allow_partial {
        return Err(match native_funded {
            false => PortalError::InsufficientNativeReward,
            true => PortalError::InsufficientTokenAllowance,
        }
        .into());
    }

    let funded_status = match complete {
        true => VaultStatus::Funded,
        false => VaultStatus::PartiallyFunded,
    };
    VaultState::store(
        &ctx.accounts.vault_state,
        &ctx.accounts.payer.to_account_info(),
        &ctx.accounts.system_program,
        intent_hash,
        status.max(funded_status),
    )?;

    emit!(IntentFunded::new(
        *intent_hash,
        ctx.accounts.funder.key(),
        complete
    ));

    Ok(())
}

/// Transfers `required − held`, capped at the funder's balance. Sending
/// the exact remainder means there is never an excess to return.
fn fund_vault_native<'info>(
    ctx: &Context<'_, '_, '_, 'info, Fund<'info>>,
    reward: &Reward,
) -> Result<bool> {
    reward
        .native_amount
        .checked_sub(ctx.accounts.vault.lamports())
        .map(|amount| amount.min(ctx.accounts.funder.lamports()))
        .filter(|&amount| amount > 0)
        .map(|amount| {
            system_program::transfer(
                CpiContext::new(
                    ctx.accounts.system_program.to_account_info(),
                    system_program::Transfer {
                        from: ctx.accounts.funder.to_account_info(),
                        to: ctx.accounts.vault.to_account_info(),
                    },
                ),
                amount,
            )
        })
        .transpose()
        .map(|_| ctx.accounts.vault.lamports() >= reward.native_amount)
}
