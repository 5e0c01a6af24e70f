use anchor_lang::prelude::*;
use anchor_spl::{associated_token, token, token_2022};

use crate::events::IntentFunded;
use crate::instructions::fund_context::PermitTokenContext;
use crate::instructions::PortalError;
use crate::state::{vault_pda, VaultState, VaultStatus, PERMIT_SEED};
use crate::types::{self, Bytes32, Reward};

#[derive(AnchorSerialize, AnchorDeserialize)]
pub struct FundForArgs {
    pub destination: u64,
    pub route_hash: Bytes32,
    pub reward: Reward,
    pub allow_partial: bool,
}

/// Funds a vault on behalf of `funder`, who does not sign: each funding
/// token account must instead carry an SPL delegate approval for the
/// funder's permit PDA. Native value cannot be delegated this way, so a
/// reward carrying native value is only accepted while the vault holds no
/// lamports yet.
#[derive(Accounts)]
pub struct FundFor<'info> {
    #[account(mut)]
    pub payer: Signer<'info>,
    /// CHECK: not a signer; token delegations to the permit PDA stand in
    /// for the funder's signature
    pub funder: UncheckedAccount<'info>,
    /// CHECK: derived from the funder, validated by seeds
    #[account(
        seeds = [PERMIT_SEED, funder.key().as_ref()],
        bump,
    )]
    pub permit: UncheckedAccount<'info>,
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

pub fn fund_intent_for<'info>(
    ctx: Context<'_, '_, '_, 'info, FundFor<'info>>,
    args: FundForArgs,
) -> Result<()> {
    let FundForArgs {
        destination,
        route_hash,
        reward,
        allow_partial,
    } = args;
    let intent_hash = types::intent_hash(destination, &route_hash, &reward.hash());

    require!(
        ctx.accounts.vault.key() == vault_pda(&intent_hash).0,
        PortalError::InvalidVault
    );
    require!(
        ctx.accounts.vault_state.key() == VaultState::pda(&intent_hash).0,
        PortalError::InvalidVaultState
    );
    require!(
        reward.native_amount == 0 || ctx.accounts.vault.lamports() == 0,
        PortalError::CannotFundForWithNativeReward
    );

    let status = VaultState::status_of(&ctx.accounts.vault_state)?;
    require!(!status.is_terminal(), PortalError::IntentAlreadyFunded);

    let funder = ctx.accounts.funder.key();
    let reward_token_amounts = reward.token_amounts()?;
    let funded_mints = PermitTokenContext::new(&ctx, funder)
        .fund_tokens(ctx.remaining_accounts.try_into()?, &reward_token_amounts)?;
    let tokens_funded = funded_mints.iter().eq(reward_token_amounts.keys());

    let native_funded = ctx.accounts.vault.lamports() >= reward.native_amount;
    let complete = native_funded && tokens_funded;
    if !complete && !allow_partial {
        return Err(match native_funded {
            false => PortalError::InsufficientNativeReward,
            true => PortalError::InvalidPermitAllowance,
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
        &intent_hash,
        status.max(funded_status),
    )?;

    emit!(IntentFunded::new(intent_hash, funder, complete));

    Ok(())
}
