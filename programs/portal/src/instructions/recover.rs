use anchor_lang::prelude::*;
use anchor_spl::associated_token::get_associated_token_address_with_program_id;
use anchor_spl::token_interface::{close_account, CloseAccount};
use anchor_spl::{token, token_2022};
use intents_svm_std::Bytes32;

use crate::events::IntentTokenRecovered;
use crate::instructions::PortalError;
use crate::state::{vault_pda, VaultState, VAULT_SEED};
use crate::types::{self, Reward, TokenTransferAccounts, VecTokenTransferAccounts};

#[derive(AnchorSerialize, AnchorDeserialize)]
pub struct RecoverTokenArgs {
    pub destination: u64,
    pub route_hash: Bytes32,
    pub reward: Reward,
    pub mint: Pubkey,
}

/// Sweeps a token that was sent to a vault by mistake back to the intent's
/// creator. Reward tokens are explicitly excluded so recovery can never
/// bypass the claim/refund settlement of real reward assets.
#[derive(Accounts)]
pub struct RecoverToken<'info> {
    #[account(mut)]
    pub payer: Signer<'info>,
    /// CHECK: must match the reward's creator
    pub creator: UncheckedAccount<'info>,
    /// CHECK: address is validated
    #[account(mut)]
    pub vault: UncheckedAccount<'info>,
    /// CHECK: address is validated
    pub vault_state: UncheckedAccount<'info>,
    pub token_program: Program<'info, token::Token>,
    pub token_2022_program: Program<'info, token_2022::Token2022>,
    pub system_program: Program<'info, System>,
}

pub fn recover_token_from_vault<'info>(
    ctx: Context<'_, '_, '_, 'info, RecoverToken<'info>>,
    args: RecoverTokenArgs,
) -> Result<()> {
    let RecoverTokenArgs {
        destination,
        route_hash,
        reward,
        mint,
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
        ctx.accounts.creator.key() == reward.creator,
        PortalError::InvalidCreator
    );
    validate_recoverable_mint(&reward, &mint)?;

    // while a native reward is still escrowed, moving vault balances around
    // outside settlement is off-limits
    let status = VaultState::status_of(&ctx.accounts.vault_state)?;
    require!(
        reward.native_amount == 0 || status.is_terminal(),
        PortalError::CannotRecoverWithNativeReward
    );

    let token_accounts = recover_token_accounts(ctx.remaining_accounts, &mint)?;

    let vault_ata = get_associated_token_address_with_program_id(
        ctx.accounts.vault.key,
        &mint,
        token_accounts.token_program_id(),
    );
    require!(
        token_accounts.from.key() == vault_ata,
        PortalError::InvalidAta
    );
    require!(
        token_accounts.to_data()?.owner == reward.creator,
        PortalError::InvalidCreatorToken
    );

    let (_, bump) = vault_pda(&intent_hash);
    let signer_seeds = [VAULT_SEED, intent_hash.as_ref(), &[bump]];
    let token_program = token_accounts.token_program(
        &ctx.accounts.token_program,
        &ctx.accounts.token_2022_program,
    )?;

    token_accounts.transfer_with_signer(
        &token_program,
        &ctx.accounts.vault.to_account_info(),
        &[&signer_seeds],
        token_accounts.from_data()?.amount,
    )?;

    close_account(CpiContext::new_with_signer(
        token_program,
        CloseAccount {
            account: token_accounts.from.to_account_info(),
            destination: ctx.accounts.payer.to_account_info(),
            authority: ctx.accounts.vault.to_account_info(),
        },
        &[&signer_seeds],
    ))?;

    emit!(IntentTokenRecovered::new(intent_hash, mint, reward.creator));

    Ok(())
}

/// The zero identity and every reward mint are off-limits.
pub(crate) fn validate_recoverable_mint(reward: &Reward, mint: &Pubkey) -> Result<()> {
    require!(*mint != Pubkey::default(), PortalError::InvalidRefundToken);
    require!(
        reward.tokens.iter().all(|token| token.token != *mint),
        PortalError::InvalidRefundToken
    );

    Ok(())
}

fn recover_token_accounts<'info>(
    accounts: &[AccountInfo<'info>],
    mint: &Pubkey,
) -> Result<TokenTransferAccounts<'info>> {
    let accounts = VecTokenTransferAccounts::try_from(accounts)?.into_inner();

    match accounts.into_iter().next() {
        Some(token_accounts) if token_accounts.mint.key() == *mint => Ok(token_accounts),
        Some(_) => Err(PortalError::InvalidMint.into()),
        None => Err(PortalError::InvalidTokenTransferAccounts.into()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::TokenAmount;

    fn reward_with_token(mint: Pubkey) -> Reward {
        Reward {
            deadline: 0,
            creator: Pubkey::new_unique(),
            prover: Pubkey::new_unique(),
            native_amount: 0,
            tokens: vec![TokenAmount {
                token: mint,
                amount: 100,
            }],
        }
    }

    #[test]
    fn reward_mint_is_not_recoverable() {
        let mint = Pubkey::new_unique();
        let reward = reward_with_token(mint);

        assert!(validate_recoverable_mint(&reward, &mint).is_err());
    }

    #[test]
    fn zero_mint_is_not_recoverable() {
        let reward = reward_with_token(Pubkey::new_unique());

        assert!(validate_recoverable_mint(&reward, &Pubkey::default()).is_err());
    }

    #[test]
    fn unrelated_mint_is_recoverable() {
        let reward = reward_with_token(Pubkey::new_unique());

        assert!(validate_recoverable_mint(&reward, &Pubkey::new_unique()).is_ok());
    }
}
