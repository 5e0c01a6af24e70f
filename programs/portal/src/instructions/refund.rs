use anchor_lang::prelude::*;
use anchor_lang::solana_program::program::invoke_signed;
use anchor_lang::solana_program::system_instruction;
use anchor_spl::associated_token::get_associated_token_address_with_program_id;
use anchor_spl::token_interface::{close_account, CloseAccount};
use anchor_spl::{token, token_2022};
use intents_svm_std::prover::Proof;
use intents_svm_std::Bytes32;

use crate::events::IntentRefunded;
use crate::instructions::withdraw::SettlementPrograms;
use crate::instructions::PortalError;
use crate::state::{vault_pda, VaultState, VaultStatus, VAULT_SEED};
use crate::types::{
    self, Reward, TokenTransferAccounts, VecTokenTransferAccounts,
    VEC_TOKEN_TRANSFER_ACCOUNTS_CHUNK_SIZE,
};

#[derive(AnchorSerialize, AnchorDeserialize)]
pub struct RefundArgs {
    pub destination: u64,
    pub route_hash: Bytes32,
    pub reward: Reward,
}

#[derive(Accounts)]
pub struct Refund<'info> {
    #[account(mut)]
    pub payer: Signer<'info>,
    /// CHECK: must match the reward's creator
    #[account(mut)]
    pub creator: UncheckedAccount<'info>,
    /// CHECK: address is validated
    #[account(mut)]
    pub vault: UncheckedAccount<'info>,
    /// CHECK: address is validated
    #[account(mut)]
    pub vault_state: UncheckedAccount<'info>,
    /// CHECK: address is validated
    pub proof: UncheckedAccount<'info>,
    pub token_program: Program<'info, token::Token>,
    pub token_2022_program: Program<'info, token_2022::Token2022>,
    pub system_program: Program<'info, System>,
}

pub fn refund_intent<'info>(
    ctx: Context<'_, '_, '_, 'info, Refund<'info>>,
    args: RefundArgs,
) -> Result<()> {
    let RefundArgs {
        destination,
        route_hash,
        reward,
    } = args;
    let accounts = RefundAccounts {
        creator: ctx.accounts.creator.to_account_info(),
        vault: ctx.accounts.vault.to_account_info(),
        vault_state: ctx.accounts.vault_state.to_account_info(),
        proof: ctx.accounts.proof.to_account_info(),
        token_accounts: VecTokenTransferAccounts::try_from(ctx.remaining_accounts)?.into_inner(),
    };
    let programs = SettlementPrograms {
        payer: ctx.accounts.payer.to_account_info(),
        token_program: &ctx.accounts.token_program,
        token_2022_program: &ctx.accounts.token_2022_program,
        system_program: &ctx.accounts.system_program,
    };

    refund_one(&programs, &accounts, destination, route_hash, &reward)
}

pub(crate) struct RefundAccounts<'info> {
    pub creator: AccountInfo<'info>,
    pub vault: AccountInfo<'info>,
    pub vault_state: AccountInfo<'info>,
    pub proof: AccountInfo<'info>,
    pub token_accounts: Vec<TokenTransferAccounts<'info>>,
}

impl<'info> RefundAccounts<'info> {
    const FIXED_LEN: usize = 4;

    pub fn split_from(
        reward: &Reward,
        accounts: &[AccountInfo<'info>],
    ) -> Result<(Self, usize)> {
        let len =
            Self::FIXED_LEN + reward.token_amounts()?.len() * VEC_TOKEN_TRANSFER_ACCOUNTS_CHUNK_SIZE;
        let accounts = accounts
            .get(..len)
            .ok_or(PortalError::InvalidTokenTransferAccounts)?;

        match accounts {
            [creator, vault, vault_state, proof, token_accounts @ ..] => Ok((
                Self {
                    creator: creator.to_account_info(),
                    vault: vault.to_account_info(),
                    vault_state: vault_state.to_account_info(),
                    proof: proof.to_account_info(),
                    token_accounts: VecTokenTransferAccounts::try_from(token_accounts)?
                        .into_inner(),
                },
                len,
            )),
            _ => Err(PortalError::InvalidTokenTransferAccounts.into()),
        }
    }
}

/// A same-destination proof with a claimant blocks refunding; a proof for
/// another destination does not, since that claim belongs to the prover's
/// dispute process and this reward was never settled.
pub(crate) fn refund_allowed(proof: Option<Proof>, destination: u64) -> bool {
    !matches!(
        proof,
        Some(proof) if proof.destination == destination && !proof.claimant.is_zero()
    )
}

pub(crate) fn refund_one<'info>(
    programs: &SettlementPrograms<'_, 'info>,
    accounts: &RefundAccounts<'info>,
    destination: u64,
    route_hash: Bytes32,
    reward: &Reward,
) -> Result<()> {
    let intent_hash = types::intent_hash(destination, &route_hash, &reward.hash());

    require!(
        accounts.vault.key() == vault_pda(&intent_hash).0,
        PortalError::InvalidVault
    );
    require!(
        accounts.vault_state.key() == VaultState::pda(&intent_hash).0,
        PortalError::InvalidVaultState
    );
    require!(
        accounts.proof.key() == Proof::pda(&intent_hash, &reward.prover).0,
        PortalError::InvalidProofAccount
    );
    require!(
        accounts.creator.key() == reward.creator,
        PortalError::InvalidCreator
    );

    // already resolved: re-emit without moving funds, so batches mixing
    // resolved and unresolved intents do not revert
    if VaultState::status_of(&accounts.vault_state)?.is_terminal() {
        emit!(IntentRefunded::new(intent_hash, reward.creator));

        return Ok(());
    }

    require!(
        refund_allowed(Proof::try_from_account_info(&accounts.proof)?, destination),
        PortalError::IntentNotClaimed
    );
    require!(
        reward.deadline <= Clock::get()?.unix_timestamp,
        PortalError::IntentNotExpired
    );

    VaultState::store(
        &accounts.vault_state,
        &programs.payer,
        programs.system_program,
        &intent_hash,
        VaultStatus::Refunded,
    )?;

    let (_, bump) = vault_pda(&intent_hash);
    let signer_seeds = [VAULT_SEED, intent_hash.as_ref(), &[bump]];

    refund_native(programs, accounts, &signer_seeds)?;
    refund_tokens(programs, accounts, &signer_seeds)?;

    emit!(IntentRefunded::new(intent_hash, reward.creator));

    Ok(())
}

/// Returns whatever the vault actually holds, not what the reward promised.
fn refund_native<'info>(
    programs: &SettlementPrograms<'_, 'info>,
    accounts: &RefundAccounts<'info>,
    signer_seeds: &[&[u8]],
) -> Result<()> {
    match accounts.vault.lamports() {
        0 => Ok(()),
        amount => invoke_signed(
            &system_instruction::transfer(&accounts.vault.key(), &accounts.creator.key(), amount),
            &[
                accounts.vault.to_account_info(),
                accounts.creator.to_account_info(),
                programs.system_program.to_account_info(),
            ],
            &[signer_seeds],
        )
        .map_err(Into::into),
    }
}

fn refund_tokens<'info>(
    programs: &SettlementPrograms<'_, 'info>,
    accounts: &RefundAccounts<'info>,
    signer_seeds: &[&[u8]],
) -> Result<()> {
    accounts
        .token_accounts
        .iter()
        .try_for_each(|token_accounts| refund_token(programs, accounts, signer_seeds, token_accounts))
}

fn refund_token<'info>(
    programs: &SettlementPrograms<'_, 'info>,
    accounts: &RefundAccounts<'info>,
    signer_seeds: &[&[u8]],
    token_accounts: &TokenTransferAccounts<'info>,
) -> Result<()> {
    if token_accounts.from.data_is_empty() {
        return Ok(());
    }

    let vault_ata = get_associated_token_address_with_program_id(
        accounts.vault.key,
        token_accounts.mint.key,
        token_accounts.token_program_id(),
    );

    require!(
        token_accounts.from.key() == vault_ata,
        PortalError::InvalidAta
    );
    require!(
        token_accounts.to_data()?.owner == accounts.creator.key(),
        PortalError::InvalidCreatorToken
    );

    let token_program = token_accounts.token_program(
        programs.token_program,
        programs.token_2022_program,
    )?;

    token_accounts.transfer_with_signer(
        &token_program,
        &accounts.vault,
        &[signer_seeds],
        token_accounts.from_data()?.amount,
    )?;

    close_account(CpiContext::new_with_signer(
        token_program,
        CloseAccount {
            account: token_accounts.from.to_account_info(),
            destination: programs.payer.to_account_info(),
            authority: accounts.vault.to_account_info(),
        },
        &[signer_seeds],
    ))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn refund_allowed_without_proof() {
        assert!(refund_allowed(None, 10));
    }

    #[test]
    fn refund_blocked_by_same_destination_claim() {
        let proof = Proof::new(10, [1u8; 32].into());

        assert!(!refund_allowed(Some(proof), 10));
    }

    #[test]
    fn refund_allowed_when_claim_is_for_other_destination() {
        let proof = Proof::new(11, [1u8; 32].into());

        assert!(refund_allowed(Some(proof), 10));
    }

    #[test]
    fn refund_allowed_when_claimant_is_zero() {
        let proof = Proof::new(10, Bytes32::ZERO);

        assert!(refund_allowed(Some(proof), 10));
    }
}
