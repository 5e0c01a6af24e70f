use std::collections::BTreeMap;

use anchor_lang::prelude::*;
use anchor_lang::solana_program::instruction::{AccountMeta, Instruction};
use anchor_lang::solana_program::program::invoke_signed;
use anchor_lang::solana_program::system_instruction;
use anchor_spl::associated_token::get_associated_token_address_with_program_id;
use anchor_spl::{token, token_2022};
use intents_svm_std::prover::{self, Proof, CHALLENGE_INTENT_PROOF_DISCRIMINATOR};
use intents_svm_std::Bytes32;

use crate::events::{IntentProofChallenged, IntentWithdrawn};
use crate::instructions::PortalError;
use crate::state::{
    dispatcher_pda, vault_pda, VaultState, VaultStatus, DISPATCHER_SEED, VAULT_SEED,
};
use crate::types::{
    self, Reward, TokenTransferAccounts, VecTokenTransferAccounts,
    VEC_TOKEN_TRANSFER_ACCOUNTS_CHUNK_SIZE,
};

#[derive(AnchorSerialize, AnchorDeserialize)]
pub struct WithdrawArgs {
    pub destination: u64,
    pub route_hash: Bytes32,
    pub reward: Reward,
}

#[derive(Accounts)]
#[instruction(args: WithdrawArgs)]
pub struct Withdraw<'info> {
    #[account(mut)]
    pub payer: Signer<'info>,
    /// CHECK: must match the claimant the proof names
    #[account(mut)]
    pub claimant: UncheckedAccount<'info>,
    /// CHECK: address is validated
    #[account(mut)]
    pub vault: UncheckedAccount<'info>,
    /// CHECK: address is validated
    #[account(mut)]
    pub vault_state: UncheckedAccount<'info>,
    /// CHECK: address is validated
    #[account(mut)]
    pub proof: UncheckedAccount<'info>,
    /// CHECK: address is validated
    #[account(executable, address = args.reward.prover @ PortalError::InvalidProver)]
    pub prover: UncheckedAccount<'info>,
    /// CHECK: address is validated
    #[account(address = dispatcher_pda().0 @ PortalError::InvalidDispatcher)]
    pub dispatcher: UncheckedAccount<'info>,
    pub token_program: Program<'info, token::Token>,
    pub token_2022_program: Program<'info, token_2022::Token2022>,
    pub system_program: Program<'info, System>,
}

pub fn withdraw_intent<'info>(
    ctx: Context<'_, '_, '_, 'info, Withdraw<'info>>,
    args: WithdrawArgs,
) -> Result<()> {
    let WithdrawArgs {
        destination,
        route_hash,
        reward,
    } = args;
    let accounts = WithdrawAccounts {
        claimant: ctx.accounts.claimant.to_account_info(),
        vault: ctx.accounts.vault.to_account_info(),
        vault_state: ctx.accounts.vault_state.to_account_info(),
        proof: ctx.accounts.proof.to_account_info(),
        prover: ctx.accounts.prover.to_account_info(),
        token_accounts: VecTokenTransferAccounts::try_from(ctx.remaining_accounts)?.into_inner(),
    };
    let programs = SettlementPrograms {
        payer: ctx.accounts.payer.to_account_info(),
        token_program: &ctx.accounts.token_program,
        token_2022_program: &ctx.accounts.token_2022_program,
        system_program: &ctx.accounts.system_program,
    };

    withdraw_one(
        &programs,
        &ctx.accounts.dispatcher.to_account_info(),
        &accounts,
        destination,
        route_hash,
        &reward,
    )
}

/// The fixed accounts every source-side settlement operation needs,
/// separated from the per-intent bundle so batches can share them.
pub(crate) struct SettlementPrograms<'a, 'info> {
    pub payer: AccountInfo<'info>,
    pub token_program: &'a Program<'info, token::Token>,
    pub token_2022_program: &'a Program<'info, token_2022::Token2022>,
    pub system_program: &'a Program<'info, System>,
}

/// Per-intent accounts of a withdraw, buildable from named instruction
/// accounts or carved out of a batch's remaining accounts.
pub(crate) struct WithdrawAccounts<'info> {
    pub claimant: AccountInfo<'info>,
    pub vault: AccountInfo<'info>,
    pub vault_state: AccountInfo<'info>,
    pub proof: AccountInfo<'info>,
    pub prover: AccountInfo<'info>,
    pub token_accounts: Vec<TokenTransferAccounts<'info>>,
}

impl<'info> WithdrawAccounts<'info> {
    const FIXED_LEN: usize = 5;

    /// Splits one intent's account group off the front of `accounts`:
    /// `[claimant, vault, vault_state, proof, prover]` followed by one
    /// token transfer triple per distinct reward mint. Returns the group
    /// and how many accounts it consumed.
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
            [claimant, vault, vault_state, proof, prover, token_accounts @ ..] => Ok((
                Self {
                    claimant: claimant.to_account_info(),
                    vault: vault.to_account_info(),
                    vault_state: vault_state.to_account_info(),
                    proof: proof.to_account_info(),
                    prover: prover.to_account_info(),
                    token_accounts: VecTokenTransferAccounts::try_from(token_accounts)?
                        .into_inner(),
                },
                len,
            )),
            _ => Err(PortalError::InvalidTokenTransferAccounts.into()),
        }
    }
}

/// How a recorded proof resolves a withdraw attempt.
#[derive(Debug, PartialEq, Eq)]
pub(crate) enum ProofDisposition {
    /// No proof, or a proof without a claimant: nothing to pay out yet.
    Unproven,
    /// A claimant exists but the proof names another destination; the
    /// conflict goes to the prover's dispute process, not settled here.
    WrongDestination(u64),
    Claimable(Bytes32),
}

pub(crate) fn proof_disposition(proof: Option<Proof>, destination: u64) -> ProofDisposition {
    match proof {
        Some(proof) if proof.claimant.is_zero() => ProofDisposition::Unproven,
        Some(proof) if proof.destination != destination => {
            ProofDisposition::WrongDestination(proof.destination)
        }
        Some(proof) => ProofDisposition::Claimable(proof.claimant),
        None => ProofDisposition::Unproven,
    }
}

pub(crate) fn withdraw_one<'info>(
    programs: &SettlementPrograms<'_, 'info>,
    dispatcher: &AccountInfo<'info>,
    accounts: &WithdrawAccounts<'info>,
    destination: u64,
    route_hash: Bytes32,
    reward: &Reward,
) -> Result<()> {
    let reward_hash = reward.hash();
    let intent_hash = types::intent_hash(destination, &route_hash, &reward_hash);

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
        accounts.prover.key() == reward.prover,
        PortalError::InvalidProver
    );

    match proof_disposition(Proof::try_from_account_info(&accounts.proof)?, destination) {
        ProofDisposition::Unproven => Err(PortalError::UnauthorizedWithdrawal.into()),
        ProofDisposition::WrongDestination(proven_destination) => challenge_proof(
            dispatcher,
            accounts,
            &intent_hash,
            destination,
            proven_destination,
            &route_hash,
            &reward_hash,
            reward,
        ),
        ProofDisposition::Claimable(claimant) => {
            claim(programs, accounts, &intent_hash, claimant, reward)
        }
    }
}

/// Disputes a proof recorded against the wrong destination through the
/// prover's own resolution process. Deliberately leaves the vault state
/// untouched.
#[allow(clippy::too_many_arguments)]
fn challenge_proof<'info>(
    dispatcher: &AccountInfo<'info>,
    accounts: &WithdrawAccounts<'info>,
    intent_hash: &Bytes32,
    destination: u64,
    proven_destination: u64,
    route_hash: &Bytes32,
    reward_hash: &Bytes32,
    reward: &Reward,
) -> Result<()> {
    let args = prover::ChallengeArgs::new(destination, *route_hash, *reward_hash);
    let ix_data: Vec<u8> = CHALLENGE_INTENT_PROOF_DISCRIMINATOR
        .into_iter()
        .chain(args.try_to_vec()?)
        .collect();

    let (_, bump) = dispatcher_pda();
    let signer_seeds = [DISPATCHER_SEED, &[bump]];

    let instruction = Instruction::new_with_bytes(
        reward.prover,
        &ix_data,
        vec![
            AccountMeta::new_readonly(dispatcher.key(), true),
            AccountMeta::new(accounts.proof.key(), false),
        ],
    );

    invoke_signed(
        &instruction,
        &[
            dispatcher.to_account_info(),
            accounts.proof.to_account_info(),
            accounts.prover.to_account_info(),
        ],
        &[&signer_seeds],
    )?;

    emit!(IntentProofChallenged::new(
        *intent_hash,
        destination,
        proven_destination
    ));

    Ok(())
}

fn claim<'info>(
    programs: &SettlementPrograms<'_, 'info>,
    accounts: &WithdrawAccounts<'info>,
    intent_hash: &Bytes32,
    claimant: Bytes32,
    reward: &Reward,
) -> Result<()> {
    let status = VaultState::status_of(&accounts.vault_state)?;
    require!(!status.is_terminal(), PortalError::RewardsAlreadyWithdrawn);
    require!(
        accounts.claimant.key() == claimant.narrow_pubkey(),
        PortalError::InvalidClaimant
    );

    // status first, transfers second: the transition is the claim's one
    // irreversible effect and everything after it settles balances
    VaultState::store(
        &accounts.vault_state,
        &programs.payer,
        programs.system_program,
        intent_hash,
        VaultStatus::Claimed,
    )?;

    let (_, bump) = vault_pda(intent_hash);
    let signer_seeds = [VAULT_SEED, intent_hash.as_ref(), &[bump]];

    withdraw_native(programs, accounts, reward, &signer_seeds)?;
    withdraw_tokens(programs, accounts, reward, &signer_seeds)?;

    emit!(IntentWithdrawn::new(*intent_hash, accounts.claimant.key()));

    Ok(())
}

/// Pays out at most the reward's native amount, and no more than the vault
/// actually holds: a vault that was never fully funded pays what it has.
fn withdraw_native<'info>(
    programs: &SettlementPrograms<'_, 'info>,
    accounts: &WithdrawAccounts<'info>,
    reward: &Reward,
    signer_seeds: &[&[u8]],
) -> Result<()> {
    match reward.native_amount.min(accounts.vault.lamports()) {
        0 => Ok(()),
        amount => invoke_signed(
            &system_instruction::transfer(&accounts.vault.key(), &accounts.claimant.key(), amount),
            &[
                accounts.vault.to_account_info(),
                accounts.claimant.to_account_info(),
                programs.system_program.to_account_info(),
            ],
            &[signer_seeds],
        )
        .map_err(Into::into),
    }
}

fn withdraw_tokens<'info>(
    programs: &SettlementPrograms<'_, 'info>,
    accounts: &WithdrawAccounts<'info>,
    reward: &Reward,
    signer_seeds: &[&[u8]],
) -> Result<()> {
    let mints: std::collections::BTreeSet<_> = accounts
        .token_accounts
        .iter()
        .map(|token_accounts| token_accounts.mint.key())
        .collect();
    let reward_token_amounts = reward.token_amounts()?;

    require!(
        mints.len() == accounts.token_accounts.len()
            && mints.iter().eq(reward_token_amounts.keys()),
        PortalError::InvalidMint
    );

    accounts.token_accounts.iter().try_for_each(|token_accounts| {
        withdraw_token(
            programs,
            accounts,
            &reward_token_amounts,
            signer_seeds,
            token_accounts,
        )
    })
}

fn withdraw_token<'info>(
    programs: &SettlementPrograms<'_, 'info>,
    accounts: &WithdrawAccounts<'info>,
    reward_token_amounts: &BTreeMap<Pubkey, u64>,
    signer_seeds: &[&[u8]],
    token_accounts: &TokenTransferAccounts<'info>,
) -> Result<()> {
    // a mint the vault never received has no ATA; it contributes nothing
    if token_accounts.from.data_is_empty() {
        return Ok(());
    }

    let mint_key = token_accounts.mint.key();
    let vault_ata = get_associated_token_address_with_program_id(
        accounts.vault.key,
        &mint_key,
        token_accounts.token_program_id(),
    );

    require!(
        token_accounts.from.key() == vault_ata,
        PortalError::InvalidAta
    );
    require!(
        token_accounts.to_data()?.owner == accounts.claimant.key(),
        PortalError::InvalidClaimantToken
    );

    let reward_token_amount = *reward_token_amounts
        .get(&mint_key)
        .ok_or(PortalError::InvalidMint)?;
    let token_program = token_accounts.token_program(
        programs.token_program,
        programs.token_2022_program,
    )?;
    let amount = reward_token_amount.min(token_accounts.from_data()?.amount);

    token_accounts.transfer_with_signer(&token_program, &accounts.vault, &[signer_seeds], amount)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn disposition_without_proof_is_unproven() {
        assert_eq!(proof_disposition(None, 10), ProofDisposition::Unproven);
    }

    #[test]
    fn disposition_with_zero_claimant_is_unproven() {
        let proof = Proof::new(10, Bytes32::ZERO);

        assert_eq!(
            proof_disposition(Some(proof), 10),
            ProofDisposition::Unproven
        );
    }

    #[test]
    fn disposition_with_wrong_destination_is_challenged() {
        let proof = Proof::new(11, [1u8; 32].into());

        assert_eq!(
            proof_disposition(Some(proof), 10),
            ProofDisposition::WrongDestination(11)
        );
    }

    #[test]
    fn disposition_with_matching_proof_is_claimable() {
        let claimant: Bytes32 = [1u8; 32].into();
        let proof = Proof::new(10, claimant);

        assert_eq!(
            proof_disposition(Some(proof), 10),
            ProofDisposition::Claimable(claimant)
        );
    }
}
