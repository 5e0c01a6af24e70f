use std::iter;

use anchor_lang::prelude::*;
use anchor_lang::solana_program::instruction::{AccountMeta, Instruction};
use anchor_lang::solana_program::program::invoke_signed;
use anchor_spl::{associated_token, token, token_2022};
use intents_svm_std::prover::{
    self, IntentHashClaimant, IntentHashesClaimants, PROVE_DISCRIMINATOR,
};
use intents_svm_std::Bytes32;

use crate::events::IntentProven;
use crate::instructions::fulfill::{fulfill_core, FulfillArgs, FulfillContext};
use crate::instructions::PortalError;
use crate::state::{dispatcher_pda, executor_pda, FulfillMarker, DISPATCHER_SEED};
use crate::types::Route;

#[derive(AnchorSerialize, AnchorDeserialize)]
pub struct ProveArgs {
    pub prover: Pubkey,
    pub source: u64,
    pub intent_hashes: Vec<Bytes32>,
    pub data: Vec<u8>,
}

#[derive(Accounts)]
#[instruction(args: ProveArgs)]
pub struct Prove<'info> {
    /// CHECK: address is validated
    #[account(executable, address = args.prover @ PortalError::InvalidProver)]
    pub prover: UncheckedAccount<'info>,
    /// CHECK: address is validated
    #[account(address = dispatcher_pda().0 @ PortalError::InvalidDispatcher)]
    pub dispatcher: UncheckedAccount<'info>,
}

/// Submits a batch of fulfillment records to a prover. All-or-nothing: one
/// unfulfilled hash aborts the whole batch before anything reaches the
/// prover. Remaining accounts are one fulfill marker per hash, in order,
/// followed by whatever accounts the prover's own `prove` needs.
pub fn prove_intents<'info>(
    ctx: Context<'_, '_, '_, 'info, Prove<'info>>,
    args: ProveArgs,
) -> Result<()> {
    let ProveArgs {
        prover: _,
        source,
        intent_hashes,
        data,
    } = args;

    let marker_count = intent_hashes.len();
    require!(
        marker_count <= ctx.remaining_accounts.len(),
        PortalError::InvalidFulfillMarker
    );
    let (markers, prover_accounts) = ctx.remaining_accounts.split_at(marker_count);
    let pairs = claimed_pairs(intent_hashes, markers)?;

    submit_proof(
        &ctx.accounts.prover.to_account_info(),
        &ctx.accounts.dispatcher.to_account_info(),
        prover_accounts,
        source,
        pairs,
        data,
    )
}

pub(crate) fn claimed_pairs(
    intent_hashes: Vec<Bytes32>,
    markers: &[AccountInfo<'_>],
) -> Result<IntentHashesClaimants> {
    intent_hashes
        .into_iter()
        .zip(markers)
        .map(|(intent_hash, marker)| {
            require!(
                marker.key() == FulfillMarker::pda(&intent_hash).0,
                PortalError::InvalidFulfillMarker
            );
            let marker = FulfillMarker::try_from_account_info(marker)?
                .ok_or(PortalError::IntentNotFulfilled)?;

            Ok(IntentHashClaimant::new(intent_hash, marker.claimant))
        })
        .collect()
}

pub(crate) fn submit_proof<'info>(
    prover: &AccountInfo<'info>,
    dispatcher: &AccountInfo<'info>,
    prover_accounts: &[AccountInfo<'info>],
    source: u64,
    pairs: IntentHashesClaimants,
    data: Vec<u8>,
) -> Result<()> {
    let args = prover::ProveArgs::new(source, pairs, data);
    let ix_data: Vec<u8> = PROVE_DISCRIMINATOR
        .into_iter()
        .chain(args.try_to_vec()?)
        .collect();

    let (_, bump) = dispatcher_pda();
    let signer_seeds = [DISPATCHER_SEED, &[bump]];

    let instruction = Instruction::new_with_bytes(
        prover.key(),
        &ix_data,
        iter::once(AccountMeta::new_readonly(dispatcher.key(), true))
            .chain(prover_accounts.iter().map(|account| AccountMeta {
                pubkey: account.key(),
                is_signer: account.is_signer,
                is_writable: account.is_writable,
            }))
            .collect(),
    );

    invoke_signed(
        &instruction,
        iter::once(dispatcher.to_account_info())
            .chain(prover_accounts.iter().cloned())
            .chain(iter::once(prover.to_account_info()))
            .collect::<Vec<_>>()
            .as_slice(),
        &[&signer_seeds],
    )?;

    args.intent_hashes_claimants.iter().for_each(|pair| {
        emit!(IntentProven::new(pair.intent_hash, pair.claimant, source));
    });

    Ok(())
}

#[derive(AnchorSerialize, AnchorDeserialize)]
pub struct FulfillAndProveArgs {
    pub intent_hash: Bytes32,
    pub route: Route,
    pub reward_hash: Bytes32,
    pub claimant: Bytes32,
    pub prover: Pubkey,
    pub source: u64,
    pub data: Vec<u8>,
}

#[derive(Accounts)]
#[instruction(args: FulfillAndProveArgs)]
pub struct FulfillAndProve<'info> {
    #[account(mut)]
    pub payer: Signer<'info>,
    #[account(mut)]
    pub solver: Signer<'info>,
    /// CHECK: address is validated
    #[account(mut, address = executor_pda().0 @ PortalError::InvalidExecutor)]
    pub executor: UncheckedAccount<'info>,
    /// CHECK: address is validated
    #[account(mut)]
    pub fulfill_marker: UncheckedAccount<'info>,
    /// CHECK: address is validated
    #[account(executable, address = args.prover @ PortalError::InvalidProver)]
    pub prover: UncheckedAccount<'info>,
    /// CHECK: address is validated
    #[account(address = dispatcher_pda().0 @ PortalError::InvalidDispatcher)]
    pub dispatcher: UncheckedAccount<'info>,
    pub token_program: Program<'info, token::Token>,
    pub token_2022_program: Program<'info, token_2022::Token2022>,
    pub associated_token_program: Program<'info, associated_token::AssociatedToken>,
    pub system_program: Program<'info, System>,
}

impl<'a, 'info> From<&'a Context<'_, '_, '_, 'info, FulfillAndProve<'info>>>
    for FulfillContext<'a, 'info>
{
    fn from(ctx: &'a Context<'_, '_, '_, 'info, FulfillAndProve<'info>>) -> Self {
        Self {
            payer: &ctx.accounts.payer,
            solver: &ctx.accounts.solver,
            executor: ctx.accounts.executor.to_account_info(),
            fulfill_marker: ctx.accounts.fulfill_marker.to_account_info(),
            token_program: &ctx.accounts.token_program,
            token_2022_program: &ctx.accounts.token_2022_program,
            associated_token_program: &ctx.accounts.associated_token_program,
            system_program: &ctx.accounts.system_program,
        }
    }
}

/// Fulfillment and proof submission for a single intent, atomically: if the
/// proof cannot be submitted the fulfillment rolls back with it.
pub fn fulfill_and_prove_intent<'info>(
    ctx: Context<'_, '_, '_, 'info, FulfillAndProve<'info>>,
    args: FulfillAndProveArgs,
) -> Result<()> {
    let FulfillAndProveArgs {
        intent_hash,
        route,
        reward_hash,
        claimant,
        prover: _,
        source,
        data,
    } = args;
    let fulfill_args = FulfillArgs {
        intent_hash,
        route,
        reward_hash,
        claimant,
    };

    let fulfill = FulfillContext::from(&ctx);
    let (intent_hash, claimant, prover_accounts) =
        fulfill_core(&fulfill, ctx.remaining_accounts, fulfill_args)?;
    let pairs = iter::once(IntentHashClaimant::new(intent_hash, claimant)).collect();

    submit_proof(
        &ctx.accounts.prover.to_account_info(),
        &ctx.accounts.dispatcher.to_account_info(),
        prover_accounts,
        source,
        pairs,
        data,
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn claimed_pairs_requires_fulfilled_markers() {
        let intent_hash: Bytes32 = [1u8; 32].into();
        let (marker_key, _) = FulfillMarker::pda(&intent_hash);
        let owner = crate::ID;
        let mut lamports = 0;
        let mut data = vec![];

        // a marker account that exists at the right address but was never
        // initialized means the intent was not fulfilled
        let marker = AccountInfo::new(
            &marker_key,
            false,
            false,
            &mut lamports,
            &mut data,
            &owner,
            false,
            0,
        );

        let result = claimed_pairs(vec![intent_hash], &[marker]);
        assert!(result.is_err());
    }

    #[test]
    fn claimed_pairs_rejects_wrong_marker_address() {
        let intent_hash: Bytes32 = [1u8; 32].into();
        let wrong_key = Pubkey::new_unique();
        let owner = crate::ID;
        let mut lamports = 0;
        let mut data = vec![];

        let marker = AccountInfo::new(
            &wrong_key,
            false,
            false,
            &mut lamports,
            &mut data,
            &owner,
            false,
            0,
        );

        let result = claimed_pairs(vec![intent_hash], &[marker]);
        assert!(result.is_err());
    }

    #[test]
    fn claimed_pairs_reads_claimants_in_order() {
        let intent_hash: Bytes32 = [1u8; 32].into();
        let claimant: Bytes32 = [9u8; 32].into();
        let (marker_key, bump) = FulfillMarker::pda(&intent_hash);
        let owner = crate::ID;
        let mut lamports = 1;
        let mut data = {
            let marker = FulfillMarker::new(claimant, bump);
            let mut bytes = Vec::new();
            marker.try_serialize(&mut bytes).unwrap();
            bytes
        };

        let marker = AccountInfo::new(
            &marker_key,
            false,
            false,
            &mut lamports,
            &mut data,
            &owner,
            false,
            0,
        );

        let pairs = claimed_pairs(vec![intent_hash], &[marker]).unwrap();
        assert_eq!(pairs.len(), 1);
        let pair = pairs.iter().next().unwrap();
        assert_eq!(pair.intent_hash, intent_hash);
        assert_eq!(pair.claimant, claimant);
    }
}
