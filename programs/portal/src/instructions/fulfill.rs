use std::iter;

use anchor_lang::prelude::*;
use anchor_lang::solana_program::instruction::{AccountMeta, Instruction};
use anchor_lang::solana_program::program::invoke_signed;
use anchor_lang::solana_program::system_instruction;
use anchor_lang::system_program;
use anchor_spl::{associated_token, token, token_2022};
use intents_svm_std::prover;
use intents_svm_std::{Bytes32, CHAIN_ID};

use crate::events::IntentFulfilled;
use crate::instructions::fund_context::FundTokenContext;
use crate::instructions::PortalError;
use crate::state::{executor_pda, FulfillMarker, EXECUTOR_SEED, FULFILL_MARKER_SEED};
use crate::types::{
    self, Calldata, CalldataWithAccounts, Route, VEC_TOKEN_TRANSFER_ACCOUNTS_CHUNK_SIZE,
};

#[derive(AnchorSerialize, AnchorDeserialize)]
pub struct FulfillArgs {
    pub intent_hash: Bytes32,
    pub route: Route,
    pub reward_hash: Bytes32,
    pub claimant: Bytes32,
}

#[derive(Accounts)]
pub struct Fulfill<'info> {
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
    pub token_program: Program<'info, token::Token>,
    pub token_2022_program: Program<'info, token_2022::Token2022>,
    pub associated_token_program: Program<'info, associated_token::AssociatedToken>,
    pub system_program: Program<'info, System>,
}

pub fn fulfill_intent<'info>(
    ctx: Context<'_, '_, '_, 'info, Fulfill<'info>>,
    args: FulfillArgs,
) -> Result<()> {
    let fulfill = FulfillContext::from(&ctx);
    fulfill_core(&fulfill, ctx.remaining_accounts, args)?;

    Ok(())
}

/// The fulfillment accounts detached from any particular instruction
/// context, so `fulfill` and `fulfill_and_prove` share one engine.
pub(crate) struct FulfillContext<'a, 'info> {
    pub payer: &'a Signer<'info>,
    pub solver: &'a Signer<'info>,
    pub executor: AccountInfo<'info>,
    pub fulfill_marker: AccountInfo<'info>,
    pub token_program: &'a Program<'info, token::Token>,
    pub token_2022_program: &'a Program<'info, token_2022::Token2022>,
    pub associated_token_program: &'a Program<'info, associated_token::AssociatedToken>,
    pub system_program: &'a Program<'info, System>,
}

impl<'a, 'info> From<&'a Context<'_, '_, '_, 'info, Fulfill<'info>>> for FulfillContext<'a, 'info> {
    fn from(ctx: &'a Context<'_, '_, '_, 'info, Fulfill<'info>>) -> Self {
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

/// Runs the full fulfillment pipeline and returns the intent hash, the
/// claimant, and whatever remaining accounts the route's calls did not
/// consume (a composed prove step uses those).
pub(crate) fn fulfill_core<'c, 'info>(
    fulfill: &FulfillContext<'_, 'info>,
    accounts: &'c [AccountInfo<'info>],
    args: FulfillArgs,
) -> Result<(Bytes32, Bytes32, &'c [AccountInfo<'info>])> {
    let FulfillArgs {
        intent_hash,
        route,
        reward_hash,
        claimant,
    } = args;

    require!(
        Clock::get()?.unix_timestamp <= route.deadline,
        PortalError::IntentExpired
    );
    // a route bound to another deployment must not be replayable here
    require!(route.portal == crate::ID, PortalError::InvalidPortal);

    let split_index = route.tokens.len() * VEC_TOKEN_TRANSFER_ACCOUNTS_CHUNK_SIZE;
    require!(
        split_index <= accounts.len(),
        PortalError::InvalidTokenTransferAccounts
    );
    let (token_transfer_accounts, call_accounts) = accounts.split_at(split_index);

    let (route, call_plans, rest) = plan_route_calls(route, call_accounts)?;

    let computed_hash = types::intent_hash(CHAIN_ID, &route.hash(), &reward_hash);
    require!(computed_hash == intent_hash, PortalError::InvalidHash);
    require!(!claimant.is_zero(), PortalError::ZeroClaimant);

    // record the claimant before any external interaction: a malicious call
    // target re-entering fulfill for the same hash fails the write-once
    // marker and the whole transaction unwinds
    mark_fulfilled(fulfill, &intent_hash, &claimant)?;

    fund_executor(fulfill, &route, token_transfer_accounts)?;
    fund_executor_native(fulfill, route.required_native()?)?;
    execute_call_plans(fulfill, call_plans)?;

    emit!(IntentFulfilled::new(intent_hash, claimant));

    Ok((intent_hash, claimant, rest))
}

/// One route call ready to run: the target account, the decoded minimal
/// calldata, and the accounts the call consumes from the transaction. The
/// first account of each call's group is the target itself.
pub(crate) struct CallPlan<'info> {
    pub target: AccountInfo<'info>,
    pub calldata: Calldata,
    pub value: u64,
    pub accounts: Vec<AccountInfo<'info>>,
}

/// Rebuilds the canonical route from the minimal fulfill form: each call's
/// data is re-expanded to `CalldataWithAccounts` using the accounts
/// provided in the transaction, since that is the form the route hash
/// commits to.
fn plan_route_calls<'c, 'info>(
    mut route: Route,
    accounts: &'c [AccountInfo<'info>],
) -> Result<(Route, Vec<CallPlan<'info>>, &'c [AccountInfo<'info>])> {
    let mut accounts_iter = accounts.iter();
    let mut plans = Vec::with_capacity(route.calls.len());

    route.calls.iter_mut().try_for_each(|call| {
        let calldata =
            Calldata::try_from_slice(&call.data).map_err(|_| PortalError::InvalidCalldata)?;
        let target = accounts_iter
            .next()
            .ok_or(PortalError::InvalidCallTarget)?;
        require!(call.target == *target.key, PortalError::InvalidCallTarget);

        let call_accounts: Vec<_> = accounts_iter
            .by_ref()
            .take(calldata.account_count as usize)
            .map(ToAccountInfo::to_account_info)
            .collect();
        require!(
            call_accounts.len() == calldata.account_count as usize,
            PortalError::InvalidCalldata
        );

        call.data = CalldataWithAccounts::new(calldata.clone(), call_accounts.clone())?
            .try_to_vec()?;

        plans.push(CallPlan {
            target: target.to_account_info(),
            calldata,
            value: call.value,
            accounts: call_accounts,
        });

        Result::Ok(())
    })?;

    Ok((route, plans, accounts_iter.as_slice()))
}

fn mark_fulfilled(
    fulfill: &FulfillContext<'_, '_>,
    intent_hash: &Bytes32,
    claimant: &Bytes32,
) -> Result<()> {
    use intents_svm_std::account::AccountExt;

    let (fulfill_marker, bump) = FulfillMarker::pda(intent_hash);
    require!(
        fulfill.fulfill_marker.key() == fulfill_marker,
        PortalError::InvalidFulfillMarker
    );
    let signer_seeds: &[&[u8]] = &[FULFILL_MARKER_SEED, intent_hash.as_ref(), &[bump]];

    FulfillMarker::new(*claimant, bump)
        .init(
            &fulfill.fulfill_marker,
            &fulfill.payer.to_account_info(),
            fulfill.system_program,
            &[signer_seeds],
        )
        .map_err(|_| PortalError::IntentAlreadyFulfilled.into())
}

/// Pulls the route's token prefunding from the solver into the executor.
/// Unlike vault funding there is no partial mode: fulfillment needs every
/// token in full before the calls run.
fn fund_executor<'info>(
    fulfill: &FulfillContext<'_, 'info>,
    route: &Route,
    accounts: &[AccountInfo<'info>],
) -> Result<()> {
    let route_token_amounts = route.token_amounts()?;
    let funded_mints =
        FundTokenContext::from(fulfill).fund_tokens(accounts.try_into()?, &route_token_amounts)?;

    require!(
        funded_mints.iter().eq(route_token_amounts.keys()),
        PortalError::InsufficientTokenAllowance
    );

    Ok(())
}

fn fund_executor_native<'info>(fulfill: &FulfillContext<'_, 'info>, amount: u64) -> Result<()> {
    match amount {
        0 => Ok(()),
        amount => system_program::transfer(
            CpiContext::new(
                fulfill.system_program.to_account_info(),
                system_program::Transfer {
                    from: fulfill.solver.to_account_info(),
                    to: fulfill.executor.clone(),
                },
            ),
            amount,
        ),
    }
}

fn execute_call_plans<'info>(
    fulfill: &FulfillContext<'_, 'info>,
    call_plans: Vec<CallPlan<'info>>,
) -> Result<()> {
    let (_, bump) = executor_pda();
    let signer_seeds = [EXECUTOR_SEED, &[bump]];

    call_plans
        .into_iter()
        .try_for_each(|plan| execute_call(fulfill, plan, &signer_seeds))
}

fn execute_call<'info>(
    fulfill: &FulfillContext<'_, 'info>,
    plan: CallPlan<'info>,
    signer_seeds: &[&[u8]],
) -> Result<()> {
    let target_key = plan.target.key();
    validate_call_target(plan.target.executable, &plan.calldata.data, &target_key)?;

    if plan.value > 0 {
        invoke_signed(
            &system_instruction::transfer(&fulfill.executor.key(), &target_key, plan.value),
            &[
                fulfill.executor.clone(),
                plan.target.clone(),
                fulfill.system_program.to_account_info(),
            ],
            &[signer_seeds],
        )?;
    }

    if plan.calldata.data.is_empty() {
        return Ok(());
    }

    let executor_key = fulfill.executor.key();
    let instruction = Instruction::new_with_bytes(
        target_key,
        &plan.calldata.data,
        plan.accounts
            .iter()
            .map(|account| AccountMeta {
                pubkey: account.key(),
                is_signer: account.is_signer || account.key() == executor_key,
                is_writable: account.is_writable,
            })
            .collect(),
    );
    let account_infos: Vec<_> = plan
        .accounts
        .iter()
        .cloned()
        .chain(iter::once(plan.target))
        .collect();

    invoke_signed(&instruction, &account_infos, &[signer_seeds]).map_err(|err| {
        msg!("route call to {} failed: {:?}", target_key, err);
        error!(PortalError::CallFailed)
    })
}

/// Safety gate for untrusted route calls: payload-bearing calls must have
/// an executable target, and no call may reach into the proving subsystem.
pub(crate) fn validate_call_target(
    executable: bool,
    data: &[u8],
    program_id: &Pubkey,
) -> Result<()> {
    require!(executable || data.is_empty(), PortalError::CallToEoa);
    require!(!prover::is_prover(program_id), PortalError::CallToProver);

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn payload_call_to_account_without_code_fails() {
        let target = Pubkey::new_unique();

        assert!(validate_call_target(false, &[1, 2, 3], &target).is_err());
    }

    #[test]
    fn value_only_call_to_account_without_code_passes() {
        let target = Pubkey::new_unique();

        assert!(validate_call_target(false, &[], &target).is_ok());
    }

    #[test]
    fn call_into_prover_fails() {
        assert!(validate_call_target(true, &[1], &prover::HYPER_PROVER_ID).is_err());
        assert!(validate_call_target(true, &[1], &prover::LOCAL_PROVER_ID).is_err());
    }

    #[test]
    fn call_to_ordinary_program_passes() {
        assert!(validate_call_target(true, &[1, 2, 3], &Pubkey::new_unique()).is_ok());
    }
}
