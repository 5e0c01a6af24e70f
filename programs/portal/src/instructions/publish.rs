use anchor_lang::prelude::*;

use crate::events::IntentPublished;
use crate::instructions::{fund, Fund, PortalError};
use crate::state::VaultState;
use crate::types::{self, Bytes32, Reward};

#[derive(AnchorSerialize, AnchorDeserialize)]
pub struct PublishArgs {
    pub destination: u64,
    /// The route in its destination-chain encoding. Never decoded here:
    /// each destination has its own canonical encoding and only the
    /// destination portal can verify it against the route hash.
    pub encoded_route: Vec<u8>,
    pub reward: Reward,
}

#[derive(Accounts)]
pub struct Publish<'info> {
    /// CHECK: address is validated
    pub vault_state: UncheckedAccount<'info>,
}

pub fn publish_intent(ctx: Context<Publish>, args: PublishArgs) -> Result<()> {
    let PublishArgs {
        destination,
        encoded_route,
        reward,
    } = args;
    let route_hash = types::keccak256(&encoded_route);
    let intent_hash = types::intent_hash(destination, &route_hash, &reward.hash());

    check_republishable(&ctx.accounts.vault_state, &intent_hash)?;

    emit!(IntentPublished::new(
        intent_hash,
        destination,
        encoded_route,
        reward
    ));

    Ok(())
}

#[derive(AnchorSerialize, AnchorDeserialize)]
pub struct PublishAndFundArgs {
    pub destination: u64,
    pub encoded_route: Vec<u8>,
    pub reward: Reward,
    pub allow_partial: bool,
}

pub fn publish_and_fund_intent<'info>(
    ctx: Context<'_, '_, '_, 'info, Fund<'info>>,
    args: PublishAndFundArgs,
) -> Result<()> {
    let PublishAndFundArgs {
        destination,
        encoded_route,
        reward,
        allow_partial,
    } = args;
    let route_hash = types::keccak256(&encoded_route);
    let intent_hash = types::intent_hash(destination, &route_hash, &reward.hash());

    check_republishable(&ctx.accounts.vault_state, &intent_hash)?;

    emit!(IntentPublished::new(
        intent_hash,
        destination,
        encoded_route,
        reward.clone()
    ));

    fund::fund_vault(&ctx, &intent_hash, &reward, allow_partial)
}

/// A resolved intent cannot be republished under the same hash; an
/// unresolved one can, which just re-emits the discovery event.
fn check_republishable(vault_state: &AccountInfo, intent_hash: &Bytes32) -> Result<()> {
    require!(
        vault_state.key() == VaultState::pda(intent_hash).0,
        PortalError::InvalidVaultState
    );
    require!(
        !VaultState::status_of(vault_state)?.is_terminal(),
        PortalError::IntentAlreadyExists
    );

    Ok(())
}
