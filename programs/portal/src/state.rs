use anchor_lang::prelude::*;
use derive_new::new;
use intents_svm_std::account::AccountExt;
use intents_svm_std::Bytes32;

pub const VAULT_SEED: &[u8] = b"vault";
pub const VAULT_STATE_SEED: &[u8] = b"vault_state";
pub const FULFILL_MARKER_SEED: &[u8] = b"fulfill_marker";
pub const EXECUTOR_SEED: &[u8] = b"executor";
pub const DISPATCHER_SEED: &[u8] = b"dispatcher";
pub const PERMIT_SEED: &[u8] = b"permit";

/// The escrow account for one intent. Data-less: it only ever holds the
/// reward's lamports and owns the per-mint token accounts. Its address is a
/// pure function of the intent hash and this program's id, so it is known
/// before any funds move and identical for every participant.
pub fn vault_pda(intent_hash: &Bytes32) -> (Pubkey, u8) {
    Pubkey::find_program_address(&[VAULT_SEED, intent_hash.as_ref()], &crate::ID)
}

/// The sandbox identity that holds route-token prefunding and signs route
/// calls during fulfillment. Only this program can produce its signature,
/// which is the executor's whole authorization model.
pub fn executor_pda() -> (Pubkey, u8) {
    Pubkey::find_program_address(&[EXECUTOR_SEED], &crate::ID)
}

/// The portal's identity when invoking a prover, letting provers
/// authenticate that a proof submission or challenge came from the portal.
pub fn dispatcher_pda() -> (Pubkey, u8) {
    Pubkey::find_program_address(&[DISPATCHER_SEED], &crate::ID)
}

/// The delegate a funder approves on their token accounts to let third
/// parties route `fund_for` through the portal.
pub fn permit_pda(funder: &Pubkey) -> (Pubkey, u8) {
    Pubkey::find_program_address(&[PERMIT_SEED, funder.as_ref()], &crate::ID)
}

/// Escrow lifecycle. Funding states are re-enterable until the intent
/// resolves; `Claimed` and `Refunded` are terminal and permanent.
#[derive(
    AnchorSerialize,
    AnchorDeserialize,
    InitSpace,
    Clone,
    Copy,
    Default,
    PartialEq,
    Eq,
    PartialOrd,
    Ord,
    Debug,
)]
pub enum VaultStatus {
    #[default]
    Initial,
    PartiallyFunded,
    Funded,
    Claimed,
    Refunded,
}

impl VaultStatus {
    pub fn is_terminal(&self) -> bool {
        matches!(self, VaultStatus::Claimed | VaultStatus::Refunded)
    }
}

/// The durable per-intent ledger record. The vault itself is ephemeral
/// balance storage; this account is the source of truth for where the
/// intent is in its lifecycle.
#[account]
#[derive(InitSpace, Debug)]
pub struct VaultState {
    pub status: VaultStatus,
    pub bump: u8,
}

impl AccountExt for VaultState {}

impl VaultState {
    pub fn pda(intent_hash: &Bytes32) -> (Pubkey, u8) {
        Pubkey::find_program_address(&[VAULT_STATE_SEED, intent_hash.as_ref()], &crate::ID)
    }

    /// The recorded status, or `Initial` for a vault that was never touched.
    pub fn status_of(account: &AccountInfo) -> Result<VaultStatus> {
        if account.data_is_empty() {
            return Ok(VaultStatus::default());
        }

        let state = Self::try_deserialize(&mut &account.try_borrow_data()?[..])?;

        Ok(state.status)
    }

    /// Records a status, creating the account on first write.
    pub fn store<'info>(
        account: &AccountInfo<'info>,
        payer: &AccountInfo<'info>,
        system_program: &Program<'info, System>,
        intent_hash: &Bytes32,
        status: VaultStatus,
    ) -> Result<()> {
        let (_, bump) = Self::pda(intent_hash);

        if account.data_is_empty() {
            let signer_seeds: &[&[u8]] = &[VAULT_STATE_SEED, intent_hash.as_ref(), &[bump]];

            Self { status, bump }.init(account, payer, system_program, &[signer_seeds])
        } else {
            Self { status, bump }
                .try_serialize(&mut &mut account.try_borrow_mut_data()?[..])
                .map_err(Into::into)
        }
    }
}

/// Destination-side fulfillment record: intent hash to claimant, written
/// exactly once. Initialization of an existing marker fails, which is what
/// makes a second fulfill for the same intent lose deterministically.
#[account]
#[derive(InitSpace, new, Debug)]
pub struct FulfillMarker {
    pub claimant: Bytes32,
    pub bump: u8,
}

impl AccountExt for FulfillMarker {}

impl FulfillMarker {
    pub fn pda(intent_hash: &Bytes32) -> (Pubkey, u8) {
        Pubkey::find_program_address(&[FULFILL_MARKER_SEED, intent_hash.as_ref()], &crate::ID)
    }

    pub fn try_from_account_info(account: &AccountInfo<'_>) -> Result<Option<Self>> {
        if account.data_is_empty() {
            return Ok(None);
        }

        Self::try_deserialize(&mut &account.try_borrow_data()?[..])
            .map(Some)
            .map_err(Into::into)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn vault_status_rank_is_monotonic() {
        assert!(VaultStatus::Initial < VaultStatus::PartiallyFunded);
        assert!(VaultStatus::PartiallyFunded < VaultStatus::Funded);
        assert!(VaultStatus::Funded < VaultStatus::Claimed);
    }

    #[test]
    fn vault_status_default_is_initial() {
        assert_eq!(VaultStatus::default(), VaultStatus::Initial);
    }

    #[test]
    fn vault_status_terminal() {
        assert!(!VaultStatus::Initial.is_terminal());
        assert!(!VaultStatus::PartiallyFunded.is_terminal());
        assert!(!VaultStatus::Funded.is_terminal());
        assert!(VaultStatus::Claimed.is_terminal());
        assert!(VaultStatus::Refunded.is_terminal());
    }

    #[test]
    fn funding_never_downgrades_status() {
        // a funded vault stays funded no matter how a later funding round
        // classifies its own contribution
        assert_eq!(
            VaultStatus::Funded.max(VaultStatus::PartiallyFunded),
            VaultStatus::Funded
        );
        assert_eq!(
            VaultStatus::PartiallyFunded.max(VaultStatus::Funded),
            VaultStatus::Funded
        );
        assert_eq!(
            VaultStatus::Initial.max(VaultStatus::PartiallyFunded),
            VaultStatus::PartiallyFunded
        );
    }

    #[test]
    fn pdas_deterministic_and_distinct() {
        let intent_hash: Bytes32 = [42u8; 32].into();
        let other_hash: Bytes32 = [43u8; 32].into();

        assert_eq!(vault_pda(&intent_hash), vault_pda(&intent_hash));
        assert_ne!(vault_pda(&intent_hash).0, vault_pda(&other_hash).0);
        assert_ne!(vault_pda(&intent_hash).0, VaultState::pda(&intent_hash).0);
        assert_ne!(
            vault_pda(&intent_hash).0,
            FulfillMarker::pda(&intent_hash).0
        );
        assert_ne!(
            VaultState::pda(&intent_hash).0,
            FulfillMarker::pda(&intent_hash).0
        );
    }

    #[test]
    fn executor_and_dispatcher_distinct() {
        assert_ne!(executor_pda().0, dispatcher_pda().0);
    }

    #[test]
    fn permit_pda_per_funder() {
        let funder_a = Pubkey::new_unique();
        let funder_b = Pubkey::new_unique();

        assert_eq!(permit_pda(&funder_a), permit_pda(&funder_a));
        assert_ne!(permit_pda(&funder_a).0, permit_pda(&funder_b).0);
    }

    #[test]
    fn fulfill_marker_round_trip() {
        let marker = FulfillMarker::new([7u8; 32].into(), 254);
        let encoded = marker.try_to_vec().unwrap();
        let decoded = FulfillMarker::try_from_slice(&encoded).unwrap();

        assert_eq!(decoded.claimant, marker.claimant);
        assert_eq!(decoded.bump, marker.bump);
    }
}
