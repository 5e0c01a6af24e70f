use anchor_lang::prelude::*;
use anchor_lang::solana_program::pubkey;
use derive_new::new;

use crate::Bytes32;

pub const PROOF_SEED: &[u8] = b"proof";

/// Anchor instruction discriminators of the prover capability. Provers are
/// separate deployments; the portal invokes them by raw instruction data
/// rather than a CPI crate so that new provers can ship without a portal
/// upgrade.
pub const PROVE_DISCRIMINATOR: [u8; 8] = [52, 246, 26, 161, 211, 170, 86, 215];
pub const CHALLENGE_INTENT_PROOF_DISCRIMINATOR: [u8; 8] = [223, 229, 160, 243, 129, 74, 179, 240];
pub const CLOSE_PROOF_DISCRIMINATOR: [u8; 8] = [64, 76, 168, 8, 126, 109, 164, 179];

pub const HYPER_PROVER_ID: Pubkey = pubkey!("EjzY4ueqoqktoqeqHHt7WAGCRgjeubaeEGCGiiFZzhKX");
pub const LOCAL_PROVER_ID: Pubkey = pubkey!("D8P2GTnTde73TVh5nfxqtKU8rrxX1ifio7NjTGs9K9Fz");

/// Capability introspection for route execution: route calls must never
/// re-enter the proving subsystem. Unknown programs are not provers; the
/// check fails open here and the executor fails closed on the unsafe
/// action.
pub fn is_prover(program_id: &Pubkey) -> bool {
    [HYPER_PROVER_ID, LOCAL_PROVER_ID].contains(program_id)
}

/// The fulfillment claim a prover records on the source chain: which
/// claimant settled the intent, and on which destination. The destination
/// is echoed back so the source ledger can detect a proof recorded against
/// the wrong chain and dispute it.
#[derive(AnchorSerialize, AnchorDeserialize, InitSpace, Clone, Default, new, Debug)]
pub struct Proof {
    pub destination: u64,
    pub claimant: Bytes32,
}

impl Proof {
    pub fn pda(intent_hash: &Bytes32, prover: &Pubkey) -> (Pubkey, u8) {
        Pubkey::find_program_address(&[PROOF_SEED, intent_hash.as_ref()], prover)
    }

    pub fn try_from_account_info(account: &AccountInfo<'_>) -> Result<Option<Self>> {
        account
            .data
            .borrow()
            .get(8..)
            .map(Self::try_from_slice)
            .transpose()
            .map_err(Into::into)
    }
}

#[derive(AnchorSerialize, AnchorDeserialize, Clone, Copy, new, Debug, PartialEq, Eq)]
pub struct IntentHashClaimant {
    pub intent_hash: Bytes32,
    pub claimant: Bytes32,
}

/// The proof-submission payload: ordered `(intent_hash, claimant)` pairs.
#[derive(AnchorSerialize, AnchorDeserialize, Clone, new, Debug, Default, PartialEq, Eq)]
pub struct IntentHashesClaimants(Vec<IntentHashClaimant>);

impl IntentHashesClaimants {
    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &IntentHashClaimant> {
        self.0.iter()
    }

    /// Packs the pairs into the fixed-width wire form carried by
    /// cross-chain proof messages: 64 bytes per pair, intent hash first.
    pub fn to_bytes(&self) -> Vec<u8> {
        self.0
            .iter()
            .flat_map(|pair| {
                pair.intent_hash
                    .into_iter()
                    .chain(pair.claimant.into_iter())
            })
            .collect()
    }
}

impl FromIterator<IntentHashClaimant> for IntentHashesClaimants {
    fn from_iter<T: IntoIterator<Item = IntentHashClaimant>>(iter: T) -> Self {
        Self(iter.into_iter().collect())
    }
}

#[derive(AnchorSerialize, AnchorDeserialize, new)]
pub struct ProveArgs {
    pub source: u64,
    pub intent_hashes_claimants: IntentHashesClaimants,
    pub data: Vec<u8>,
}

#[derive(AnchorSerialize, AnchorDeserialize, new)]
pub struct ChallengeArgs {
    pub destination: u64,
    pub route_hash: Bytes32,
    pub reward_hash: Bytes32,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn proof_pda_deterministic() {
        let intent_hash = [42u8; 32].into();
        let prover = Pubkey::new_from_array([123u8; 32]);

        let (pda_1, bump_1) = Proof::pda(&intent_hash, &prover);
        let (pda_2, bump_2) = Proof::pda(&intent_hash, &prover);

        assert_eq!(pda_1, pda_2);
        assert_eq!(bump_1, bump_2);
    }

    #[test]
    fn proof_pda_depends_on_prover() {
        let intent_hash = [42u8; 32].into();

        let (under_hyper, _) = Proof::pda(&intent_hash, &HYPER_PROVER_ID);
        let (under_local, _) = Proof::pda(&intent_hash, &LOCAL_PROVER_ID);

        assert_ne!(under_hyper, under_local);
    }

    #[test]
    fn is_prover_rejects_unknown_programs() {
        assert!(is_prover(&HYPER_PROVER_ID));
        assert!(is_prover(&LOCAL_PROVER_ID));
        assert!(!is_prover(&Pubkey::new_unique()));
        assert!(!is_prover(&Pubkey::default()));
    }

    #[test]
    fn intent_hashes_claimants_to_bytes_layout() {
        let pairs: IntentHashesClaimants = [
            IntentHashClaimant::new([1u8; 32].into(), [2u8; 32].into()),
            IntentHashClaimant::new([3u8; 32].into(), [4u8; 32].into()),
        ]
        .into_iter()
        .collect();

        let bytes = pairs.to_bytes();

        assert_eq!(bytes.len(), 128);
        assert_eq!(&bytes[..32], &[1u8; 32]);
        assert_eq!(&bytes[32..64], &[2u8; 32]);
        assert_eq!(&bytes[64..96], &[3u8; 32]);
        assert_eq!(&bytes[96..128], &[4u8; 32]);
    }

    #[test]
    fn proof_round_trips_through_account_layout() {
        let proof = Proof::new(10, [9u8; 32].into());
        let encoded = proof.try_to_vec().unwrap();
        let decoded = Proof::try_from_slice(&encoded).unwrap();

        assert_eq!(decoded.destination, proof.destination);
        assert_eq!(decoded.claimant, proof.claimant);
    }
}
