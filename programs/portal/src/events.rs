use anchor_lang::prelude::*;
use derive_new::new;
use intents_svm_std::Bytes32;

use crate::types::Reward;

/// Discovery event: carries everything an off-chain indexer needs to
/// reconstruct the intent, including the route in its destination-chain
/// encoding, which this program never decodes.
#[event]
#[derive(new)]
pub struct IntentPublished {
    intent_hash: Bytes32,
    destination: u64,
    route: Vec<u8>,
    reward: Reward,
}

#[event]
#[derive(new)]
pub struct IntentFunded {
    intent_hash: Bytes32,
    funder: Pubkey,
    complete: bool,
}

#[event]
#[derive(new)]
pub struct IntentFulfilled {
    intent_hash: Bytes32,
    claimant: Bytes32,
}

#[event]
#[derive(new)]
pub struct IntentProven {
    intent_hash: Bytes32,
    claimant: Bytes32,
    source: u64,
}

#[event]
#[derive(new)]
pub struct IntentWithdrawn {
    intent_hash: Bytes32,
    claimant: Pubkey,
}

#[event]
#[derive(new)]
pub struct IntentRefunded {
    intent_hash: Bytes32,
    refundee: Pubkey,
}

/// A proof exists for this intent but names a different destination than
/// the reward settles against; the dispute is handed to the prover's own
/// resolution process rather than decided here.
#[event]
#[derive(new)]
pub struct IntentProofChallenged {
    intent_hash: Bytes32,
    destination: u64,
    proven_destination: u64,
}

#[event]
#[derive(new)]
pub struct IntentTokenRecovered {
    intent_hash: Bytes32,
    mint: Pubkey,
    refundee: Pubkey,
}
