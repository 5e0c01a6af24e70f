use std::collections::BTreeMap;

use anchor_lang::prelude::*;
use anchor_spl::token::{self, Token};
use anchor_spl::token_2022::{self, Token2022};
use anchor_spl::token_interface::{transfer_checked, Mint, TokenAccount};
use intents_svm_std::SerializableAccountMeta;
use itertools::Itertools;
use tiny_keccak::{Hasher, Keccak};

pub use intents_svm_std::Bytes32;

use crate::instructions::PortalError;

pub const VEC_TOKEN_TRANSFER_ACCOUNTS_CHUNK_SIZE: usize = 3;

pub fn keccak256(bytes: &[u8]) -> Bytes32 {
    let mut hasher = Keccak::v256();
    let mut hash = [0u8; 32];

    hasher.update(bytes);
    hasher.finalize(&mut hash);

    hash.into()
}

/// The intent's primary key: `keccak256(destination ‖ route_hash ‖ reward_hash)`
/// with the destination chain id in fixed-width big-endian form. Both sides
/// of the protocol recompute this from their own inputs; a mismatch anywhere
/// invalidates the operation rather than trusting the caller's claim.
pub fn intent_hash(destination: u64, route_hash: &Bytes32, reward_hash: &Bytes32) -> Bytes32 {
    let mut hasher = Keccak::v256();
    let mut hash = [0u8; 32];

    hasher.update(destination.to_be_bytes().as_slice());
    hasher.update(route_hash.as_ref());
    hasher.update(reward_hash.as_ref());

    hasher.finalize(&mut hash);

    hash.into()
}

#[derive(AnchorSerialize, AnchorDeserialize, Clone, Debug)]
pub struct Intent {
    pub destination: u64,
    pub route: Route,
    pub reward: Reward,
}

impl Intent {
    /// `(route_hash, reward_hash, intent_hash)` for the fully-typed intent.
    /// Publishing only ever sees the route as pre-encoded bytes; both paths
    /// agree because the canonical route encoding IS its serialized form.
    pub fn hashes(&self) -> (Bytes32, Bytes32, Bytes32) {
        let route_hash = self.route.hash();
        let reward_hash = self.reward.hash();
        let intent_hash = intent_hash(self.destination, &route_hash, &reward_hash);

        (route_hash, reward_hash, intent_hash)
    }
}

#[derive(AnchorSerialize, AnchorDeserialize, Clone, Debug)]
pub struct Route {
    pub salt: Bytes32,
    pub deadline: i64,
    pub portal: Bytes32,
    pub tokens: Vec<TokenAmount>,
    pub calls: Vec<Call>,
}

impl Route {
    pub fn hash(&self) -> Bytes32 {
        keccak256(&self.try_to_vec().expect("Failed to serialize Route"))
    }

    pub fn token_amounts(&self) -> Result<BTreeMap<Pubkey, u64>> {
        token_amounts(&self.tokens)
    }

    /// Total native value the route's calls forward, pulled from the solver
    /// into the executor before execution starts.
    pub fn required_native(&self) -> Result<u64> {
        self.calls.iter().try_fold(0u64, |total, call| {
            total
                .checked_add(call.value)
                .ok_or_else(|| PortalError::CallValueOverflow.into())
        })
    }
}

#[derive(AnchorSerialize, AnchorDeserialize, Clone, Debug)]
pub struct Reward {
    pub deadline: i64,
    pub creator: Pubkey,
    pub prover: Pubkey,
    pub native_amount: u64,
    pub tokens: Vec<TokenAmount>,
}

impl Reward {
    pub fn hash(&self) -> Bytes32 {
        keccak256(&self.try_to_vec().expect("Failed to serialize Reward"))
    }

    pub fn token_amounts(&self) -> Result<BTreeMap<Pubkey, u64>> {
        token_amounts(&self.tokens)
    }
}

fn token_amounts(tokens: &[TokenAmount]) -> Result<BTreeMap<Pubkey, u64>> {
    tokens
        .iter()
        .try_fold(BTreeMap::<Pubkey, u64>::new(), |mut result, token| {
            let entry = result.entry(token.token).or_default();
            *entry = entry
                .checked_add(token.amount)
                .ok_or(PortalError::TokenAmountOverflow)?;

            Ok(result)
        })
}

#[derive(AnchorSerialize, AnchorDeserialize, Clone, Debug)]
pub struct TokenAmount {
    pub token: Pubkey,
    pub amount: u64,
}

#[derive(AnchorSerialize, AnchorDeserialize, Clone, Debug)]
pub struct Call {
    pub target: Bytes32,
    pub data: Vec<u8>,
    pub value: u64,
}

/// Minimal calldata that fits Solana's per-instruction size limit.
///
/// The canonical route (the one that is hashed) carries full
/// [`CalldataWithAccounts`]; the fulfill instruction carries only this form
/// and the accounts travel in the transaction, from which the full form is
/// reconstructed before the route hash is verified.
#[derive(AnchorSerialize, AnchorDeserialize, Clone, Debug)]
pub struct Calldata {
    pub data: Vec<u8>,
    pub account_count: u8,
}

/// Complete calldata: instruction data plus the account metadata the call
/// commits to. This is what the creator encodes into `Call::data` when the
/// destination is an SVM chain.
#[derive(AnchorSerialize, AnchorDeserialize, Debug)]
pub struct CalldataWithAccounts {
    pub calldata: Calldata,
    pub accounts: Vec<SerializableAccountMeta>,
}

impl CalldataWithAccounts {
    pub fn new<T>(calldata: Calldata, accounts: Vec<T>) -> Result<Self>
    where
        T: Into<SerializableAccountMeta>,
    {
        require!(
            accounts.len() == calldata.account_count as usize,
            PortalError::InvalidCalldata,
        );

        Ok(Self {
            calldata,
            accounts: accounts.into_iter().map(Into::into).collect(),
        })
    }
}

pub struct VecTokenTransferAccounts<'info>(Vec<TokenTransferAccounts<'info>>);

impl<'info> TryFrom<&[AccountInfo<'info>]> for VecTokenTransferAccounts<'info> {
    type Error = anchor_lang::error::Error;

    fn try_from(accounts: &[AccountInfo<'info>]) -> Result<Self> {
        accounts
            .iter()
            .chunks(VEC_TOKEN_TRANSFER_ACCOUNTS_CHUNK_SIZE)
            .into_iter()
            .map(|chunk| chunk.collect::<Vec<_>>().try_into())
            .collect::<Result<Vec<TokenTransferAccounts>>>()
            .map(Self)
    }
}

impl<'info> VecTokenTransferAccounts<'info> {
    pub fn into_inner(self) -> Vec<TokenTransferAccounts<'info>> {
        self.0
    }
}

/// One `(from, to, mint)` account triple per token movement. Every transfer
/// in the protocol funnels through this shape so the same validation applies
/// whether a vault, the executor, a funder, or a claimant is on either end.
pub struct TokenTransferAccounts<'info> {
    pub from: AccountInfo<'info>,
    pub to: AccountInfo<'info>,
    pub mint: AccountInfo<'info>,
}

impl<'info> TryFrom<Vec<&AccountInfo<'info>>> for TokenTransferAccounts<'info> {
    type Error = anchor_lang::error::Error;

    fn try_from(accounts: Vec<&AccountInfo<'info>>) -> Result<Self> {
        match accounts.as_slice() {
            [from, to, mint] => {
                // all three must belong to the same token program
                let token_program = mint.owner;
                require!(
                    token_program == from.owner,
                    PortalError::InvalidTokenTransferAccounts
                );
                require!(
                    to.data_is_empty() || token_program == to.owner,
                    PortalError::InvalidTokenTransferAccounts
                );

                Ok(Self {
                    from: from.to_account_info(),
                    to: to.to_account_info(),
                    mint: mint.to_account_info(),
                })
            }
            _ => Err(PortalError::InvalidTokenTransferAccounts.into()),
        }
    }
}

impl<'info> TokenTransferAccounts<'info> {
    pub fn transfer(
        &self,
        token_program: &AccountInfo<'info>,
        authority: &AccountInfo<'info>,
        amount: u64,
    ) -> Result<()> {
        match amount {
            0 => Ok(()),
            amount => transfer_checked(
                CpiContext::new(
                    token_program.to_account_info(),
                    anchor_spl::token_interface::TransferChecked {
                        from: self.from.to_account_info(),
                        to: self.to.to_account_info(),
                        mint: self.mint.to_account_info(),
                        authority: authority.to_account_info(),
                    },
                ),
                amount,
                self.mint_data()?.decimals,
            ),
        }
    }

    pub fn transfer_with_signer(
        &self,
        token_program: &AccountInfo<'info>,
        authority: &AccountInfo<'info>,
        signer_seeds: &[&[&[u8]]],
        amount: u64,
    ) -> Result<()> {
        match amount {
            0 => Ok(()),
            amount => transfer_checked(
                CpiContext::new_with_signer(
                    token_program.to_account_info(),
                    anchor_spl::token_interface::TransferChecked {
                        from: self.from.to_account_info(),
                        to: self.to.to_account_info(),
                        mint: self.mint.to_account_info(),
                        authority: authority.to_account_info(),
                    },
                    signer_seeds,
                ),
                amount,
                self.mint_data()?.decimals,
            ),
        }
    }

    pub fn token_program(
        &self,
        token_program: &Program<'info, Token>,
        token_2022_program: &Program<'info, Token2022>,
    ) -> Result<AccountInfo<'info>> {
        let token_program_id = self.token_program_id();

        if *token_program_id == token::ID {
            Ok(token_program.to_account_info())
        } else if *token_program_id == token_2022::ID {
            Ok(token_2022_program.to_account_info())
        } else {
            Err(PortalError::InvalidTokenProgram.into())
        }
    }

    pub fn token_program_id(&self) -> &Pubkey {
        self.mint.owner
    }

    pub fn mint_data(&self) -> Result<Mint> {
        Mint::try_deserialize(&mut &self.mint.try_borrow_data()?[..])
    }

    pub fn from_data(&self) -> Result<TokenAccount> {
        TokenAccount::try_deserialize(&mut &self.from.try_borrow_data()?[..])
    }

    pub fn to_data(&self) -> Result<TokenAccount> {
        TokenAccount::try_deserialize(&mut &self.to.try_borrow_data()?[..])
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_route() -> Route {
        Route {
            salt: [1u8; 32].into(),
            deadline: 1_700_000_000,
            portal: [2u8; 32].into(),
            tokens: vec![
                TokenAmount {
                    token: Pubkey::new_from_array([3u8; 32]),
                    amount: 100,
                },
                TokenAmount {
                    token: Pubkey::new_from_array([4u8; 32]),
                    amount: 200,
                },
            ],
            calls: vec![
                Call {
                    target: [5u8; 32].into(),
                    data: vec![1, 2, 3],
                    value: 0,
                },
                Call {
                    target: [6u8; 32].into(),
                    data: vec![4, 5, 6],
                    value: 1000,
                },
            ],
        }
    }

    fn sample_reward() -> Reward {
        Reward {
            deadline: 1_640_995_200,
            creator: Pubkey::new_from_array([1u8; 32]),
            prover: Pubkey::new_from_array([2u8; 32]),
            native_amount: 1_000_000_000,
            tokens: vec![
                TokenAmount {
                    token: Pubkey::new_from_array([3u8; 32]),
                    amount: 100,
                },
                TokenAmount {
                    token: Pubkey::new_from_array([4u8; 32]),
                    amount: 200,
                },
            ],
        }
    }

    #[test]
    fn intent_hash_deterministic() {
        let route_hash = [6u8; 32].into();
        let reward_hash = sample_reward().hash();

        let hash_1 = intent_hash(1000, &route_hash, &reward_hash);
        let hash_2 = intent_hash(1000, &route_hash, &reward_hash);

        assert_eq!(hash_1, hash_2);
    }

    #[test]
    fn intent_hash_deterministic_for_random_inputs() {
        let destination: u64 = rand::random();
        let route_hash: Bytes32 = rand::random::<[u8; 32]>().into();
        let reward_hash: Bytes32 = rand::random::<[u8; 32]>().into();

        assert_eq!(
            intent_hash(destination, &route_hash, &reward_hash),
            intent_hash(destination, &route_hash, &reward_hash)
        );
    }

    #[test]
    fn intent_hash_sensitive_to_every_part() {
        let route_hash: Bytes32 = [6u8; 32].into();
        let reward_hash = sample_reward().hash();
        let hash = intent_hash(1000, &route_hash, &reward_hash);

        assert_ne!(hash, intent_hash(1001, &route_hash, &reward_hash));
        assert_ne!(hash, intent_hash(1000, &[7u8; 32].into(), &reward_hash));
        assert_ne!(hash, intent_hash(1000, &route_hash, &[8u8; 32].into()));
    }

    #[test]
    fn route_hash_matches_canonical_encoding() {
        let route = Route {
            salt: [1u8; 32].into(),
            deadline: 1_700_000_000,
            portal: [2u8; 32].into(),
            tokens: vec![TokenAmount {
                token: Pubkey::new_from_array([3u8; 32]),
                amount: 100,
            }],
            calls: vec![Call {
                target: [5u8; 32].into(),
                data: vec![1, 2, 3],
                value: 7,
            }],
        };

        // the canonical wire form, assembled by hand: any encoder that
        // produces these bytes produces the same route hash
        let mut encoded = Vec::new();
        encoded.extend_from_slice(&[1u8; 32]);
        encoded.extend_from_slice(&1_700_000_000i64.to_le_bytes());
        encoded.extend_from_slice(&[2u8; 32]);
        encoded.extend_from_slice(&1u32.to_le_bytes());
        encoded.extend_from_slice(&[3u8; 32]);
        encoded.extend_from_slice(&100u64.to_le_bytes());
        encoded.extend_from_slice(&1u32.to_le_bytes());
        encoded.extend_from_slice(&[5u8; 32]);
        encoded.extend_from_slice(&3u32.to_le_bytes());
        encoded.extend_from_slice(&[1, 2, 3]);
        encoded.extend_from_slice(&7u64.to_le_bytes());

        assert_eq!(route.hash(), keccak256(&encoded));
    }

    #[test]
    fn typed_and_encoded_intents_hash_identically() {
        let intent = Intent {
            destination: 42,
            route: sample_route(),
            reward: sample_reward(),
        };

        let (route_hash, reward_hash, hash_from_typed) = intent.hashes();

        let encoded_route = intent.route.try_to_vec().unwrap();
        let encoded_route_hash = keccak256(&encoded_route);
        let hash_from_encoded =
            intent_hash(intent.destination, &encoded_route_hash, &intent.reward.hash());

        assert_eq!(encoded_route_hash, route_hash);
        assert_eq!(reward_hash, intent.reward.hash());
        assert_eq!(hash_from_typed, hash_from_encoded);
    }

    #[test]
    fn route_hash_sensitive_to_fields() {
        let route = sample_route();
        let hash = route.hash();

        let mut changed = route.clone();
        changed.salt = [9u8; 32].into();
        assert_ne!(hash, changed.hash());

        let mut changed = route.clone();
        changed.deadline += 1;
        assert_ne!(hash, changed.hash());

        let mut changed = route.clone();
        changed.calls[0].value += 1;
        assert_ne!(hash, changed.hash());
    }

    #[test]
    fn reward_hash_sensitive_to_fields() {
        let reward = sample_reward();
        let hash = reward.hash();

        let mut changed = reward.clone();
        changed.native_amount += 1;
        assert_ne!(hash, changed.hash());

        let mut changed = reward.clone();
        changed.creator = Pubkey::new_from_array([9u8; 32]);
        assert_ne!(hash, changed.hash());
    }

    #[test]
    fn token_amounts_aggregates_duplicates() {
        let reward = Reward {
            deadline: 1_640_995_200,
            creator: Pubkey::new_from_array([1u8; 32]),
            prover: Pubkey::new_from_array([2u8; 32]),
            native_amount: 0,
            tokens: vec![
                TokenAmount {
                    token: Pubkey::new_from_array([3u8; 32]),
                    amount: 100,
                },
                TokenAmount {
                    token: Pubkey::new_from_array([4u8; 32]),
                    amount: 200,
                },
                TokenAmount {
                    token: Pubkey::new_from_array([3u8; 32]),
                    amount: 500,
                },
            ],
        };

        let amounts = reward.token_amounts().unwrap();

        assert_eq!(amounts.len(), 2);
        assert_eq!(amounts[&Pubkey::new_from_array([3u8; 32])], 600);
        assert_eq!(amounts[&Pubkey::new_from_array([4u8; 32])], 200);
    }

    #[test]
    fn token_amounts_overflow_fails() {
        let route = Route {
            salt: [0u8; 32].into(),
            deadline: 0,
            portal: [0u8; 32].into(),
            tokens: vec![
                TokenAmount {
                    token: Pubkey::new_from_array([3u8; 32]),
                    amount: u64::MAX,
                },
                TokenAmount {
                    token: Pubkey::new_from_array([3u8; 32]),
                    amount: 1,
                },
            ],
            calls: vec![],
        };

        assert!(route.token_amounts().is_err());
    }

    #[test]
    fn required_native_sums_call_values() {
        let route = sample_route();

        assert_eq!(route.required_native().unwrap(), 1000);
    }

    #[test]
    fn required_native_overflow_fails() {
        let mut route = sample_route();
        route.calls[0].value = u64::MAX;
        route.calls[1].value = 1;

        assert!(route.required_native().is_err());
    }

    #[test]
    fn calldata_with_accounts_validates_count() {
        let calldata = Calldata {
            data: vec![1, 2, 3],
            account_count: 2,
        };
        let accounts = vec![
            SerializableAccountMeta {
                pubkey: Pubkey::new_from_array([1u8; 32]),
                is_signer: true,
                is_writable: false,
            },
            SerializableAccountMeta {
                pubkey: Pubkey::new_from_array([2u8; 32]),
                is_signer: false,
                is_writable: true,
            },
        ];

        assert!(CalldataWithAccounts::new(calldata.clone(), accounts.clone()).is_ok());
        assert!(CalldataWithAccounts::new(calldata, accounts[..1].to_vec()).is_err());
    }

    #[test]
    fn token_transfer_accounts_wrong_chunk_fails() {
        let token_program = anchor_spl::token::ID;
        let key = Pubkey::new_unique();
        let mut lamports = 0;
        let mut data = vec![];

        let account = AccountInfo::new(
            &key,
            false,
            false,
            &mut lamports,
            &mut data,
            &token_program,
            false,
            0,
        );

        let two_accounts = vec![&account, &account];
        assert!(TokenTransferAccounts::try_from(two_accounts).is_err());
    }

    #[test]
    fn token_transfer_accounts_mismatched_owners_fail() {
        let token_program = anchor_spl::token::ID;
        let other_program = anchor_spl::token_2022::ID;
        let from_key = Pubkey::new_unique();
        let to_key = Pubkey::new_unique();
        let mint_key = Pubkey::new_unique();
        let mut lamports_1 = 0;
        let mut lamports_2 = 0;
        let mut lamports_3 = 0;
        let mut data_1 = vec![];
        let mut data_2 = vec![1, 2, 3];
        let mut data_3 = vec![];

        let from_account = AccountInfo::new(
            &from_key,
            false,
            false,
            &mut lamports_1,
            &mut data_1,
            &token_program,
            false,
            0,
        );
        let to_account = AccountInfo::new(
            &to_key,
            false,
            false,
            &mut lamports_2,
            &mut data_2,
            &other_program,
            false,
            0,
        );
        let mint_account = AccountInfo::new(
            &mint_key,
            false,
            false,
            &mut lamports_3,
            &mut data_3,
            &token_program,
            false,
            0,
        );

        let accounts = vec![&from_account, &to_account, &mint_account];
        assert!(TokenTransferAccounts::try_from(accounts).is_err());
    }

    #[test]
    fn vec_token_transfer_accounts_empty_slice() {
        let accounts: &[AccountInfo] = &[];

        let result = VecTokenTransferAccounts::try_from(accounts);
        assert_eq!(result.unwrap().into_inner().len(), 0);
    }
}
