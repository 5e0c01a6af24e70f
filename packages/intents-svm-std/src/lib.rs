use anchor_lang::prelude::*;
use derive_more::Deref;

pub mod account;
pub mod identity;
pub mod prover;

#[cfg(feature = "mainnet")]
pub const CHAIN_ID: u64 = 1399811149;
#[cfg(not(feature = "mainnet"))]
pub const CHAIN_ID: u64 = 1399811150;

/// Universal cross-chain identity. Wide enough to carry any supported
/// chain's native account identifier; see [`identity`] for the
/// widening/narrowing rules per native width.
#[derive(
    AnchorSerialize,
    AnchorDeserialize,
    InitSpace,
    Deref,
    Clone,
    Copy,
    Default,
    Debug,
    PartialEq,
    Eq,
    PartialOrd,
    Ord,
)]
pub struct Bytes32([u8; 32]);

impl Bytes32 {
    pub const ZERO: Self = Self([0u8; 32]);

    pub fn is_zero(&self) -> bool {
        self.0 == [0u8; 32]
    }
}

impl From<[u8; 32]> for Bytes32 {
    fn from(bytes: [u8; 32]) -> Self {
        Bytes32(bytes)
    }
}

impl From<Bytes32> for [u8; 32] {
    fn from(bytes: Bytes32) -> Self {
        bytes.0
    }
}

impl From<Pubkey> for Bytes32 {
    fn from(pubkey: Pubkey) -> Self {
        Bytes32(pubkey.to_bytes())
    }
}

impl From<Bytes32> for Pubkey {
    fn from(bytes: Bytes32) -> Self {
        Pubkey::new_from_array(bytes.0)
    }
}

impl PartialEq<Pubkey> for Bytes32 {
    fn eq(&self, pubkey: &Pubkey) -> bool {
        self.0 == pubkey.to_bytes()
    }
}

impl IntoIterator for Bytes32 {
    type Item = u8;
    type IntoIter = std::array::IntoIter<u8, 32>;

    fn into_iter(self) -> Self::IntoIter {
        self.0.into_iter()
    }
}

/// Serializable version of Solana's `AccountMeta`.
///
/// The native `AccountMeta` carries no serialization traits, but fulfillment
/// needs account metadata inside route calldata so the destination chain can
/// reconstruct the exact call the creator committed to. This mirror type is
/// what travels in `CalldataWithAccounts` and across chains.
#[derive(AnchorDeserialize, AnchorSerialize, Clone, Debug)]
pub struct SerializableAccountMeta {
    pub pubkey: Pubkey,
    pub is_signer: bool,
    pub is_writable: bool,
}

impl From<AccountInfo<'_>> for SerializableAccountMeta {
    fn from(account_info: AccountInfo<'_>) -> Self {
        Self {
            pubkey: account_info.key(),
            is_signer: account_info.is_signer,
            is_writable: account_info.is_writable,
        }
    }
}

impl From<AccountMeta> for SerializableAccountMeta {
    fn from(account_meta: AccountMeta) -> Self {
        Self {
            pubkey: account_meta.pubkey,
            is_signer: account_meta.is_signer,
            is_writable: account_meta.is_writable,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn bytes32_pubkey_round_trip() {
        let pubkey = Pubkey::new_unique();
        let bytes: Bytes32 = pubkey.into();

        assert_eq!(bytes, pubkey);
        assert_eq!(Pubkey::from(bytes), pubkey);
    }

    #[test]
    fn bytes32_zero() {
        assert!(Bytes32::ZERO.is_zero());
        assert!(Bytes32::default().is_zero());
        assert!(!Bytes32::from([1u8; 32]).is_zero());
    }

    #[test]
    fn bytes32_serialization_is_raw() {
        let bytes = Bytes32::from([7u8; 32]);
        let encoded = bytes.try_to_vec().unwrap();

        assert_eq!(encoded, vec![7u8; 32]);
    }
}
