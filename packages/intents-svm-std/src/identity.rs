use anchor_lang::prelude::*;

use crate::Bytes32;

pub const EVM_ADDRESS_LEN: usize = 20;

/// High-order bytes that must be zero for a universal identity to narrow
/// into an EVM address.
const EVM_PADDING_LEN: usize = 32 - EVM_ADDRESS_LEN;

#[error_code]
pub enum IdentityError {
    #[msg("universal identity does not fit the native address width")]
    InvalidNativeAddress,
}

/// A destination-chain native account identifier for EVM chains.
///
/// Solana addresses already occupy the full universal width, so
/// `Pubkey <-> Bytes32` conversion is total in both directions. EVM
/// addresses are narrower; widening zero-extends the high-order bytes and
/// narrowing is a validation gate, not a truncation. Silently truncating
/// would let a universal identifier for one chain alias a valid native
/// address on another.
#[derive(AnchorSerialize, AnchorDeserialize, Clone, Copy, Debug, PartialEq, Eq)]
pub struct EvmAddress([u8; EVM_ADDRESS_LEN]);

impl EvmAddress {
    pub fn widen(&self) -> Bytes32 {
        let mut bytes = [0u8; 32];
        bytes[EVM_PADDING_LEN..].copy_from_slice(&self.0);

        bytes.into()
    }
}

impl From<[u8; EVM_ADDRESS_LEN]> for EvmAddress {
    fn from(bytes: [u8; EVM_ADDRESS_LEN]) -> Self {
        EvmAddress(bytes)
    }
}

impl From<EvmAddress> for [u8; EVM_ADDRESS_LEN] {
    fn from(address: EvmAddress) -> Self {
        address.0
    }
}

impl Bytes32 {
    /// Narrows to an EVM address. Fails unless every byte beyond the
    /// native width is zero.
    pub fn narrow_evm(&self) -> Result<EvmAddress> {
        let (padding, address) = self.split_at(EVM_PADDING_LEN);
        require!(
            padding.iter().all(|byte| *byte == 0),
            IdentityError::InvalidNativeAddress
        );

        let address: [u8; EVM_ADDRESS_LEN] = address
            .try_into()
            .map_err(|_| IdentityError::InvalidNativeAddress)?;

        Ok(address.into())
    }

    /// Narrows to a Solana address. Total, since the native width equals
    /// the universal width.
    pub fn narrow_pubkey(&self) -> Pubkey {
        Pubkey::new_from_array((*self).into())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn evm_round_trip() {
        let address = EvmAddress::from([0xabu8; EVM_ADDRESS_LEN]);

        assert_eq!(address.widen().narrow_evm().unwrap(), address);
    }

    #[test]
    fn evm_widen_pads_high_order_bytes() {
        let address = EvmAddress::from([0x11u8; EVM_ADDRESS_LEN]);
        let widened = address.widen();

        assert_eq!(&widened[..EVM_PADDING_LEN], &[0u8; EVM_PADDING_LEN]);
        assert_eq!(&widened[EVM_PADDING_LEN..], &[0x11u8; EVM_ADDRESS_LEN]);
    }

    #[test]
    fn narrow_evm_rejects_nonzero_padding() {
        let mut bytes = [0u8; 32];
        bytes[EVM_PADDING_LEN..].copy_from_slice(&[0x22u8; EVM_ADDRESS_LEN]);
        bytes[0] = 1;

        assert!(Bytes32::from(bytes).narrow_evm().is_err());
    }

    #[test]
    fn narrow_evm_accepts_zero_identity() {
        let address = Bytes32::ZERO.narrow_evm().unwrap();

        assert_eq!(address, EvmAddress::from([0u8; EVM_ADDRESS_LEN]));
    }

    #[test]
    fn pubkey_round_trip() {
        let pubkey = Pubkey::new_unique();
        let widened: Bytes32 = pubkey.into();

        assert_eq!(widened.narrow_pubkey(), pubkey);
    }
}
