//! Validator wallet as seen by consensus.

use serde::{Deserialize, Serialize};
use serde_with::{serde_as, Bytes};
use shared_crypto::BlsPublicKeyBytes;
use shared_types::Address;

/// An active validator in the round-validator set.
#[serde_as]
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ValidatorWallet {
    /// Account address, used as block generator
    pub address: Address,
    /// Consensus signing key
    #[serde_as(as = "Bytes")]
    pub bls_public_key: BlsPublicKeyBytes,
    /// Stake delegated to this validator
    pub vote_balance: u128,
    /// Number of delegating voters
    pub voters_count: u32,
    /// Resigned validators stay in the set until the next rotation
    pub is_resigned: bool,
}

impl ValidatorWallet {
    pub fn new(address: Address, bls_public_key: BlsPublicKeyBytes, vote_balance: u128) -> Self {
        Self {
            address,
            bls_public_key,
            vote_balance,
            voters_count: 0,
            is_resigned: false,
        }
    }
}
