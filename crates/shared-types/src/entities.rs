//! # Core Domain Entities
//!
//! Chain entities shared by the consensus engine, the execution gateway and
//! the node runtime.
//!
//! ## Clusters
//!
//! - **Chain**: `Block`, `BlockHeader`
//! - **Identity**: `Address`, `Hash`

use serde::{Deserialize, Serialize};
use sha3::{Digest, Keccak256};

// =============================================================================
// CLUSTER A: THE CHAIN
// =============================================================================

/// A 32-byte hash (keccak-256).
pub type Hash = [u8; 32];

/// A 20-byte validator/account address.
pub type Address = [u8; 20];

/// Height of a block in the chain.
pub type BlockNumber = u64;

/// The all-zero hash used as the parent of the genesis block.
pub const ZERO_HASH: Hash = [0u8; 32];

/// The header of a block containing metadata and root hashes.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
pub struct BlockHeader {
    /// Protocol version for this block.
    pub version: u16,
    /// Block height in the chain.
    pub number: BlockNumber,
    /// Round in which the block was proposed.
    pub round: u32,
    /// Hash of the parent block (creates the chain linkage).
    pub parent_hash: Hash,
    /// Unix timestamp (milliseconds) when the block was built.
    pub timestamp: u64,
    /// Address of the validator that built the block.
    pub generator: Address,
    /// keccak-256 over the concatenated transaction payloads.
    pub payload_hash: Hash,
    /// Number of transactions carried by the block.
    pub transactions_count: u32,
}

impl BlockHeader {
    /// Compute the keccak-256 hash of this header.
    pub fn hash(&self) -> Hash {
        let mut hasher = Keccak256::new();
        hasher.update(self.version.to_le_bytes());
        hasher.update(self.number.to_le_bytes());
        hasher.update(self.round.to_le_bytes());
        hasher.update(self.parent_hash);
        hasher.update(self.timestamp.to_le_bytes());
        hasher.update(self.generator);
        hasher.update(self.payload_hash);
        hasher.update(self.transactions_count.to_le_bytes());
        hasher.finalize().into()
    }

    /// Check if this is a genesis header.
    pub fn is_genesis(&self) -> bool {
        self.number == 0 && self.parent_hash == ZERO_HASH
    }
}

/// A block as proposed by a validator and agreed upon by consensus.
///
/// Transactions are opaque byte payloads; their validity is decided by the
/// execution layer, not by consensus.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
pub struct Block {
    /// The block header.
    pub header: BlockHeader,
    /// Raw transaction payloads.
    pub transactions: Vec<Vec<u8>>,
}

impl Block {
    /// Build a block, deriving `payload_hash` and `transactions_count` from
    /// the transactions.
    pub fn new(mut header: BlockHeader, transactions: Vec<Vec<u8>>) -> Self {
        header.payload_hash = payload_hash(&transactions);
        header.transactions_count = transactions.len() as u32;
        Self {
            header,
            transactions,
        }
    }

    /// Hash of the block (the header hash).
    pub fn hash(&self) -> Hash {
        self.header.hash()
    }

    /// Height of the block.
    pub fn number(&self) -> BlockNumber {
        self.header.number
    }

    /// Check that the header commits to the carried transactions.
    pub fn is_payload_consistent(&self) -> bool {
        self.header.transactions_count as usize == self.transactions.len()
            && self.header.payload_hash == payload_hash(&self.transactions)
    }
}

/// keccak-256 over the concatenated transaction payloads.
pub fn payload_hash(transactions: &[Vec<u8>]) -> Hash {
    let mut hasher = Keccak256::new();
    for tx in transactions {
        hasher.update((tx.len() as u32).to_le_bytes());
        hasher.update(tx);
    }
    hasher.finalize().into()
}

/// Short hex rendering of a hash for log fields.
pub fn short_hash(hash: &Hash) -> String {
    hash[..4].iter().map(|b| format!("{b:02x}")).collect()
}
