//! Aggregated signatures and the commit artifact.

use bitvec::prelude::*;
use serde::{Deserialize, Serialize};
use serde_with::{serde_as, Bytes};
use shared_crypto::BlsSignatureBytes;
use shared_types::{Block, BlockNumber, Hash};

use super::{Round, ValidatorIndex};

/// One BLS signature standing for every validator set in `validators`.
///
/// The bitmap is sized to the round-validator count; bit `i` is set when the
/// validator at index `i` contributed its signature.
#[serde_as]
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct AggregatedSignature {
    #[serde_as(as = "Bytes")]
    pub signature: BlsSignatureBytes,
    pub validators: BitVec<u8, Msb0>,
}

impl AggregatedSignature {
    /// Number of contributing validators
    pub fn participants(&self) -> usize {
        self.validators.count_ones()
    }

    /// Check whether the validator at `index` contributed
    pub fn has_signed(&self, index: ValidatorIndex) -> bool {
        self.validators.get(index).map(|b| *b).unwrap_or(false)
    }

    /// Indices of contributing validators in ascending order
    pub fn signer_indices(&self) -> Vec<ValidatorIndex> {
        self.validators.iter_ones().collect()
    }
}

/// Precommit proof attached to a committed block.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct CommitProof {
    pub round: Round,
    pub aggregate: AggregatedSignature,
}

/// Finalized block together with its precommit proof.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Commit {
    pub block: Block,
    pub proof: CommitProof,
}

/// A [`Commit`] plus its canonical serialized bytes, as handed to execution.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct SerializedCommit {
    pub commit: Commit,
    pub bytes: Vec<u8>,
}

impl SerializedCommit {
    pub fn block_number(&self) -> BlockNumber {
        self.commit.block.number()
    }

    pub fn block_hash(&self) -> Hash {
        self.commit.block.hash()
    }

    pub fn round(&self) -> Round {
        self.commit.proof.round
    }
}
