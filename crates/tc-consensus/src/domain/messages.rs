//! Consensus wire messages: proposals, prevotes and precommits.

use serde::{Deserialize, Serialize};
use serde_with::{serde_as, Bytes};
use shared_crypto::BlsSignatureBytes;
use shared_types::{Block, BlockNumber, Hash};

use super::AggregatedSignature;

/// Round number within a height. Reset to 0 on every new height.
pub type Round = u32;

/// Position of a validator in the ordered round-validator set.
pub type ValidatorIndex = usize;

/// Message type tag, part of every signed payload.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[repr(u8)]
pub enum MessageType {
    Proposal = 1,
    Prevote = 2,
    Precommit = 3,
}

impl MessageType {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Proposal => "proposal",
            Self::Prevote => "prevote",
            Self::Precommit => "precommit",
        }
    }
}

/// Step of the local validator inside the current round.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Step {
    Propose,
    Prevote,
    Precommit,
}

/// Outcome of processing an inbound message.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ProcessorResult {
    /// Admitted into the round state.
    Accepted,
    /// Stale, duplicate, or not actionable now. No peer penalty.
    Skipped,
    /// Violates a protocol rule. The sender may warrant a penalty.
    Invalid,
}

impl ProcessorResult {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Accepted => "accepted",
            Self::Skipped => "skipped",
            Self::Invalid => "invalid",
        }
    }
}

/// Block proposal for a (height, round).
///
/// `valid_round` is only set for re-proposals of a block that gathered a
/// prevote majority in an earlier round; `lock_proof` then carries the
/// aggregated prevotes of that round.
#[serde_as]
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Proposal {
    pub block_number: BlockNumber,
    pub round: Round,
    pub valid_round: Option<Round>,
    pub block: Block,
    pub lock_proof: Option<AggregatedSignature>,
    pub validator_index: ValidatorIndex,
    #[serde_as(as = "Bytes")]
    pub signature: BlsSignatureBytes,
}

impl Proposal {
    pub fn block_hash(&self) -> Hash {
        self.block.hash()
    }
}

/// First-stage vote. `block_hash == None` is a nil vote.
#[serde_as]
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Prevote {
    pub block_number: BlockNumber,
    pub round: Round,
    pub block_hash: Option<Hash>,
    pub validator_index: ValidatorIndex,
    #[serde_as(as = "Bytes")]
    pub signature: BlsSignatureBytes,
}

/// Second-stage vote. `block_hash == None` is a nil vote.
#[serde_as]
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Precommit {
    pub block_number: BlockNumber,
    pub round: Round,
    pub block_hash: Option<Hash>,
    pub validator_index: ValidatorIndex,
    #[serde_as(as = "Bytes")]
    pub signature: BlsSignatureBytes,
}

/// Common accessors over [`Prevote`] and [`Precommit`].
pub trait Vote: Clone + PartialEq + Send + Sync + Into<ConsensusMessage> + 'static {
    const KIND: MessageType;

    fn block_number(&self) -> BlockNumber;
    fn round(&self) -> Round;
    fn block_hash(&self) -> Option<Hash>;
    fn validator_index(&self) -> ValidatorIndex;
    fn signature(&self) -> &BlsSignatureBytes;
}

impl Vote for Prevote {
    const KIND: MessageType = MessageType::Prevote;

    fn block_number(&self) -> BlockNumber {
        self.block_number
    }
    fn round(&self) -> Round {
        self.round
    }
    fn block_hash(&self) -> Option<Hash> {
        self.block_hash
    }
    fn validator_index(&self) -> ValidatorIndex {
        self.validator_index
    }
    fn signature(&self) -> &BlsSignatureBytes {
        &self.signature
    }
}

impl Vote for Precommit {
    const KIND: MessageType = MessageType::Precommit;

    fn block_number(&self) -> BlockNumber {
        self.block_number
    }
    fn round(&self) -> Round {
        self.round
    }
    fn block_hash(&self) -> Option<Hash> {
        self.block_hash
    }
    fn validator_index(&self) -> ValidatorIndex {
        self.validator_index
    }
    fn signature(&self) -> &BlsSignatureBytes {
        &self.signature
    }
}

/// Any consensus message, as carried by the network layer.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum ConsensusMessage {
    Proposal(Proposal),
    Prevote(Prevote),
    Precommit(Precommit),
}

impl ConsensusMessage {
    pub fn kind(&self) -> MessageType {
        match self {
            Self::Proposal(_) => MessageType::Proposal,
            Self::Prevote(_) => MessageType::Prevote,
            Self::Precommit(_) => MessageType::Precommit,
        }
    }

    pub fn block_number(&self) -> BlockNumber {
        match self {
            Self::Proposal(p) => p.block_number,
            Self::Prevote(v) => v.block_number,
            Self::Precommit(v) => v.block_number,
        }
    }

    pub fn round(&self) -> Round {
        match self {
            Self::Proposal(p) => p.round,
            Self::Prevote(v) => v.round,
            Self::Precommit(v) => v.round,
        }
    }

    pub fn validator_index(&self) -> ValidatorIndex {
        match self {
            Self::Proposal(p) => p.validator_index,
            Self::Prevote(v) => v.validator_index,
            Self::Precommit(v) => v.validator_index,
        }
    }
}

impl From<Proposal> for ConsensusMessage {
    fn from(proposal: Proposal) -> Self {
        Self::Proposal(proposal)
    }
}

impl From<Prevote> for ConsensusMessage {
    fn from(prevote: Prevote) -> Self {
        Self::Prevote(prevote)
    }
}

impl From<Precommit> for ConsensusMessage {
    fn from(precommit: Precommit) -> Self {
        Self::Precommit(precommit)
    }
}

/// Two conflicting signed votes from the same validator in one round.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Equivocation {
    pub kind: MessageType,
    pub validator_index: ValidatorIndex,
    pub first: ConsensusMessage,
    pub second: ConsensusMessage,
}
