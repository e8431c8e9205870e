//! Error types for the consensus round engine
//!
//! Protocol-level rejection of peer messages is not an error: processors
//! report it through [`ProcessorResult`](super::ProcessorResult). The
//! variants here cover misconfiguration, collaborator failures, and broken
//! internal invariants.

use super::{MessageType, Round, ValidatorIndex};
use shared_types::BlockNumber;

/// Consensus error types
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ConsensusError {
    #[error("Validator set size {actual} does not match milestone size {expected}")]
    ValidatorCountMismatch { expected: usize, actual: usize },

    #[error("Proposal already set for height {height} round {round}")]
    ProposalAlreadySet { height: BlockNumber, round: Round },

    #[error("No proposal for height {height} round {round}")]
    ProposalMissing { height: BlockNumber, round: Round },

    #[error("No precommit majority for height {height} round {round}")]
    CommitWithoutQuorum { height: BlockNumber, round: Round },

    #[error("Validator index {index} out of range for {validators} validators")]
    ValidatorIndexOutOfRange {
        index: ValidatorIndex,
        validators: usize,
    },

    #[error("No {kind:?} majority for the proposal at height {height} round {round}")]
    NoMajority {
        kind: MessageType,
        height: BlockNumber,
        round: Round,
    },

    #[error("Cannot aggregate an empty signature set")]
    NoSignatures,

    #[error("Signature aggregation failed: {0}")]
    Aggregation(String),

    #[error("Serialization failed: {0}")]
    Serialization(String),

    #[error("Execution error: {0}")]
    Execution(String),

    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("Consensus service stopped")]
    Stopped,
}

impl ConsensusError {
    /// Broken internal invariants. The driver halts on these instead of
    /// continuing with a corrupted round state.
    pub fn is_invariant_violation(&self) -> bool {
        matches!(
            self,
            Self::ValidatorCountMismatch { .. }
                | Self::ProposalAlreadySet { .. }
                | Self::ProposalMissing { .. }
                | Self::CommitWithoutQuorum { .. }
        )
    }
}

impl From<bincode::Error> for ConsensusError {
    fn from(err: bincode::Error) -> Self {
        Self::Serialization(err.to_string())
    }
}

/// Result type for consensus operations
pub type ConsensusResult<T> = Result<T, ConsensusError>;
