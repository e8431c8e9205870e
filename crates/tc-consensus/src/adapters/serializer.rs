//! Canonical message encoding with bincode.
//!
//! bincode 1.x defaults: fixed-width little-endian integers, `u64` length
//! prefixes, one tag byte per `Option`.

use serde::Serialize;
use shared_types::{Block, BlockNumber, Hash};

use crate::domain::{AggregatedSignature, Commit, ConsensusResult, MessageType, Proposal, Round};
use crate::ports::MessageSerializer;

#[derive(Serialize)]
struct ProposalBody<'a> {
    kind: u8,
    block_number: BlockNumber,
    round: Round,
    valid_round: Option<Round>,
    block: &'a Block,
    lock_proof: &'a Option<AggregatedSignature>,
    validator_index: u64,
}

#[derive(Serialize)]
struct VoteBody {
    kind: u8,
    block_number: BlockNumber,
    round: Round,
    block_hash: Option<Hash>,
}

/// Default [`MessageSerializer`]
#[derive(Clone, Copy, Debug, Default)]
pub struct BincodeSerializer;

impl BincodeSerializer {
    pub fn new() -> Self {
        Self
    }
}

impl MessageSerializer for BincodeSerializer {
    fn proposal_signing_bytes(&self, proposal: &Proposal) -> ConsensusResult<Vec<u8>> {
        let body = ProposalBody {
            kind: MessageType::Proposal as u8,
            block_number: proposal.block_number,
            round: proposal.round,
            valid_round: proposal.valid_round,
            block: &proposal.block,
            lock_proof: &proposal.lock_proof,
            validator_index: proposal.validator_index as u64,
        };
        Ok(bincode::serialize(&body)?)
    }

    fn vote_signing_bytes(
        &self,
        kind: MessageType,
        block_number: BlockNumber,
        round: Round,
        block_hash: Option<Hash>,
    ) -> ConsensusResult<Vec<u8>> {
        let body = VoteBody {
            kind: kind as u8,
            block_number,
            round,
            block_hash,
        };
        Ok(bincode::serialize(&body)?)
    }

    fn commit_bytes(&self, commit: &Commit) -> ConsensusResult<Vec<u8>> {
        Ok(bincode::serialize(commit)?)
    }
}
