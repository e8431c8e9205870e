//! Per-(height, round) consensus state.
//!
//! A `RoundState` holds the proposer, the accepted proposal, every vote
//! received for the round and the commit derived from them. Mutation goes
//! through the processors and the driver; callers serialize access with a
//! lock around the state.

use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;

use shared_crypto::{BlsPublicKeyBytes, BlsSignatureBytes};
use shared_types::{short_hash, BlockNumber, Hash};
use tracing::debug;

use super::quorum::{is_majority, is_minority};
use super::{
    AggregatedSignature, Aggregator, Commit, CommitProof, ConsensusError, ConsensusResult,
    Equivocation, MessageType, Precommit, Prevote, Proposal, Round, SerializedCommit,
    ValidatorIndex, ValidatorWallet, Vote, VoteTally,
};
use crate::ports::{MessageSerializer, MilestoneProvider, ProposerSelector, ValidatorSetProvider};

/// Collaborators a [`RoundState`] is configured from.
#[derive(Clone)]
pub struct RoundStateDependencies {
    pub validators: Arc<dyn ValidatorSetProvider>,
    pub proposer_selector: Arc<dyn ProposerSelector>,
    pub milestones: Arc<dyn MilestoneProvider>,
    pub aggregator: Arc<Aggregator>,
    pub serializer: Arc<dyn MessageSerializer>,
}

/// Result of inserting a vote.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum VoteAdmission {
    /// First vote from this validator; tallies updated
    Added,
    /// Identical re-delivery; nothing changed
    Duplicate,
    /// Conflicts with the validator's earlier vote; recorded as evidence
    Equivocation,
}

enum Insert<V> {
    Added,
    Duplicate,
    Conflict(V),
}

/// Votes of one type for one round.
#[derive(Debug)]
struct VoteBook<V> {
    votes: BTreeMap<ValidatorIndex, V>,
    tally: VoteTally,
    signed: Vec<bool>,
}

impl<V: Vote> VoteBook<V> {
    fn new(validators: usize) -> Self {
        Self {
            votes: BTreeMap::new(),
            tally: VoteTally::new(),
            signed: vec![false; validators],
        }
    }

    fn insert(&mut self, vote: V) -> Insert<V> {
        let index = vote.validator_index();
        if let Some(existing) = self.votes.get(&index) {
            return if *existing == vote {
                Insert::Duplicate
            } else {
                Insert::Conflict(existing.clone())
            };
        }
        self.tally.increment(vote.block_hash());
        self.signed[index] = true;
        self.votes.insert(index, vote);
        Insert::Added
    }

    fn contains(&self, index: ValidatorIndex) -> bool {
        self.votes.contains_key(&index)
    }

    fn signatures_for(&self, block_hash: &Hash) -> BTreeMap<ValidatorIndex, BlsSignatureBytes> {
        self.votes
            .iter()
            .filter(|(_, vote)| vote.block_hash().as_ref() == Some(block_hash))
            .map(|(index, vote)| (*index, *vote.signature()))
            .collect()
    }
}

/// Mutable state of one (height, round).
pub struct RoundState {
    height: BlockNumber,
    round: Round,
    validators: Vec<ValidatorWallet>,
    proposer_index: ValidatorIndex,
    proposal: Option<Proposal>,
    processor_result: Option<bool>,
    prevotes: VoteBook<Prevote>,
    precommits: VoteBook<Precommit>,
    equivocations: Vec<Equivocation>,
    commit: Option<SerializedCommit>,
    aggregator: Arc<Aggregator>,
    serializer: Arc<dyn MessageSerializer>,
}

impl RoundState {
    /// Resolve the round-validator set and proposer for `(height, round)`.
    ///
    /// The validator count is fixed for the lifetime of the state and must
    /// match the milestone active at `height`.
    pub fn configure(
        height: BlockNumber,
        round: Round,
        deps: &RoundStateDependencies,
    ) -> ConsensusResult<Self> {
        let milestone = deps.milestones.milestone(height);
        let validators = deps.validators.round_validators();
        if validators.len() != milestone.round_validators {
            return Err(ConsensusError::ValidatorCountMismatch {
                expected: milestone.round_validators,
                actual: validators.len(),
            });
        }

        let proposer_index = deps.proposer_selector.validator_index(round);
        if proposer_index >= validators.len() {
            return Err(ConsensusError::ValidatorIndexOutOfRange {
                index: proposer_index,
                validators: validators.len(),
            });
        }

        let count = validators.len();
        Ok(Self {
            height,
            round,
            validators,
            proposer_index,
            proposal: None,
            processor_result: None,
            prevotes: VoteBook::new(count),
            precommits: VoteBook::new(count),
            equivocations: Vec::new(),
            commit: None,
            aggregator: deps.aggregator.clone(),
            serializer: deps.serializer.clone(),
        })
    }

    pub fn height(&self) -> BlockNumber {
        self.height
    }

    pub fn round(&self) -> Round {
        self.round
    }

    pub fn validators(&self) -> &[ValidatorWallet] {
        &self.validators
    }

    pub fn validator(&self, index: ValidatorIndex) -> Option<&ValidatorWallet> {
        self.validators.get(index)
    }

    pub fn validator_count(&self) -> usize {
        self.validators.len()
    }

    /// Index of the validator owning `public_key`
    pub fn validator_index_of(&self, public_key: &BlsPublicKeyBytes) -> Option<ValidatorIndex> {
        self.validators
            .iter()
            .position(|v| &v.bls_public_key == public_key)
    }

    pub fn proposer_index(&self) -> ValidatorIndex {
        self.proposer_index
    }

    pub fn proposer(&self) -> &ValidatorWallet {
        &self.validators[self.proposer_index]
    }

    // =========================================================================
    // Proposal
    // =========================================================================

    pub fn has_proposal(&self) -> bool {
        self.proposal.is_some()
    }

    pub fn proposal(&self) -> Option<&Proposal> {
        self.proposal.as_ref()
    }

    /// Store the round's proposal. A second call is an invariant violation.
    pub fn add_proposal(&mut self, proposal: Proposal) -> ConsensusResult<()> {
        if self.proposal.is_some() {
            return Err(ConsensusError::ProposalAlreadySet {
                height: self.height,
                round: self.round,
            });
        }
        debug!(
            height = self.height,
            round = self.round,
            block_hash = %short_hash(&proposal.block_hash()),
            "[tc-consensus] Proposal stored"
        );
        self.proposal = Some(proposal);
        Ok(())
    }

    /// Record whether the proposed block executed successfully
    pub fn set_processor_result(&mut self, valid: bool) {
        self.processor_result = Some(valid);
    }

    pub fn processor_result(&self) -> Option<bool> {
        self.processor_result
    }

    pub fn has_valid_processor_result(&self) -> bool {
        self.processor_result == Some(true)
    }

    // =========================================================================
    // Votes
    // =========================================================================

    pub fn has_prevote(&self, index: ValidatorIndex) -> bool {
        self.prevotes.contains(index)
    }

    pub fn has_precommit(&self, index: ValidatorIndex) -> bool {
        self.precommits.contains(index)
    }

    pub fn add_prevote(&mut self, prevote: Prevote) -> ConsensusResult<VoteAdmission> {
        self.check_index(prevote.validator_index)?;
        let outcome = self.prevotes.insert(prevote.clone());
        Ok(self.settle(outcome, prevote))
    }

    pub fn add_precommit(&mut self, precommit: Precommit) -> ConsensusResult<VoteAdmission> {
        self.check_index(precommit.validator_index)?;
        let outcome = self.precommits.insert(precommit.clone());
        Ok(self.settle(outcome, precommit))
    }

    fn check_index(&self, index: ValidatorIndex) -> ConsensusResult<()> {
        if index >= self.validators.len() {
            return Err(ConsensusError::ValidatorIndexOutOfRange {
                index,
                validators: self.validators.len(),
            });
        }
        Ok(())
    }

    fn settle<V: Vote>(&mut self, outcome: Insert<V>, vote: V) -> VoteAdmission {
        match outcome {
            Insert::Added => {
                debug!(
                    height = self.height,
                    round = self.round,
                    kind = V::KIND.as_str(),
                    validator_index = vote.validator_index(),
                    nil = vote.block_hash().is_none(),
                    "[tc-consensus] Vote added"
                );
                VoteAdmission::Added
            }
            Insert::Duplicate => VoteAdmission::Duplicate,
            Insert::Conflict(first) => {
                self.equivocations.push(Equivocation {
                    kind: V::KIND,
                    validator_index: vote.validator_index(),
                    first: first.into(),
                    second: vote.into(),
                });
                VoteAdmission::Equivocation
            }
        }
    }

    pub fn prevotes(&self) -> impl Iterator<Item = &Prevote> {
        self.prevotes.votes.values()
    }

    pub fn precommits(&self) -> impl Iterator<Item = &Precommit> {
        self.precommits.votes.values()
    }

    /// Prevotes for `block_hash` (`None` counts nil)
    pub fn prevote_count(&self, block_hash: Option<Hash>) -> usize {
        self.prevotes.tally.count(block_hash)
    }

    /// Precommits for `block_hash` (`None` counts nil)
    pub fn precommit_count(&self, block_hash: Option<Hash>) -> usize {
        self.precommits.tally.count(block_hash)
    }

    pub fn validators_signed_prevote(&self) -> &[bool] {
        &self.prevotes.signed
    }

    pub fn validators_signed_precommit(&self) -> &[bool] {
        &self.precommits.signed
    }

    /// Conflicting vote pairs observed in this round
    pub fn equivocations(&self) -> &[Equivocation] {
        &self.equivocations
    }

    // =========================================================================
    // Quorum predicates
    // =========================================================================

    fn proposal_hash(&self) -> Option<Hash> {
        self.proposal.as_ref().map(Proposal::block_hash)
    }

    /// Prevote majority for the proposed block
    pub fn has_majority_prevotes(&self) -> bool {
        self.proposal_hash()
            .is_some_and(|hash| self.has_majority_prevotes_for(&hash))
    }

    /// Prevote majority for a specific block, proposal or not
    pub fn has_majority_prevotes_for(&self, block_hash: &Hash) -> bool {
        is_majority(self.prevote_count(Some(*block_hash)), self.validator_count())
    }

    pub fn has_majority_prevotes_any(&self) -> bool {
        is_majority(self.prevotes.tally.total(), self.validator_count())
    }

    pub fn has_majority_prevotes_null(&self) -> bool {
        is_majority(self.prevote_count(None), self.validator_count())
    }

    /// Precommit majority for the proposed block
    pub fn has_majority_precommits(&self) -> bool {
        self.proposal_hash().is_some_and(|hash| {
            is_majority(self.precommit_count(Some(hash)), self.validator_count())
        })
    }

    pub fn has_majority_precommits_any(&self) -> bool {
        is_majority(self.precommits.tally.total(), self.validator_count())
    }

    /// At least a third of the validators sent a prevote or a precommit
    pub fn has_minority_prevotes_or_precommits(&self) -> bool {
        let signers = self
            .prevotes
            .signed
            .iter()
            .zip(&self.precommits.signed)
            .filter(|(prevote, precommit)| **prevote || **precommit)
            .count();
        is_minority(signers, self.validator_count())
    }

    // =========================================================================
    // Aggregation
    // =========================================================================

    /// Aggregate the prevote majority for the proposed block
    pub fn aggregate_majority_prevotes(&self) -> ConsensusResult<AggregatedSignature> {
        let hash = self.require_proposal_hash()?;
        if !self.has_majority_prevotes() {
            return Err(ConsensusError::NoMajority {
                kind: MessageType::Prevote,
                height: self.height,
                round: self.round,
            });
        }
        self.aggregator
            .aggregate(&self.prevotes.signatures_for(&hash), self.validator_count())
    }

    /// Lock proof to attach when re-proposing this round's block
    pub fn proposal_lock_proof(&self) -> Option<AggregatedSignature> {
        if !self.has_majority_prevotes() {
            return None;
        }
        self.aggregate_majority_prevotes().ok()
    }

    /// Aggregate the precommit majority for the proposed block
    pub fn aggregate_majority_precommits(&self) -> ConsensusResult<AggregatedSignature> {
        let hash = self.require_proposal_hash()?;
        if !self.has_majority_precommits() {
            return Err(ConsensusError::NoMajority {
                kind: MessageType::Precommit,
                height: self.height,
                round: self.round,
            });
        }
        self.aggregator
            .aggregate(&self.precommits.signatures_for(&hash), self.validator_count())
    }

    fn require_proposal_hash(&self) -> ConsensusResult<Hash> {
        self.proposal_hash().ok_or(ConsensusError::ProposalMissing {
            height: self.height,
            round: self.round,
        })
    }

    /// Commit for the proposed block, built once and cached.
    ///
    /// Requires a proposal and a precommit majority for it; calling earlier
    /// is an invariant violation.
    pub fn get_commit(&mut self) -> ConsensusResult<&SerializedCommit> {
        if self.commit.is_none() {
            let commit = self.build_commit()?;
            self.commit = Some(commit);
        }
        self.commit
            .as_ref()
            .ok_or(ConsensusError::CommitWithoutQuorum {
                height: self.height,
                round: self.round,
            })
    }

    fn build_commit(&self) -> ConsensusResult<SerializedCommit> {
        let proposal = self.proposal.as_ref().ok_or(ConsensusError::ProposalMissing {
            height: self.height,
            round: self.round,
        })?;
        if !self.has_majority_precommits() {
            return Err(ConsensusError::CommitWithoutQuorum {
                height: self.height,
                round: self.round,
            });
        }

        let commit = Commit {
            block: proposal.block.clone(),
            proof: CommitProof {
                round: self.round,
                aggregate: self.aggregate_majority_precommits()?,
            },
        };
        let bytes = self.serializer.commit_bytes(&commit)?;
        Ok(SerializedCommit { commit, bytes })
    }
}

impl fmt::Debug for RoundState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RoundState")
            .field("height", &self.height)
            .field("round", &self.round)
            .field("validators", &self.validators.len())
            .field("proposer_index", &self.proposer_index)
            .field("has_proposal", &self.proposal.is_some())
            .field("processor_result", &self.processor_result)
            .field("prevotes", &self.prevotes.tally.total())
            .field("precommits", &self.precommits.tally.total())
            .field("committed", &self.commit.is_some())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::ConsensusMessage;
    use crate::test_support::TestNetwork;

    #[test]
    fn test_configure_resolves_proposer() {
        let network = TestNetwork::new(4);
        let state = network.round_state(1, 2);

        assert_eq!(state.height(), 1);
        assert_eq!(state.round(), 2);
        assert_eq!(state.validator_count(), 4);
        assert_eq!(state.proposer_index(), 2);
        assert_eq!(state.proposer(), &network.validators[2]);
        assert!(!state.has_proposal());
        assert_eq!(state.validators_signed_prevote(), &[false; 4]);
    }

    #[test]
    fn test_configure_rejects_count_mismatch() {
        let network = TestNetwork::new(4);
        let deps = network.dependencies_with_milestone_size(5);

        let err = RoundState::configure(1, 0, &deps).unwrap_err();
        assert_eq!(
            err,
            ConsensusError::ValidatorCountMismatch {
                expected: 5,
                actual: 4
            }
        );
        assert!(err.is_invariant_violation());
    }

    #[test]
    fn test_second_proposal_is_invariant_violation() {
        let network = TestNetwork::new(4);
        let mut state = network.round_state(1, 0);
        let proposal = network.proposal(1, 0, 0);

        state.add_proposal(proposal.clone()).unwrap();
        let err = state.add_proposal(proposal).unwrap_err();
        assert!(err.is_invariant_violation());
    }

    #[test]
    fn test_vote_tallies_and_bitmaps() {
        let network = TestNetwork::new(4);
        let mut state = network.round_state(1, 0);
        let hash = network.proposal(1, 0, 0).block_hash();

        assert_eq!(
            state.add_prevote(network.prevote(1, 0, Some(hash), 0)),
            Ok(VoteAdmission::Added)
        );
        assert_eq!(
            state.add_prevote(network.prevote(1, 0, Some(hash), 1)),
            Ok(VoteAdmission::Added)
        );
        assert_eq!(
            state.add_prevote(network.prevote(1, 0, None, 3)),
            Ok(VoteAdmission::Added)
        );

        assert_eq!(state.prevote_count(Some(hash)), 2);
        assert_eq!(state.prevote_count(None), 1);
        assert_eq!(state.validators_signed_prevote(), &[true, true, false, true]);
        assert!(state.has_prevote(3));
        assert!(!state.has_prevote(2));
        assert!(!state.has_precommit(0));
        assert!(state.has_majority_prevotes_any());
        assert!(!state.has_majority_prevotes_for(&hash));
        assert!(!state.has_majority_prevotes_null());
    }

    #[test]
    fn test_duplicate_and_equivocation_do_not_change_tally() {
        let network = TestNetwork::new(4);
        let mut state = network.round_state(1, 0);
        let hash = [7u8; 32];
        let first = network.prevote(1, 0, Some(hash), 2);

        assert_eq!(state.add_prevote(first.clone()), Ok(VoteAdmission::Added));
        assert_eq!(state.add_prevote(first.clone()), Ok(VoteAdmission::Duplicate));

        let conflicting = network.prevote(1, 0, None, 2);
        assert_eq!(
            state.add_prevote(conflicting.clone()),
            Ok(VoteAdmission::Equivocation)
        );

        assert_eq!(state.prevote_count(Some(hash)), 1);
        assert_eq!(state.prevote_count(None), 0);
        assert_eq!(state.prevotes().count(), 1);
        assert_eq!(state.equivocations().len(), 1);

        let evidence = &state.equivocations()[0];
        assert_eq!(evidence.kind, MessageType::Prevote);
        assert_eq!(evidence.validator_index, 2);
        assert_eq!(evidence.first, ConsensusMessage::Prevote(first));
        assert_eq!(evidence.second, ConsensusMessage::Prevote(conflicting));
    }

    #[test]
    fn test_out_of_range_vote_is_error() {
        let network = TestNetwork::new(4);
        let mut state = network.round_state(1, 0);
        let mut vote = network.precommit(1, 0, None, 0);
        vote.validator_index = 4;

        assert!(matches!(
            state.add_precommit(vote),
            Err(ConsensusError::ValidatorIndexOutOfRange { index: 4, .. })
        ));
    }

    #[test]
    fn test_minority_counts_distinct_signers() {
        let network = TestNetwork::new(4);
        let mut state = network.round_state(1, 3);

        state.add_prevote(network.prevote(1, 3, None, 1)).unwrap();
        state.add_precommit(network.precommit(1, 3, None, 1)).unwrap();
        assert!(!state.has_minority_prevotes_or_precommits());

        state.add_precommit(network.precommit(1, 3, None, 2)).unwrap();
        assert!(state.has_minority_prevotes_or_precommits());
    }

    #[test]
    fn test_commit_requires_quorum_on_proposal() {
        let network = TestNetwork::new(4);
        let mut state = network.round_state(1, 0);

        assert!(matches!(
            state.get_commit(),
            Err(ConsensusError::ProposalMissing { .. })
        ));

        let proposal = network.proposal(1, 0, 0);
        let hash = proposal.block_hash();
        state.add_proposal(proposal).unwrap();
        state.add_precommit(network.precommit(1, 0, Some(hash), 0)).unwrap();
        state.add_precommit(network.precommit(1, 0, Some(hash), 1)).unwrap();
        state.add_precommit(network.precommit(1, 0, None, 2)).unwrap();
        state.add_precommit(network.precommit(1, 0, Some([9u8; 32]), 3)).unwrap();

        assert!(state.has_majority_precommits_any());
        assert!(!state.has_majority_precommits());
        let err = state.get_commit().unwrap_err();
        assert!(matches!(err, ConsensusError::CommitWithoutQuorum { .. }));
        assert!(err.is_invariant_violation());
    }

    #[test]
    fn test_commit_is_built_once_and_cached() {
        let network = TestNetwork::new(4);
        let mut state = network.round_state(1, 0);
        let proposal = network.proposal(1, 0, 0);
        let hash = proposal.block_hash();
        state.add_proposal(proposal.clone()).unwrap();

        // 2n/3 + 1 = 3 matching precommits, plus one nil that must be ignored
        for index in 0..3 {
            state
                .add_precommit(network.precommit(1, 0, Some(hash), index))
                .unwrap();
        }
        state.add_precommit(network.precommit(1, 0, None, 3)).unwrap();
        assert!(state.has_majority_precommits());

        let first = state.get_commit().unwrap().clone();
        let second = state.get_commit().unwrap().clone();
        assert_eq!(first, second);
        assert_eq!(first.block_hash(), hash);
        assert_eq!(first.round(), 0);
        assert_eq!(first.commit.proof.aggregate.signer_indices(), vec![0, 1, 2]);
        assert_eq!(first.commit.block, proposal.block);
    }

    #[test]
    fn test_lock_proof_needs_prevote_majority() {
        let network = TestNetwork::new(4);
        let mut state = network.round_state(1, 0);
        let proposal = network.proposal(1, 0, 0);
        let hash = proposal.block_hash();
        state.add_proposal(proposal).unwrap();

        state.add_prevote(network.prevote(1, 0, Some(hash), 0)).unwrap();
        state.add_prevote(network.prevote(1, 0, Some(hash), 1)).unwrap();
        assert!(state.proposal_lock_proof().is_none());
        assert!(matches!(
            state.aggregate_majority_prevotes(),
            Err(ConsensusError::NoMajority { .. })
        ));

        state.add_prevote(network.prevote(1, 0, Some(hash), 3)).unwrap();
        let proof = state.proposal_lock_proof().unwrap();
        assert_eq!(proof.signer_indices(), vec![0, 1, 3]);
    }
}
