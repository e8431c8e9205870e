//! Deterministic validator network for unit tests.

use std::sync::Arc;

use shared_crypto::{BlsKeyPair, BlsSecretKey, BlsSignatureBytes, SIGNATURE_LENGTH};
use shared_types::{Block, BlockHeader, BlockNumber, Hash, ZERO_HASH};

use crate::adapters::{
    BincodeSerializer, BlsSignatureService, BlsSigner, RoundRobinProposerSelector,
    StaticValidatorSet,
};
use crate::domain::{
    Aggregator, ConsensusConfig, MessageType, Milestone, Precommit, Prevote, Proposal, Round,
    RoundState, RoundStateDependencies, ValidatorIndex, ValidatorWallet,
};
use crate::ports::MessageSerializer;

pub(crate) struct TestNetwork {
    pub keys: Vec<BlsKeyPair>,
    pub validators: Vec<ValidatorWallet>,
    serializer: BincodeSerializer,
}

fn seed(index: ValidatorIndex) -> BlsSecretKey {
    BlsSecretKey::from_bytes(&[index as u8 + 1; 32])
}

impl TestNetwork {
    pub fn new(size: usize) -> Self {
        let keys: Vec<_> = (0..size)
            .map(|i| BlsKeyPair::from_seed(&seed(i)).unwrap())
            .collect();
        let validators = keys
            .iter()
            .enumerate()
            .map(|(i, key)| {
                ValidatorWallet::new([i as u8 + 1; 20], key.public_key().to_bytes(), 1_000)
            })
            .collect();
        Self {
            keys,
            validators,
            serializer: BincodeSerializer::new(),
        }
    }

    pub fn size(&self) -> usize {
        self.validators.len()
    }

    pub fn sign(&self, index: ValidatorIndex, message: &[u8]) -> BlsSignatureBytes {
        self.keys[index].sign(message).to_bytes()
    }

    /// Fresh signer holding validator `index`'s key
    pub fn signer(&self, index: ValidatorIndex) -> BlsSigner {
        BlsSigner::new(BlsKeyPair::from_seed(&seed(index)).unwrap())
    }

    /// Single milestone with short stage timeouts
    pub fn config(&self) -> ConsensusConfig {
        ConsensusConfig::with_milestone(Milestone {
            activation_height: 0,
            round_validators: self.size(),
            stage_timeout_ms: 1_000,
            stage_timeout_increase_ms: 1_000,
        })
    }

    pub fn dependencies(&self) -> RoundStateDependencies {
        self.dependencies_with_milestone_size(self.size())
    }

    pub fn dependencies_with_milestone_size(&self, round_validators: usize) -> RoundStateDependencies {
        let mut config = self.config();
        config.milestones[0].round_validators = round_validators;
        RoundStateDependencies {
            validators: Arc::new(StaticValidatorSet::new(self.validators.clone())),
            proposer_selector: Arc::new(RoundRobinProposerSelector::new(self.size())),
            milestones: Arc::new(config),
            aggregator: Arc::new(Aggregator::new(Arc::new(BlsSignatureService::new()))),
            serializer: Arc::new(BincodeSerializer::new()),
        }
    }

    pub fn round_state(&self, height: BlockNumber, round: Round) -> RoundState {
        RoundState::configure(height, round, &self.dependencies()).unwrap()
    }

    /// Empty block on top of the zero hash
    pub fn block(&self, height: BlockNumber, round: Round) -> Block {
        let header = BlockHeader {
            number: height,
            round,
            parent_hash: ZERO_HASH,
            generator: self.validators[round as usize % self.size()].address,
            ..Default::default()
        };
        Block::new(header, Vec::new())
    }

    pub fn proposal(
        &self,
        height: BlockNumber,
        round: Round,
        proposer: ValidatorIndex,
    ) -> Proposal {
        let mut proposal = Proposal {
            block_number: height,
            round,
            valid_round: None,
            block: self.block(height, round),
            lock_proof: None,
            validator_index: proposer,
            signature: [0u8; SIGNATURE_LENGTH],
        };
        self.sign_proposal(&mut proposal);
        proposal
    }

    /// Re-sign after the caller changed proposal fields
    pub fn sign_proposal(&self, proposal: &mut Proposal) {
        let message = self.serializer.proposal_signing_bytes(proposal).unwrap();
        proposal.signature = self.sign(proposal.validator_index, &message);
    }

    pub fn prevote(
        &self,
        height: BlockNumber,
        round: Round,
        block_hash: Option<Hash>,
        index: ValidatorIndex,
    ) -> Prevote {
        let message = self
            .serializer
            .vote_signing_bytes(MessageType::Prevote, height, round, block_hash)
            .unwrap();
        Prevote {
            block_number: height,
            round,
            block_hash,
            validator_index: index,
            signature: self.sign(index, &message),
        }
    }

    pub fn precommit(
        &self,
        height: BlockNumber,
        round: Round,
        block_hash: Option<Hash>,
        index: ValidatorIndex,
    ) -> Precommit {
        let message = self
            .serializer
            .vote_signing_bytes(MessageType::Precommit, height, round, block_hash)
            .unwrap();
        Precommit {
            block_number: height,
            round,
            block_hash,
            validator_index: index,
            signature: self.sign(index, &message),
        }
    }
}
