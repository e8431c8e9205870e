//! Driven ports (Outbound dependencies)
//!
//! Narrow interfaces to the collaborators the round engine relies on. The
//! default implementations live in [`crate::adapters`].

use async_trait::async_trait;
use shared_crypto::{BlsPublicKeyBytes, BlsSignatureBytes};
use shared_types::{Address, Block, BlockNumber, Hash};

use crate::domain::{
    Commit, ConsensusResult, Milestone, MessageType, Precommit, Prevote, Proposal, Round,
    SerializedCommit, ValidatorIndex, ValidatorWallet,
};

/// Ordered round-validator set for the active height.
pub trait ValidatorSetProvider: Send + Sync {
    /// Round validators; position in the vector is the validator index
    fn round_validators(&self) -> Vec<ValidatorWallet>;

    /// Validator at `index`, if any
    fn validator(&self, index: ValidatorIndex) -> Option<ValidatorWallet>;
}

/// Deterministic proposer rotation.
pub trait ProposerSelector: Send + Sync {
    /// Index of the proposer for `round` of the active height
    fn validator_index(&self, round: Round) -> ValidatorIndex;

    /// Advance the rotation after a height committed in `round`
    fn on_commit(&self, round: Round);
}

/// Height-dependent consensus parameters.
pub trait MilestoneProvider: Send + Sync {
    fn milestone(&self, height: BlockNumber) -> Milestone;
}

/// BLS verification and aggregation.
///
/// Verification may be offloaded to a worker pool, so it is async.
/// Malformed keys or signatures verify as `false`.
#[async_trait]
pub trait SignatureService: Send + Sync {
    async fn verify(
        &self,
        message: &[u8],
        signature: &BlsSignatureBytes,
        public_key: &BlsPublicKeyBytes,
    ) -> bool;

    /// Verify an aggregate over one message signed by every key
    async fn verify_aggregate(
        &self,
        message: &[u8],
        signature: &BlsSignatureBytes,
        public_keys: &[BlsPublicKeyBytes],
    ) -> bool;

    fn aggregate_signatures(
        &self,
        signatures: &[BlsSignatureBytes],
    ) -> Result<BlsSignatureBytes, String>;
}

/// Local validator key.
pub trait Signer: Send + Sync {
    fn public_key(&self) -> BlsPublicKeyBytes;

    fn sign(&self, message: &[u8]) -> BlsSignatureBytes;
}

/// Canonical byte layout of signed payloads and commits.
///
/// Signatures are computed over these bytes, so every node must agree on
/// the layout bit for bit.
pub trait MessageSerializer: Send + Sync {
    /// Proposal body with the signature excluded
    fn proposal_signing_bytes(&self, proposal: &Proposal) -> ConsensusResult<Vec<u8>>;

    /// Vote body: type tag, height, round and optional block hash. The
    /// validator index is excluded so equal votes aggregate.
    fn vote_signing_bytes(
        &self,
        kind: MessageType,
        block_number: BlockNumber,
        round: Round,
        block_hash: Option<Hash>,
    ) -> ConsensusResult<Vec<u8>>;

    fn commit_bytes(&self, commit: &Commit) -> ConsensusResult<Vec<u8>>;
}

/// Fire-and-forget gossip of consensus messages.
pub trait Broadcaster: Send + Sync {
    fn broadcast_proposal(&self, proposal: &Proposal);

    fn broadcast_prevote(&self, prevote: &Prevote);

    fn broadcast_precommit(&self, precommit: &Precommit);
}

/// Block building, execution and persistence.
#[async_trait]
pub trait ExecutionGateway: Send + Sync {
    /// Build a fresh block for `height` proposed by `generator`
    async fn build_block(
        &self,
        height: BlockNumber,
        round: Round,
        generator: Address,
    ) -> Result<Block, String>;

    /// Execute a proposed block; `false` marks it unusable for voting
    async fn process_block(&self, block: &Block) -> bool;

    /// Persist a finalized commit
    async fn commit(&self, commit: SerializedCommit) -> Result<(), String>;
}

/// Callbacks invoked by the scheduler when a stage timer fires.
pub trait TimeoutHandler: Send + Sync {
    fn on_timeout_propose(&self, height: BlockNumber, round: Round);

    fn on_timeout_prevote(&self, height: BlockNumber, round: Round);

    fn on_timeout_precommit(&self, height: BlockNumber, round: Round);
}
