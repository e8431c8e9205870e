//! # tc-consensus
//!
//! Round engine for Tidal-Chain's proof-of-stake BFT consensus.
//!
//! ## Architecture
//!
//! Every height runs one or more rounds of three stages:
//!
//! ```text
//!   Propose ──→ Prevote ──→ Precommit ──→ commit (height + 1)
//!      │            │            │
//!      └── timeout ─┴── timeout ─┴── timeout ──→ round + 1
//! ```
//!
//! - **Processors** admit proposals and votes into per-(height, round)
//!   [`RoundState`](domain::RoundState)s and notify the driver.
//! - **The driver** ([`ConsensusService`]) owns the height / round / step
//!   cursor, evaluates the transition rules and signs the local validator's
//!   messages.
//! - **The scheduler** keeps one timeout per stage, growing with the round.
//!
//! A height commits once more than two thirds of the round validators
//! precommit the proposed block; the commit carries their aggregated BLS
//! signature and a bitmap of signers.
//!
//! ## Usage
//!
//! ```rust,ignore
//! use tc_consensus::{ConsensusConfig, ConsensusDependencies, ConsensusService};
//!
//! let (service, events) = ConsensusService::new(ConsensusConfig::default(), deps)?;
//! let service = Arc::new(service);
//!
//! // Network ingress
//! let handler = service.processors();
//! handler.handle_message(message, true).await?;
//!
//! service.start(1).await?;
//! service.run(events, shutdown).await?;
//! ```
//!
//! ## Safety
//!
//! - A validator never precommits two blocks in one height unless a prevote
//!   majority justified unlocking.
//! - Conflicting votes from one validator are kept as evidence and never
//!   counted twice.
//! - Invariant violations halt the driver instead of committing.

pub mod adapters;
pub mod domain;
pub mod events;
pub mod metrics;
pub mod ports;
pub mod service;

#[cfg(test)]
pub(crate) mod test_support;

// Re-export main types
pub use adapters::{
    BincodeSerializer, BlsSignatureService, BlsSigner, ChannelBroadcaster, InMemoryExecution,
    RoundRobinProposerSelector, StaticValidatorSet,
};
pub use domain::{
    AggregatedSignature, Commit, CommitProof, ConsensusConfig, ConsensusError, ConsensusMessage,
    ConsensusResult, Equivocation, MessageType, Milestone, Precommit, Prevote, ProcessorResult,
    Proposal, Round, RoundState, SerializedCommit, Step, ValidatorIndex, ValidatorWallet,
};
pub use events::{ConsensusEvent, EventReceiver};
pub use ports::{
    Broadcaster, ExecutionGateway, MessageHandler, MessageSerializer, ProposerSelector,
    SignatureService, Signer, ValidatorSetProvider,
};
pub use service::{ConsensusDependencies, ConsensusService, RoundCursor};
