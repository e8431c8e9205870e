//! Consensus service layer
//!
//! - `consensus`: the driver state machine
//! - `processors`: inbound message admission
//! - `scheduler`: stage timeouts
//! - `repository`: round states by (height, round)

mod commit_lock;
mod consensus;
pub mod processors;
mod repository;
mod scheduler;
mod state;

pub use commit_lock::CommitLock;
pub use consensus::{ConsensusDependencies, ConsensusService};
pub use processors::{ProcessorContext, Processors};
pub use repository::{RoundStateRepository, SharedRoundState};
pub use scheduler::{Scheduler, TimeoutStage};
pub use state::{ConsensusState, RoundCursor};
