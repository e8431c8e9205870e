//! Inbound message processors.
//!
//! Each processor validates one message type against the current driver
//! position and the round state, admits it, and tells the driver which
//! round changed. Every `process` call runs under the non-exclusive side of
//! the [`CommitLock`].

mod proposal;
mod vote;

pub use proposal::ProposalProcessor;
pub use vote::{PrecommitProcessor, PrevoteProcessor, VoteKind, VoteProcessor};

use std::sync::Arc;

use async_trait::async_trait;
use shared_types::BlockNumber;

use super::{CommitLock, ConsensusState, RoundStateRepository};
use crate::domain::{Aggregator, ConsensusMessage, ConsensusResult, ProcessorResult, Round};
use crate::events::{notify, ConsensusEvent, EventSender};
use crate::ports::{Broadcaster, MessageHandler, MessageSerializer, SignatureService};

/// Collaborators shared by all processors.
pub struct ProcessorContext {
    pub state: Arc<ConsensusState>,
    pub repository: Arc<RoundStateRepository>,
    pub signatures: Arc<dyn SignatureService>,
    pub serializer: Arc<dyn MessageSerializer>,
    pub aggregator: Arc<Aggregator>,
    pub broadcaster: Arc<dyn Broadcaster>,
    pub commit_lock: Arc<CommitLock>,
    pub events: EventSender,
    pub max_round_lookahead: Round,
}

impl ProcessorContext {
    /// `round` lies beyond the acceptance window of the current round
    fn exceeds_lookahead(&self, round: Round) -> bool {
        round > self.state.round().saturating_add(self.max_round_lookahead)
    }

    fn round_state_changed(&self, height: BlockNumber, round: Round) {
        notify(
            &self.events,
            ConsensusEvent::RoundStateChanged { height, round },
        );
    }
}

/// The three processors behind one [`MessageHandler`].
pub struct Processors {
    pub proposal: ProposalProcessor,
    pub prevote: PrevoteProcessor,
    pub precommit: PrecommitProcessor,
}

impl Processors {
    pub fn new(ctx: Arc<ProcessorContext>) -> Self {
        Self {
            proposal: ProposalProcessor::new(ctx.clone()),
            prevote: PrevoteProcessor::new(ctx.clone()),
            precommit: PrecommitProcessor::new(ctx),
        }
    }
}

#[async_trait]
impl MessageHandler for Processors {
    async fn handle_message(
        &self,
        message: ConsensusMessage,
        broadcast: bool,
    ) -> ConsensusResult<ProcessorResult> {
        match message {
            ConsensusMessage::Proposal(proposal) => self.proposal.process(proposal, broadcast).await,
            ConsensusMessage::Prevote(prevote) => self.prevote.process(prevote, broadcast).await,
            ConsensusMessage::Precommit(precommit) => {
                self.precommit.process(precommit, broadcast).await
            }
        }
    }
}
