//! Channel-backed broadcaster.

use tokio::sync::mpsc;
use tracing::trace;

use crate::domain::{ConsensusMessage, Precommit, Prevote, Proposal};
use crate::ports::Broadcaster;

/// Pushes outgoing messages onto an unbounded channel drained by the
/// network layer. Never blocks; a closed channel drops the message.
#[derive(Clone, Debug)]
pub struct ChannelBroadcaster {
    sender: mpsc::UnboundedSender<ConsensusMessage>,
}

impl ChannelBroadcaster {
    pub fn new() -> (Self, mpsc::UnboundedReceiver<ConsensusMessage>) {
        let (sender, receiver) = mpsc::unbounded_channel();
        (Self { sender }, receiver)
    }

    fn send(&self, message: ConsensusMessage) {
        if self.sender.send(message).is_err() {
            trace!("[tc-consensus] Broadcast channel closed, message dropped");
        }
    }
}

impl Broadcaster for ChannelBroadcaster {
    fn broadcast_proposal(&self, proposal: &Proposal) {
        self.send(ConsensusMessage::Proposal(proposal.clone()));
    }

    fn broadcast_prevote(&self, prevote: &Prevote) {
        self.send(ConsensusMessage::Prevote(prevote.clone()));
    }

    fn broadcast_precommit(&self, precommit: &Precommit) {
        self.send(ConsensusMessage::Precommit(precommit.clone()));
    }
}
