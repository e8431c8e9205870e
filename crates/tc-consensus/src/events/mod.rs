//! Events consumed by the consensus driver loop.
//!
//! Processors and the scheduler never call into the driver directly; they
//! post events on an unbounded channel drained by
//! [`ConsensusService::run`](crate::service::ConsensusService::run).

use shared_types::BlockNumber;
use tokio::sync::mpsc;
use tracing::trace;

use crate::domain::Round;
use crate::ports::TimeoutHandler;

/// Work item for the driver.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ConsensusEvent {
    /// A message was admitted into the round state at (height, round)
    RoundStateChanged { height: BlockNumber, round: Round },
    TimeoutPropose { height: BlockNumber, round: Round },
    TimeoutPrevote { height: BlockNumber, round: Round },
    TimeoutPrecommit { height: BlockNumber, round: Round },
}

pub type EventSender = mpsc::UnboundedSender<ConsensusEvent>;
pub type EventReceiver = mpsc::UnboundedReceiver<ConsensusEvent>;

pub fn event_channel() -> (EventSender, EventReceiver) {
    mpsc::unbounded_channel()
}

/// Send an event, ignoring a stopped driver
pub(crate) fn notify(sender: &EventSender, event: ConsensusEvent) {
    if sender.send(event).is_err() {
        trace!("[tc-consensus] Driver stopped, dropping {:?}", event);
    }
}

/// [`TimeoutHandler`] that turns fired timers into driver events.
#[derive(Clone, Debug)]
pub struct EventTimeoutHandler {
    sender: EventSender,
}

impl EventTimeoutHandler {
    pub fn new(sender: EventSender) -> Self {
        Self { sender }
    }
}

impl TimeoutHandler for EventTimeoutHandler {
    fn on_timeout_propose(&self, height: BlockNumber, round: Round) {
        notify(&self.sender, ConsensusEvent::TimeoutPropose { height, round });
    }

    fn on_timeout_prevote(&self, height: BlockNumber, round: Round) {
        notify(&self.sender, ConsensusEvent::TimeoutPrevote { height, round });
    }

    fn on_timeout_precommit(&self, height: BlockNumber, round: Round) {
        notify(&self.sender, ConsensusEvent::TimeoutPrecommit { height, round });
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_timeouts_become_events() {
        let (tx, mut rx) = event_channel();
        let handler = EventTimeoutHandler::new(tx);

        handler.on_timeout_propose(3, 1);
        handler.on_timeout_precommit(3, 1);

        assert_eq!(
            rx.try_recv().unwrap(),
            ConsensusEvent::TimeoutPropose {
                height: 3,
                round: 1
            }
        );
        assert_eq!(
            rx.try_recv().unwrap(),
            ConsensusEvent::TimeoutPrecommit {
                height: 3,
                round: 1
            }
        );
    }
}
