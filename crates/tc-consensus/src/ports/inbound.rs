//! Driving ports (Inbound API)
//!
//! What the network-ingress layer calls into.

use async_trait::async_trait;

use crate::domain::{ConsensusMessage, ConsensusResult, ProcessorResult};

/// Entry point for consensus messages received from peers.
#[async_trait]
pub trait MessageHandler: Send + Sync {
    /// Validate and admit a message.
    ///
    /// Protocol violations come back as [`ProcessorResult::Invalid`]; `Err`
    /// is reserved for failures of the local node.
    async fn handle_message(
        &self,
        message: ConsensusMessage,
        broadcast: bool,
    ) -> ConsensusResult<ProcessorResult>;
}
