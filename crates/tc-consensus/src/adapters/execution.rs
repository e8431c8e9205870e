//! In-memory execution gateway.
//!
//! Builds empty blocks chained by parent hash and keeps every commit in
//! memory. Used by the devnet runtime and tests.

use std::time::{SystemTime, UNIX_EPOCH};

use async_trait::async_trait;
use parking_lot::RwLock;
use shared_types::{
    short_hash, Address, Block, BlockHeader, BlockNumber, ChainError, Hash, ZERO_HASH,
};
use tokio::sync::mpsc;
use tracing::{debug, info};

use crate::domain::{Round, SerializedCommit};
use crate::ports::ExecutionGateway;

#[derive(Clone, Copy, Debug)]
struct ChainTip {
    height: BlockNumber,
    hash: Hash,
}

/// Execution gateway keeping the chain in memory.
pub struct InMemoryExecution {
    tip: RwLock<ChainTip>,
    commits: RwLock<Vec<SerializedCommit>>,
    sink: Option<mpsc::UnboundedSender<SerializedCommit>>,
}

impl InMemoryExecution {
    /// Chain whose genesis (height 0) has hash [`ZERO_HASH`]
    pub fn new() -> Self {
        Self::with_genesis(ZERO_HASH)
    }

    pub fn with_genesis(genesis_hash: Hash) -> Self {
        Self {
            tip: RwLock::new(ChainTip {
                height: 0,
                hash: genesis_hash,
            }),
            commits: RwLock::new(Vec::new()),
            sink: None,
        }
    }

    /// Also forward every commit to `sink`
    pub fn with_sink(mut self, sink: mpsc::UnboundedSender<SerializedCommit>) -> Self {
        self.sink = Some(sink);
        self
    }

    /// Height of the last committed block
    pub fn height(&self) -> BlockNumber {
        self.tip.read().height
    }

    pub fn committed(&self) -> Vec<SerializedCommit> {
        self.commits.read().clone()
    }

    fn check_extends_tip(&self, block: &Block) -> Result<(), ChainError> {
        let tip = *self.tip.read();
        if block.number() != tip.height + 1 {
            return Err(ChainError::InvalidHeight {
                expected: tip.height + 1,
                actual: block.number(),
            });
        }
        if block.header.parent_hash != tip.hash {
            return Err(ChainError::UnknownParent {
                height: block.number(),
            });
        }
        if !block.is_payload_consistent() {
            return Err(ChainError::PayloadMismatch {
                height: block.number(),
            });
        }
        Ok(())
    }
}

impl Default for InMemoryExecution {
    fn default() -> Self {
        Self::new()
    }
}

fn now_millis() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis() as u64)
        .unwrap_or_default()
}

#[async_trait]
impl ExecutionGateway for InMemoryExecution {
    async fn build_block(
        &self,
        height: BlockNumber,
        round: Round,
        generator: Address,
    ) -> Result<Block, String> {
        let tip = *self.tip.read();
        if height != tip.height + 1 {
            return Err(ChainError::InvalidHeight {
                expected: tip.height + 1,
                actual: height,
            }
            .to_string());
        }

        let header = BlockHeader {
            version: 1,
            number: height,
            round,
            parent_hash: tip.hash,
            timestamp: now_millis(),
            generator,
            ..BlockHeader::default()
        };
        Ok(Block::new(header, Vec::new()))
    }

    async fn process_block(&self, block: &Block) -> bool {
        match self.check_extends_tip(block) {
            Ok(()) => true,
            Err(e) => {
                debug!("[tc-consensus] Block rejected by execution: {}", e);
                false
            }
        }
    }

    async fn commit(&self, commit: SerializedCommit) -> Result<(), String> {
        self.check_extends_tip(&commit.commit.block)
            .map_err(|e| e.to_string())?;

        {
            let mut tip = self.tip.write();
            tip.height = commit.block_number();
            tip.hash = commit.block_hash();
        }
        info!(
            height = commit.block_number(),
            round = commit.round(),
            block_hash = %short_hash(&commit.block_hash()),
            signers = commit.commit.proof.aggregate.participants(),
            "[tc-consensus] Block committed"
        );

        if let Some(sink) = &self.sink {
            let _ = sink.send(commit.clone());
        }
        self.commits.write().push(commit);
        Ok(())
    }
}
