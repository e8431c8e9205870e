//! # Error Types
//!
//! Errors shared across crates.

use thiserror::Error;

/// Errors raised while checking the chain linkage of a block.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum ChainError {
    /// Block height does not follow the parent.
    #[error("Invalid block height: expected {expected}, got {actual}")]
    InvalidHeight { expected: u64, actual: u64 },

    /// Parent hash does not match the last committed block.
    #[error("Unknown parent block at height {height}")]
    UnknownParent { height: u64 },

    /// Header does not commit to the carried transactions.
    #[error("Payload hash mismatch at height {height}")]
    PayloadMismatch { height: u64 },
}
