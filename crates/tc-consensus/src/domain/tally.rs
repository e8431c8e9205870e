//! Vote counters per block hash, with a distinct nil bucket.

use std::collections::HashMap;

use shared_types::Hash;

/// Running vote counts keyed by `Option<Hash>`; `None` is the nil bucket.
#[derive(Clone, Debug, Default)]
pub struct VoteTally {
    counts: HashMap<Option<Hash>, usize>,
    total: usize,
}

impl VoteTally {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn increment(&mut self, block_hash: Option<Hash>) {
        *self.counts.entry(block_hash).or_insert(0) += 1;
        self.total += 1;
    }

    /// Votes for `block_hash` (`None` counts nil votes)
    pub fn count(&self, block_hash: Option<Hash>) -> usize {
        self.counts.get(&block_hash).copied().unwrap_or(0)
    }

    /// Votes of any kind
    pub fn total(&self) -> usize {
        self.total
    }

    /// Number of distinct buckets with at least one vote
    pub fn buckets(&self) -> usize {
        self.counts.len()
    }
}
