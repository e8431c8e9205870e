//! Static validator set and round-robin proposer rotation.

use std::sync::atomic::{AtomicU64, Ordering};

use crate::domain::{Round, ValidatorIndex, ValidatorWallet};
use crate::ports::{ProposerSelector, ValidatorSetProvider};

/// Fixed, ordered validator set.
#[derive(Clone, Debug)]
pub struct StaticValidatorSet {
    validators: Vec<ValidatorWallet>,
}

impl StaticValidatorSet {
    pub fn new(validators: Vec<ValidatorWallet>) -> Self {
        Self { validators }
    }

    pub fn len(&self) -> usize {
        self.validators.len()
    }

    pub fn is_empty(&self) -> bool {
        self.validators.is_empty()
    }
}

impl ValidatorSetProvider for StaticValidatorSet {
    fn round_validators(&self) -> Vec<ValidatorWallet> {
        self.validators.clone()
    }

    fn validator(&self, index: ValidatorIndex) -> Option<ValidatorWallet> {
        self.validators.get(index).cloned()
    }
}

/// `(total_round + round) mod validator_count`
///
/// `total_round` sums `committed_round + 1` over every committed height, so
/// the rotation keeps moving across heights and past failed rounds.
#[derive(Debug)]
pub struct RoundRobinProposerSelector {
    validator_count: u64,
    total_round: AtomicU64,
}

impl RoundRobinProposerSelector {
    pub fn new(validator_count: usize) -> Self {
        Self::with_total_round(validator_count, 0)
    }

    pub fn with_total_round(validator_count: usize, total_round: u64) -> Self {
        Self {
            validator_count: validator_count.max(1) as u64,
            total_round: AtomicU64::new(total_round),
        }
    }

    pub fn total_round(&self) -> u64 {
        self.total_round.load(Ordering::Acquire)
    }
}

impl ProposerSelector for RoundRobinProposerSelector {
    fn validator_index(&self, round: Round) -> ValidatorIndex {
        let offset = self.total_round().wrapping_add(u64::from(round));
        (offset % self.validator_count) as ValidatorIndex
    }

    fn on_commit(&self, round: Round) {
        self.total_round
            .fetch_add(u64::from(round) + 1, Ordering::AcqRel);
    }
}
