//! Driver position: height, round, step and the lock / valid values.

use parking_lot::RwLock;
use shared_types::{BlockNumber, Hash};

use crate::domain::{Round, Step};

/// Snapshot of the driver position
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct RoundCursor {
    pub height: BlockNumber,
    pub round: Round,
    pub step: Step,
    /// Round and block the local validator precommitted and is locked on
    pub locked: Option<(Round, Hash)>,
    /// Latest round with a prevote majority for its proposal
    pub valid: Option<(Round, Hash)>,
}

impl RoundCursor {
    pub fn locked_round(&self) -> Option<Round> {
        self.locked.map(|(round, _)| round)
    }

    pub fn valid_round(&self) -> Option<Round> {
        self.valid.map(|(round, _)| round)
    }
}

/// Driver position shared with the processors.
///
/// Only the driver writes; processors read height and round to bound
/// incoming messages.
#[derive(Debug)]
pub struct ConsensusState {
    cursor: RwLock<RoundCursor>,
}

impl ConsensusState {
    pub fn new(height: BlockNumber) -> Self {
        Self {
            cursor: RwLock::new(RoundCursor {
                height,
                round: 0,
                step: Step::Propose,
                locked: None,
                valid: None,
            }),
        }
    }

    pub fn snapshot(&self) -> RoundCursor {
        *self.cursor.read()
    }

    pub fn height(&self) -> BlockNumber {
        self.cursor.read().height
    }

    pub fn round(&self) -> Round {
        self.cursor.read().round
    }

    pub fn step(&self) -> Step {
        self.cursor.read().step
    }

    /// Move to round 0 of `height`, dropping lock and valid values
    pub(crate) fn enter_height(&self, height: BlockNumber) {
        *self.cursor.write() = RoundCursor {
            height,
            round: 0,
            step: Step::Propose,
            locked: None,
            valid: None,
        };
    }

    pub(crate) fn enter_round(&self, round: Round) {
        let mut cursor = self.cursor.write();
        cursor.round = round;
        cursor.step = Step::Propose;
    }

    pub(crate) fn set_step(&self, step: Step) {
        self.cursor.write().step = step;
    }

    pub(crate) fn lock(&self, round: Round, block_hash: Hash) {
        self.cursor.write().locked = Some((round, block_hash));
    }

    pub(crate) fn set_valid(&self, round: Round, block_hash: Hash) {
        self.cursor.write().valid = Some((round, block_hash));
    }
}
