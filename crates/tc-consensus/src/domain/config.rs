//! Milestone-driven consensus configuration.

use std::time::Duration;

use serde::{Deserialize, Serialize};
use shared_types::BlockNumber;

use super::{ConsensusError, ConsensusResult, Round};
use crate::ports::MilestoneProvider;

/// Consensus parameters that take effect from `activation_height` onward.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Milestone {
    /// First height this milestone applies to
    pub activation_height: BlockNumber,
    /// Size of the round-validator set
    pub round_validators: usize,
    /// Base timeout of every stage (milliseconds)
    pub stage_timeout_ms: u64,
    /// Extra timeout added per round (milliseconds)
    pub stage_timeout_increase_ms: u64,
}

impl Milestone {
    /// `stage_timeout + round * stage_timeout_increase`
    pub fn stage_timeout(&self, round: Round) -> Duration {
        let increase = self
            .stage_timeout_increase_ms
            .saturating_mul(u64::from(round));
        Duration::from_millis(self.stage_timeout_ms.saturating_add(increase))
    }
}

impl Default for Milestone {
    fn default() -> Self {
        Self {
            activation_height: 0,
            round_validators: 4,
            stage_timeout_ms: 2_000,
            stage_timeout_increase_ms: 2_000,
        }
    }
}

/// Consensus configuration
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConsensusConfig {
    /// Milestones sorted by activation height; the first activates at 0
    pub milestones: Vec<Milestone>,
    /// How many rounds ahead of the current one messages are accepted
    pub max_round_lookahead: Round,
    /// Broadcast messages produced by the local validator
    pub broadcast_own_messages: bool,
}

impl Default for ConsensusConfig {
    fn default() -> Self {
        Self {
            milestones: vec![Milestone::default()],
            max_round_lookahead: 10,
            broadcast_own_messages: true,
        }
    }
}

impl ConsensusConfig {
    /// Single-milestone configuration
    pub fn with_milestone(milestone: Milestone) -> Self {
        Self {
            milestones: vec![milestone],
            ..Self::default()
        }
    }

    /// Milestone with the greatest activation height `<= height`
    pub fn milestone_at(&self, height: BlockNumber) -> &Milestone {
        self.milestones
            .iter()
            .rev()
            .find(|m| m.activation_height <= height)
            .unwrap_or(&self.milestones[0])
    }

    pub fn validate(&self) -> ConsensusResult<()> {
        let Some(first) = self.milestones.first() else {
            return Err(ConsensusError::InvalidConfig("no milestones".into()));
        };
        if first.activation_height != 0 {
            return Err(ConsensusError::InvalidConfig(
                "first milestone must activate at height 0".into(),
            ));
        }
        if self
            .milestones
            .windows(2)
            .any(|w| w[0].activation_height >= w[1].activation_height)
        {
            return Err(ConsensusError::InvalidConfig(
                "milestones must be sorted by activation height".into(),
            ));
        }
        if self.milestones.iter().any(|m| m.round_validators == 0) {
            return Err(ConsensusError::InvalidConfig(
                "round_validators must be positive".into(),
            ));
        }
        Ok(())
    }
}

impl MilestoneProvider for ConsensusConfig {
    fn milestone(&self, height: BlockNumber) -> Milestone {
        self.milestone_at(height).clone()
    }
}
