//! Round state repository.
//!
//! Indexes [`RoundState`]s by (height, round). Entries are created on first
//! reference, kept for the whole height so late messages still land, and
//! dropped once a height commits.

use std::collections::BTreeMap;
use std::sync::Arc;

use parking_lot::RwLock;
use shared_types::BlockNumber;
use tracing::debug;

use crate::domain::{ConsensusResult, Round, RoundState, RoundStateDependencies};

/// Round state shared between processors and the driver
pub type SharedRoundState = Arc<RwLock<RoundState>>;

pub struct RoundStateRepository {
    deps: RoundStateDependencies,
    states: RwLock<BTreeMap<(BlockNumber, Round), SharedRoundState>>,
}

impl RoundStateRepository {
    pub fn new(deps: RoundStateDependencies) -> Self {
        Self {
            deps,
            states: RwLock::new(BTreeMap::new()),
        }
    }

    /// Round state for (height, round), configured on first reference
    pub fn get_round_state(
        &self,
        height: BlockNumber,
        round: Round,
    ) -> ConsensusResult<SharedRoundState> {
        if let Some(state) = self.get(height, round) {
            return Ok(state);
        }

        let mut states = self.states.write();
        if let Some(state) = states.get(&(height, round)) {
            return Ok(state.clone());
        }
        let state = Arc::new(RwLock::new(RoundState::configure(
            height, round, &self.deps,
        )?));
        states.insert((height, round), state.clone());
        debug!(height, round, "[tc-consensus] Round state created");
        Ok(state)
    }

    /// Existing round state, without creating one
    pub fn get(&self, height: BlockNumber, round: Round) -> Option<SharedRoundState> {
        self.states.read().get(&(height, round)).cloned()
    }

    /// Every tracked round state, ordered by (height, round)
    pub fn round_states(&self) -> Vec<SharedRoundState> {
        self.states.read().values().cloned().collect()
    }

    /// Round states of `height`, ordered by round
    pub fn round_states_at(&self, height: BlockNumber) -> Vec<SharedRoundState> {
        self.states
            .read()
            .range((height, 0)..=(height, Round::MAX))
            .map(|(_, state)| state.clone())
            .collect()
    }

    /// Drop every round state below `height`; returns how many were dropped
    pub fn retire_below(&self, height: BlockNumber) -> usize {
        let mut states = self.states.write();
        let kept = states.split_off(&(height, 0));
        let retired = states.len();
        *states = kept;
        if retired > 0 {
            debug!(height, retired, "[tc-consensus] Round states retired");
        }
        retired
    }

    pub fn len(&self) -> usize {
        self.states.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.states.read().is_empty()
    }

    pub fn clear(&self) {
        self.states.write().clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::TestNetwork;

    #[test]
    fn test_create_on_first_reference() {
        let network = TestNetwork::new(4);
        let repository = RoundStateRepository::new(network.dependencies());

        assert!(repository.get(1, 0).is_none());
        let first = repository.get_round_state(1, 0).unwrap();
        let again = repository.get_round_state(1, 0).unwrap();
        assert!(Arc::ptr_eq(&first, &again));
        assert_eq!(repository.len(), 1);
    }

    #[test]
    fn test_retire_below_keeps_current_height() {
        let network = TestNetwork::new(4);
        let repository = RoundStateRepository::new(network.dependencies());

        for (height, round) in [(1, 0), (1, 1), (2, 0), (2, 3), (3, 0)] {
            repository.get_round_state(height, round).unwrap();
        }
        assert_eq!(repository.round_states_at(2).len(), 2);

        assert_eq!(repository.retire_below(2), 2);
        assert_eq!(repository.len(), 3);
        assert!(repository.get(1, 1).is_none());
        assert!(repository.get(2, 3).is_some());

        let keys: Vec<_> = repository
            .round_states()
            .iter()
            .map(|s| (s.read().height(), s.read().round()))
            .collect();
        assert_eq!(keys, vec![(2, 0), (2, 3), (3, 0)]);

        assert_eq!(repository.retire_below(2), 0);
        repository.clear();
        assert!(repository.is_empty());
    }

    #[test]
    fn test_configuration_error_is_not_cached() {
        let network = TestNetwork::new(4);
        let repository =
            RoundStateRepository::new(network.dependencies_with_milestone_size(7));

        assert!(repository.get_round_state(1, 0).is_err());
        assert!(repository.is_empty());
    }
}
