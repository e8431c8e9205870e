//! Stage timeout scheduler.
//!
//! One pending timer per stage. Every timer is a tokio task that sleeps and
//! then invokes the matching [`TimeoutHandler`] callback. Each scheduled timer
//! carries a generation token and `clear()` bumps the generation; a task that
//! wakes up after its entry was cleared or replaced returns without firing.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use shared_types::BlockNumber;
use tokio::task::JoinHandle;
use tracing::{debug, trace};

use crate::domain::Round;
use crate::metrics;
use crate::ports::{MilestoneProvider, TimeoutHandler};

/// Consensus stage guarded by a timeout.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum TimeoutStage {
    Propose,
    Prevote,
    Precommit,
}

impl TimeoutStage {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Propose => "propose",
            Self::Prevote => "prevote",
            Self::Precommit => "precommit",
        }
    }
}

struct PendingTimer {
    height: BlockNumber,
    round: Round,
    generation: u64,
    handle: JoinHandle<()>,
}

#[derive(Default)]
struct Timers {
    generation: u64,
    pending: HashMap<TimeoutStage, PendingTimer>,
}

/// Propose / prevote / precommit timeout manager.
pub struct Scheduler {
    handler: Arc<dyn TimeoutHandler>,
    milestones: Arc<dyn MilestoneProvider>,
    timers: Arc<Mutex<Timers>>,
}

impl Scheduler {
    pub fn new(handler: Arc<dyn TimeoutHandler>, milestones: Arc<dyn MilestoneProvider>) -> Self {
        Self {
            handler,
            milestones,
            timers: Arc::new(Mutex::new(Timers::default())),
        }
    }

    pub fn schedule_timeout_propose(&self, height: BlockNumber, round: Round) {
        self.schedule(TimeoutStage::Propose, height, round);
    }

    pub fn schedule_timeout_prevote(&self, height: BlockNumber, round: Round) {
        self.schedule(TimeoutStage::Prevote, height, round);
    }

    pub fn schedule_timeout_precommit(&self, height: BlockNumber, round: Round) {
        self.schedule(TimeoutStage::Precommit, height, round);
    }

    /// `stage_timeout + round * stage_timeout_increase` of the milestone
    /// active at `height`
    pub fn delay(&self, height: BlockNumber, round: Round) -> Duration {
        self.milestones.milestone(height).stage_timeout(round)
    }

    /// (height, round) of the pending timer for `stage`
    pub fn pending(&self, stage: TimeoutStage) -> Option<(BlockNumber, Round)> {
        self.timers
            .lock()
            .pending
            .get(&stage)
            .map(|timer| (timer.height, timer.round))
    }

    /// Number of pending timers
    pub fn active_count(&self) -> usize {
        self.timers.lock().pending.len()
    }

    /// Cancel every pending timer. Safe to call with nothing pending.
    pub fn clear(&self) {
        let mut timers = self.timers.lock();
        timers.generation += 1;
        for (stage, timer) in timers.pending.drain() {
            timer.handle.abort();
            trace!(
                stage = stage.as_str(),
                height = timer.height,
                round = timer.round,
                "[tc-consensus] Timer cancelled"
            );
        }
    }

    fn schedule(&self, stage: TimeoutStage, height: BlockNumber, round: Round) {
        let mut timers = self.timers.lock();

        if let Some(existing) = timers.pending.get(&stage) {
            if existing.height == height && existing.round == round {
                return;
            }
        }
        if let Some(replaced) = timers.pending.remove(&stage) {
            replaced.handle.abort();
        }

        timers.generation += 1;
        let generation = timers.generation;
        let delay = self.delay(height, round);

        let shared = self.timers.clone();
        let handler = self.handler.clone();
        let handle = tokio::spawn(async move {
            tokio::time::sleep(delay).await;

            // Fired under the lock so a concurrent clear() either wins or
            // waits for the callback to return.
            let mut timers = shared.lock();
            match timers.pending.get(&stage) {
                Some(timer) if timer.generation == generation => {
                    timers.pending.remove(&stage);
                }
                _ => return,
            }

            metrics::record_timeout(stage.as_str());
            match stage {
                TimeoutStage::Propose => handler.on_timeout_propose(height, round),
                TimeoutStage::Prevote => handler.on_timeout_prevote(height, round),
                TimeoutStage::Precommit => handler.on_timeout_precommit(height, round),
            }
        });

        timers.pending.insert(
            stage,
            PendingTimer {
                height,
                round,
                generation,
                handle,
            },
        );
        debug!(
            stage = stage.as_str(),
            height,
            round,
            delay_ms = delay.as_millis() as u64,
            "[tc-consensus] Timeout scheduled"
        );
    }
}

impl Drop for Scheduler {
    fn drop(&mut self) {
        self.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::{ConsensusConfig, Milestone};
    use tokio::time::Instant;

    #[derive(Default)]
    struct RecordingHandler {
        fired: Mutex<Vec<(TimeoutStage, BlockNumber, Round, Instant)>>,
    }

    impl RecordingHandler {
        fn record(&self, stage: TimeoutStage, height: BlockNumber, round: Round) {
            self.fired.lock().push((stage, height, round, Instant::now()));
        }

        fn fired(&self) -> Vec<(TimeoutStage, BlockNumber, Round, Instant)> {
            self.fired.lock().clone()
        }
    }

    impl TimeoutHandler for RecordingHandler {
        fn on_timeout_propose(&self, height: BlockNumber, round: Round) {
            self.record(TimeoutStage::Propose, height, round);
        }
        fn on_timeout_prevote(&self, height: BlockNumber, round: Round) {
            self.record(TimeoutStage::Prevote, height, round);
        }
        fn on_timeout_precommit(&self, height: BlockNumber, round: Round) {
            self.record(TimeoutStage::Precommit, height, round);
        }
    }

    fn scheduler() -> (Scheduler, Arc<RecordingHandler>) {
        let handler = Arc::new(RecordingHandler::default());
        let config = ConsensusConfig::with_milestone(Milestone {
            stage_timeout_ms: 1_000,
            stage_timeout_increase_ms: 2_000,
            ..Milestone::default()
        });
        (Scheduler::new(handler.clone(), Arc::new(config)), handler)
    }

    #[tokio::test(start_paused = true)]
    async fn test_delay_grows_with_round() {
        let (scheduler, handler) = scheduler();

        for round in 0..3 {
            let start = Instant::now();
            scheduler.schedule_timeout_propose(1, round);
            tokio::time::sleep(Duration::from_secs(10)).await;

            let fired = handler.fired();
            let (stage, height, fired_round, at) = fired[round as usize];
            assert_eq!((stage, height, fired_round), (TimeoutStage::Propose, 1, round));
            assert_eq!(
                at - start,
                Duration::from_millis(1_000 + 2_000 * u64::from(round))
            );
        }
        assert_eq!(handler.fired().len(), 3);
    }

    #[tokio::test(start_paused = true)]
    async fn test_same_round_is_debounced() {
        let (scheduler, handler) = scheduler();

        scheduler.schedule_timeout_propose(1, 0);
        tokio::time::sleep(Duration::from_millis(500)).await;
        scheduler.schedule_timeout_propose(1, 0);
        tokio::time::sleep(Duration::from_secs(5)).await;

        let fired = handler.fired();
        assert_eq!(fired.len(), 1);
        assert_eq!(scheduler.active_count(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_clear_prevents_firing() {
        let (scheduler, handler) = scheduler();

        scheduler.schedule_timeout_propose(1, 0);
        scheduler.schedule_timeout_prevote(1, 0);
        scheduler.schedule_timeout_precommit(1, 0);
        assert_eq!(scheduler.active_count(), 3);

        scheduler.clear();
        scheduler.clear();
        tokio::time::sleep(Duration::from_secs(10)).await;

        assert!(handler.fired().is_empty());
        assert_eq!(scheduler.pending(TimeoutStage::Propose), None);
    }

    #[tokio::test(start_paused = true)]
    async fn test_clear_retires_generation() {
        let (scheduler, handler) = scheduler();

        scheduler.schedule_timeout_prevote(1, 0);
        let scheduled = scheduler.timers.lock().generation;
        scheduler.clear();
        assert!(scheduler.timers.lock().generation > scheduled);

        // Same (height, round) after clear() is a fresh timer, not a no-op
        tokio::time::sleep(Duration::from_millis(600)).await;
        let start = Instant::now();
        scheduler.schedule_timeout_prevote(1, 0);
        assert_eq!(scheduler.active_count(), 1);
        tokio::time::sleep(Duration::from_secs(10)).await;

        let fired = handler.fired();
        assert_eq!(fired.len(), 1);
        assert_eq!(fired[0].3 - start, Duration::from_millis(1_000));
        assert_eq!(scheduler.active_count(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_new_round_replaces_pending_timer() {
        let (scheduler, handler) = scheduler();

        scheduler.schedule_timeout_prevote(1, 0);
        scheduler.schedule_timeout_prevote(1, 1);
        assert_eq!(scheduler.pending(TimeoutStage::Prevote), Some((1, 1)));

        tokio::time::sleep(Duration::from_secs(10)).await;
        let fired = handler.fired();
        assert_eq!(fired.len(), 1);
        assert_eq!((fired[0].0, fired[0].2), (TimeoutStage::Prevote, 1));
    }

    #[tokio::test(start_paused = true)]
    async fn test_stages_are_independent() {
        let (scheduler, handler) = scheduler();

        scheduler.schedule_timeout_prevote(2, 0);
        scheduler.schedule_timeout_precommit(2, 0);
        tokio::time::sleep(Duration::from_secs(2)).await;

        let stages: Vec<_> = handler.fired().iter().map(|f| f.0).collect();
        assert_eq!(stages.len(), 2);
        assert!(stages.contains(&TimeoutStage::Prevote));
        assert!(stages.contains(&TimeoutStage::Precommit));
    }
}
