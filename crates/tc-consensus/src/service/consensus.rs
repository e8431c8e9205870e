//! Consensus driver.
//!
//! Tendermint-style state machine over the round states. The driver owns
//! the height / round / step cursor and is the only writer of it; it reacts
//! to [`ConsensusEvent`]s posted by processors and the scheduler, one at a
//! time.

use std::sync::Arc;

use shared_crypto::SIGNATURE_LENGTH;
use shared_types::{short_hash, Block, BlockNumber, Hash};
use tokio::sync::watch;
use tracing::{debug, error, info, warn};

use super::processors::{ProcessorContext, Processors};
use super::{
    CommitLock, ConsensusState, RoundCursor, RoundStateRepository, Scheduler, SharedRoundState,
};
use crate::domain::{
    Aggregator, ConsensusConfig, ConsensusError, ConsensusResult, MessageType, Precommit,
    Prevote, ProcessorResult, Proposal, Round, RoundStateDependencies, Step, ValidatorIndex,
};
use crate::events::{event_channel, notify, ConsensusEvent, EventReceiver, EventSender,
    EventTimeoutHandler};
use crate::metrics;
use crate::ports::{
    Broadcaster, ExecutionGateway, MessageSerializer, MilestoneProvider, ProposerSelector,
    SignatureService, Signer, ValidatorSetProvider,
};

/// Collaborators the driver is assembled from.
pub struct ConsensusDependencies {
    pub validators: Arc<dyn ValidatorSetProvider>,
    pub proposer_selector: Arc<dyn ProposerSelector>,
    pub signatures: Arc<dyn SignatureService>,
    pub serializer: Arc<dyn MessageSerializer>,
    pub broadcaster: Arc<dyn Broadcaster>,
    pub execution: Arc<dyn ExecutionGateway>,
    /// Local validator key; `None` runs the node as an observer
    pub signer: Option<Arc<dyn Signer>>,
}

/// The consensus round engine.
pub struct ConsensusService {
    config: ConsensusConfig,
    state: Arc<ConsensusState>,
    repository: Arc<RoundStateRepository>,
    scheduler: Scheduler,
    processors: Arc<Processors>,
    commit_lock: Arc<CommitLock>,
    proposer_selector: Arc<dyn ProposerSelector>,
    serializer: Arc<dyn MessageSerializer>,
    execution: Arc<dyn ExecutionGateway>,
    signer: Option<Arc<dyn Signer>>,
    events: EventSender,
}

impl ConsensusService {
    /// Assemble the engine. The returned receiver feeds [`Self::run`].
    pub fn new(
        config: ConsensusConfig,
        deps: ConsensusDependencies,
    ) -> ConsensusResult<(Self, EventReceiver)> {
        config.validate()?;

        let milestones: Arc<dyn MilestoneProvider> = Arc::new(config.clone());
        let aggregator = Arc::new(Aggregator::new(deps.signatures.clone()));
        let repository = Arc::new(RoundStateRepository::new(RoundStateDependencies {
            validators: deps.validators.clone(),
            proposer_selector: deps.proposer_selector.clone(),
            milestones: milestones.clone(),
            aggregator: aggregator.clone(),
            serializer: deps.serializer.clone(),
        }));

        let (events, receiver) = event_channel();
        let scheduler = Scheduler::new(
            Arc::new(EventTimeoutHandler::new(events.clone())),
            milestones,
        );
        let state = Arc::new(ConsensusState::new(0));
        let commit_lock = Arc::new(CommitLock::new());

        let processors = Arc::new(Processors::new(Arc::new(ProcessorContext {
            state: state.clone(),
            repository: repository.clone(),
            signatures: deps.signatures,
            serializer: deps.serializer.clone(),
            aggregator,
            broadcaster: deps.broadcaster,
            commit_lock: commit_lock.clone(),
            events: events.clone(),
            max_round_lookahead: config.max_round_lookahead,
        })));

        let service = Self {
            config,
            state,
            repository,
            scheduler,
            processors,
            commit_lock,
            proposer_selector: deps.proposer_selector,
            serializer: deps.serializer,
            execution: deps.execution,
            signer: deps.signer,
            events,
        };
        Ok((service, receiver))
    }

    /// Message processors for the network-ingress layer
    pub fn processors(&self) -> Arc<Processors> {
        self.processors.clone()
    }

    pub fn repository(&self) -> &Arc<RoundStateRepository> {
        &self.repository
    }

    pub fn scheduler(&self) -> &Scheduler {
        &self.scheduler
    }

    pub fn config(&self) -> &ConsensusConfig {
        &self.config
    }

    pub fn cursor(&self) -> RoundCursor {
        self.state.snapshot()
    }

    pub fn current_height(&self) -> BlockNumber {
        self.state.height()
    }

    pub fn current_round(&self) -> Round {
        self.state.round()
    }

    pub fn step(&self) -> Step {
        self.state.step()
    }

    // =========================================================================
    // Lifecycle
    // =========================================================================

    /// Enter round 0 of `height` with lock and valid values cleared
    pub async fn start(&self, height: BlockNumber) -> ConsensusResult<()> {
        self.state.enter_height(height);
        info!(height, "[tc-consensus] Starting height");
        self.start_round(0).await
    }

    /// Process events until shutdown.
    ///
    /// Returns the error that halted consensus when an invariant breaks.
    /// Other failures are logged and the loop continues.
    pub async fn run(
        &self,
        mut events: EventReceiver,
        mut shutdown: watch::Receiver<bool>,
    ) -> ConsensusResult<()> {
        loop {
            tokio::select! {
                changed = shutdown.changed() => {
                    if changed.is_err() || *shutdown.borrow() {
                        info!("[tc-consensus] Shutdown requested");
                        self.scheduler.clear();
                        return Ok(());
                    }
                }
                event = events.recv() => {
                    let Some(event) = event else {
                        self.scheduler.clear();
                        return Err(ConsensusError::Stopped);
                    };
                    if let Err(e) = self.on_event(event).await {
                        if e.is_invariant_violation() {
                            error!(
                                height = self.state.height(),
                                round = self.state.round(),
                                "[tc-consensus] Invariant violated, halting consensus: {}",
                                e
                            );
                            self.scheduler.clear();
                            return Err(e);
                        }
                        warn!(?event, "[tc-consensus] Event processing failed: {}", e);
                    }
                }
            }
        }
    }

    /// Dispatch one event
    pub async fn on_event(&self, event: ConsensusEvent) -> ConsensusResult<()> {
        match event {
            ConsensusEvent::RoundStateChanged { height, round } => self.handle(height, round).await,
            ConsensusEvent::TimeoutPropose { height, round } => {
                self.on_timeout_propose(height, round).await
            }
            ConsensusEvent::TimeoutPrevote { height, round } => {
                self.on_timeout_prevote(height, round).await
            }
            ConsensusEvent::TimeoutPrecommit { height, round } => {
                self.on_timeout_precommit(height, round).await
            }
        }
    }

    /// Re-evaluate every rule against the round state at (height, round)
    pub async fn handle(&self, height: BlockNumber, round: Round) -> ConsensusResult<()> {
        if height != self.state.height() {
            return Ok(());
        }
        let Some(round_state) = self.repository.get(height, round) else {
            return Ok(());
        };

        self.on_proposal(&round_state).await?;
        self.on_proposal_locked(&round_state).await?;
        self.on_majority_prevote_any(&round_state);
        self.on_majority_prevote(&round_state).await?;
        self.on_majority_prevote_null(&round_state).await?;
        self.on_majority_precommit_any(&round_state);
        if self.on_majority_precommit(&round_state).await? {
            return Ok(());
        }
        self.on_minority_with_higher_round(&round_state).await
    }

    // =========================================================================
    // Rules
    // =========================================================================

    /// Fresh proposal in the current round while proposing
    async fn on_proposal(&self, round_state: &SharedRoundState) -> ConsensusResult<()> {
        let cursor = self.state.snapshot();
        let Some((round, proposal)) = current_proposal(round_state) else {
            return Ok(());
        };
        if round != cursor.round || cursor.step != Step::Propose || proposal.valid_round.is_some()
        {
            return Ok(());
        }

        let valid = self
            .ensure_processor_result(round_state, &proposal.block)
            .await?;
        let hash = proposal.block_hash();
        let unlocked = cursor.locked.map_or(true, |(_, locked)| locked == hash);
        let vote = (valid && unlocked).then_some(hash);
        self.prevote(cursor.height, cursor.round, vote).await
    }

    /// Re-proposal of a block that had a prevote majority at `valid_round`
    async fn on_proposal_locked(&self, round_state: &SharedRoundState) -> ConsensusResult<()> {
        let cursor = self.state.snapshot();
        let Some((round, proposal)) = current_proposal(round_state) else {
            return Ok(());
        };
        let Some(valid_round) = proposal.valid_round else {
            return Ok(());
        };
        if round != cursor.round || cursor.step != Step::Propose || valid_round >= round {
            return Ok(());
        }

        let hash = proposal.block_hash();
        let justified = proposal.lock_proof.is_some()
            || self
                .repository
                .get(cursor.height, valid_round)
                .is_some_and(|state| state.read().has_majority_prevotes_for(&hash));
        if !justified {
            return Ok(());
        }

        let valid = self
            .ensure_processor_result(round_state, &proposal.block)
            .await?;
        let lock_allows = cursor
            .locked
            .map_or(true, |(locked_round, locked)| {
                locked_round <= valid_round || locked == hash
            });
        let vote = (valid && lock_allows).then_some(hash);
        self.prevote(cursor.height, cursor.round, vote).await
    }

    fn on_majority_prevote_any(&self, round_state: &SharedRoundState) {
        let cursor = self.state.snapshot();
        let state = round_state.read();
        if state.round() == cursor.round
            && cursor.step == Step::Prevote
            && state.has_majority_prevotes_any()
        {
            self.scheduler
                .schedule_timeout_prevote(cursor.height, cursor.round);
        }
    }

    /// Prevote majority for the proposal: lock, precommit, remember as valid
    async fn on_majority_prevote(&self, round_state: &SharedRoundState) -> ConsensusResult<()> {
        let cursor = self.state.snapshot();
        let (round, proposal, majority) = {
            let state = round_state.read();
            (
                state.round(),
                state.proposal().cloned(),
                state.has_majority_prevotes(),
            )
        };
        let Some(proposal) = proposal else {
            return Ok(());
        };
        if round != cursor.round
            || cursor.step < Step::Prevote
            || !majority
            || cursor.valid_round() == Some(round)
        {
            return Ok(());
        }
        if !self
            .ensure_processor_result(round_state, &proposal.block)
            .await?
        {
            return Ok(());
        }

        let hash = proposal.block_hash();
        if cursor.step == Step::Prevote {
            self.state.lock(round, hash);
            info!(
                height = cursor.height,
                round,
                block_hash = %short_hash(&hash),
                "[tc-consensus] Locked on block"
            );
            self.precommit(cursor.height, round, Some(hash)).await?;
        }
        self.state.set_valid(round, hash);
        Ok(())
    }

    async fn on_majority_prevote_null(&self, round_state: &SharedRoundState) -> ConsensusResult<()> {
        let cursor = self.state.snapshot();
        let ready = {
            let state = round_state.read();
            state.round() == cursor.round
                && cursor.step == Step::Prevote
                && state.has_majority_prevotes_null()
        };
        if ready {
            self.precommit(cursor.height, cursor.round, None).await?;
        }
        Ok(())
    }

    fn on_majority_precommit_any(&self, round_state: &SharedRoundState) {
        let cursor = self.state.snapshot();
        let state = round_state.read();
        if state.round() == cursor.round && state.has_majority_precommits_any() {
            self.scheduler
                .schedule_timeout_precommit(cursor.height, cursor.round);
        }
    }

    /// Precommit majority for the proposal in any round: commit the height.
    /// Returns whether the height was committed.
    async fn on_majority_precommit(&self, round_state: &SharedRoundState) -> ConsensusResult<bool> {
        let (proposal, majority) = {
            let state = round_state.read();
            (state.proposal().cloned(), state.has_majority_precommits())
        };
        let Some(proposal) = proposal else {
            return Ok(false);
        };
        if !majority {
            return Ok(false);
        }
        if !self
            .ensure_processor_result(round_state, &proposal.block)
            .await?
        {
            warn!(
                height = proposal.block_number,
                round = proposal.round,
                "[tc-consensus] Precommit majority for a block that failed execution"
            );
            return Ok(false);
        }

        self.commit(round_state).await?;
        Ok(true)
    }

    /// A third of the validators already moved to a later round
    async fn on_minority_with_higher_round(
        &self,
        round_state: &SharedRoundState,
    ) -> ConsensusResult<()> {
        let (round, minority) = {
            let state = round_state.read();
            (state.round(), state.has_minority_prevotes_or_precommits())
        };
        if round > self.state.round() && minority {
            info!(
                height = self.state.height(),
                round,
                "[tc-consensus] Minority seen in higher round, skipping ahead"
            );
            self.start_round(round).await?;
        }
        Ok(())
    }

    // =========================================================================
    // Timeouts
    // =========================================================================

    async fn on_timeout_propose(&self, height: BlockNumber, round: Round) -> ConsensusResult<()> {
        let cursor = self.state.snapshot();
        if (height, round, Step::Propose) != (cursor.height, cursor.round, cursor.step) {
            return Ok(());
        }
        info!(height, round, "[tc-consensus] Propose timeout");
        self.prevote(height, round, None).await
    }

    async fn on_timeout_prevote(&self, height: BlockNumber, round: Round) -> ConsensusResult<()> {
        let cursor = self.state.snapshot();
        if (height, round, Step::Prevote) != (cursor.height, cursor.round, cursor.step) {
            return Ok(());
        }
        info!(height, round, "[tc-consensus] Prevote timeout");
        self.precommit(height, round, None).await
    }

    async fn on_timeout_precommit(
        &self,
        height: BlockNumber,
        round: Round,
    ) -> ConsensusResult<()> {
        let cursor = self.state.snapshot();
        if (height, round) != (cursor.height, cursor.round) {
            return Ok(());
        }
        info!(height, round, "[tc-consensus] Precommit timeout");
        self.start_round(round + 1).await
    }

    // =========================================================================
    // Transitions
    // =========================================================================

    async fn start_round(&self, round: Round) -> ConsensusResult<()> {
        let height = self.state.height();
        self.scheduler.clear();
        self.state.enter_round(round);
        metrics::record_round_started();

        // Round states inside the lookahead window exist before any message
        // for them can be admitted.
        let last = round.saturating_add(self.config.max_round_lookahead);
        for window_round in round..=last {
            self.repository.get_round_state(height, window_round)?;
        }
        let round_state = self.repository.get_round_state(height, round)?;

        let (proposer_index, local_index) = {
            let state = round_state.read();
            let local = self
                .signer
                .as_ref()
                .and_then(|signer| state.validator_index_of(&signer.public_key()));
            (state.proposer_index(), local)
        };
        info!(
            height,
            round,
            proposer = proposer_index,
            "[tc-consensus] Starting round"
        );

        if local_index == Some(proposer_index) {
            if let Err(e) = self.propose(&round_state, proposer_index).await {
                if e.is_invariant_violation() {
                    return Err(e);
                }
                warn!(height, round, "[tc-consensus] Failed to propose: {}", e);
                self.scheduler.schedule_timeout_propose(height, round);
            }
        } else {
            self.scheduler.schedule_timeout_propose(height, round);
        }

        notify(
            &self.events,
            ConsensusEvent::RoundStateChanged { height, round },
        );
        Ok(())
    }

    async fn propose(
        &self,
        round_state: &SharedRoundState,
        proposer_index: ValidatorIndex,
    ) -> ConsensusResult<()> {
        let Some(signer) = &self.signer else {
            return Ok(());
        };
        let cursor = self.state.snapshot();
        let (height, round) = (cursor.height, cursor.round);

        let reproposal = cursor.valid_round().and_then(|valid_round| {
            let state = self.repository.get(height, valid_round)?;
            let state = state.read();
            let block = state.proposal()?.block.clone();
            Some((valid_round, block, state.proposal_lock_proof()))
        });

        let (valid_round, block, lock_proof) = match reproposal {
            Some((valid_round, block, lock_proof)) => (Some(valid_round), block, lock_proof),
            None => {
                let generator = round_state.read().validators()[proposer_index].address;
                let block = self
                    .execution
                    .build_block(height, round, generator)
                    .await
                    .map_err(ConsensusError::Execution)?;
                (None, block, None)
            }
        };

        let mut proposal = Proposal {
            block_number: height,
            round,
            valid_round,
            block,
            lock_proof,
            validator_index: proposer_index,
            signature: [0u8; SIGNATURE_LENGTH],
        };
        let message = self.serializer.proposal_signing_bytes(&proposal)?;
        proposal.signature = signer.sign(&message);

        info!(
            height,
            round,
            valid_round = ?valid_round,
            block_hash = %short_hash(&proposal.block_hash()),
            "[tc-consensus] Proposing block"
        );
        let result = self
            .processors
            .proposal
            .process(proposal, self.config.broadcast_own_messages)
            .await?;
        log_own_result(MessageType::Proposal, result);
        Ok(())
    }

    async fn prevote(
        &self,
        height: BlockNumber,
        round: Round,
        block_hash: Option<Hash>,
    ) -> ConsensusResult<()> {
        self.state.set_step(Step::Prevote);
        debug!(
            height,
            round,
            nil = block_hash.is_none(),
            "[tc-consensus] Prevoting"
        );

        let Some((signer, validator_index)) = self.local_signer(height, round) else {
            return Ok(());
        };
        let message =
            self.serializer
                .vote_signing_bytes(MessageType::Prevote, height, round, block_hash)?;
        let prevote = Prevote {
            block_number: height,
            round,
            block_hash,
            validator_index,
            signature: signer.sign(&message),
        };
        let result = self
            .processors
            .prevote
            .process(prevote, self.config.broadcast_own_messages)
            .await?;
        log_own_result(MessageType::Prevote, result);
        Ok(())
    }

    async fn precommit(
        &self,
        height: BlockNumber,
        round: Round,
        block_hash: Option<Hash>,
    ) -> ConsensusResult<()> {
        self.state.set_step(Step::Precommit);
        debug!(
            height,
            round,
            nil = block_hash.is_none(),
            "[tc-consensus] Precommitting"
        );

        let Some((signer, validator_index)) = self.local_signer(height, round) else {
            return Ok(());
        };
        let message =
            self.serializer
                .vote_signing_bytes(MessageType::Precommit, height, round, block_hash)?;
        let precommit = Precommit {
            block_number: height,
            round,
            block_hash,
            validator_index,
            signature: signer.sign(&message),
        };
        let result = self
            .processors
            .precommit
            .process(precommit, self.config.broadcast_own_messages)
            .await?;
        log_own_result(MessageType::Precommit, result);
        Ok(())
    }

    /// Build the commit under the exclusive lock, hand it to execution and
    /// move to the next height.
    async fn commit(&self, round_state: &SharedRoundState) -> ConsensusResult<()> {
        let height = self.state.height();
        let round = round_state.read().round();

        let committed = self
            .commit_lock
            .run_exclusive(async {
                let commit = {
                    let mut state = round_state.write();
                    state.get_commit()?.clone()
                };
                self.execution
                    .commit(commit.clone())
                    .await
                    .map_err(ConsensusError::Execution)?;

                self.repository.retire_below(height + 1);
                self.proposer_selector.on_commit(round);
                self.scheduler.clear();
                Ok::<_, ConsensusError>(commit)
            })
            .await?;

        metrics::record_commit(round);
        info!(
            height,
            round,
            block_hash = %short_hash(&committed.block_hash()),
            signers = committed.commit.proof.aggregate.participants(),
            "[tc-consensus] Height committed"
        );
        self.start(height + 1).await
    }

    // =========================================================================
    // Helpers
    // =========================================================================

    /// Run the proposed block through execution once per round state
    async fn ensure_processor_result(
        &self,
        round_state: &SharedRoundState,
        block: &Block,
    ) -> ConsensusResult<bool> {
        let cached = round_state.read().processor_result();
        if let Some(valid) = cached {
            return Ok(valid);
        }

        let valid = self.execution.process_block(block).await;
        self.commit_lock
            .run_non_exclusive(async {
                round_state.write().set_processor_result(valid);
            })
            .await;
        debug!(
            height = block.number(),
            valid,
            "[tc-consensus] Block processed"
        );
        Ok(valid)
    }

    /// Local signer and its index in the (height, round) validator set
    fn local_signer(
        &self,
        height: BlockNumber,
        round: Round,
    ) -> Option<(Arc<dyn Signer>, ValidatorIndex)> {
        let signer = self.signer.clone()?;
        let round_state = self.repository.get(height, round)?;
        let index = round_state
            .read()
            .validator_index_of(&signer.public_key())?;
        Some((signer, index))
    }
}

fn current_proposal(round_state: &SharedRoundState) -> Option<(Round, Proposal)> {
    let state = round_state.read();
    state.proposal().map(|proposal| (state.round(), proposal.clone()))
}

fn log_own_result(kind: MessageType, result: ProcessorResult) {
    if result != ProcessorResult::Accepted {
        debug!(
            kind = kind.as_str(),
            result = result.as_str(),
            "[tc-consensus] Own message not accepted"
        );
    }
}
