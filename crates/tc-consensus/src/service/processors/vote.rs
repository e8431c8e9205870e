//! Prevote and precommit admission.

use std::marker::PhantomData;
use std::sync::Arc;

use tracing::{debug, warn};

use super::ProcessorContext;
use crate::domain::{
    ConsensusResult, Precommit, Prevote, ProcessorResult, RoundState, Vote, VoteAdmission,
};
use crate::metrics;
use crate::ports::Broadcaster;

/// Per-type hooks for [`VoteProcessor`].
pub trait VoteKind: Vote {
    fn admit(state: &mut RoundState, vote: Self) -> ConsensusResult<VoteAdmission>;

    fn broadcast(broadcaster: &dyn Broadcaster, vote: &Self);
}

impl VoteKind for Prevote {
    fn admit(state: &mut RoundState, vote: Self) -> ConsensusResult<VoteAdmission> {
        state.add_prevote(vote)
    }

    fn broadcast(broadcaster: &dyn Broadcaster, vote: &Self) {
        broadcaster.broadcast_prevote(vote);
    }
}

impl VoteKind for Precommit {
    fn admit(state: &mut RoundState, vote: Self) -> ConsensusResult<VoteAdmission> {
        state.add_precommit(vote)
    }

    fn broadcast(broadcaster: &dyn Broadcaster, vote: &Self) {
        broadcaster.broadcast_precommit(vote);
    }
}

/// Validates and admits votes of type `V`.
pub struct VoteProcessor<V> {
    ctx: Arc<ProcessorContext>,
    _kind: PhantomData<fn() -> V>,
}

pub type PrevoteProcessor = VoteProcessor<Prevote>;
pub type PrecommitProcessor = VoteProcessor<Precommit>;

impl<V: VoteKind> VoteProcessor<V> {
    pub fn new(ctx: Arc<ProcessorContext>) -> Self {
        Self {
            ctx,
            _kind: PhantomData,
        }
    }

    /// Votes for earlier rounds of the current height are still admitted.
    pub async fn process(&self, vote: V, broadcast: bool) -> ConsensusResult<ProcessorResult> {
        let result = self
            .ctx
            .commit_lock
            .run_non_exclusive(self.admit(vote, broadcast))
            .await;
        if let Ok(outcome) = &result {
            metrics::record_message(V::KIND.as_str(), outcome.as_str());
        }
        result
    }

    async fn admit(&self, vote: V, broadcast: bool) -> ConsensusResult<ProcessorResult> {
        let ctx = &self.ctx;
        let (height, round, index) = (vote.block_number(), vote.round(), vote.validator_index());
        let kind = V::KIND.as_str();

        if height != ctx.state.height() {
            debug!(height, round, kind, "[tc-consensus] Vote for other height skipped");
            return Ok(ProcessorResult::Skipped);
        }
        if ctx.exceeds_lookahead(round) {
            warn!(height, round, kind, "[tc-consensus] Vote round out of bounds");
            return Ok(ProcessorResult::Invalid);
        }
        let Some(round_state) = ctx.repository.get(height, round) else {
            debug!(height, round, kind, "[tc-consensus] No round state for vote");
            return Ok(ProcessorResult::Skipped);
        };

        let public_key = {
            let state = round_state.read();
            state.validator(index).map(|validator| validator.bls_public_key)
        };
        let Some(public_key) = public_key else {
            warn!(
                height,
                round,
                kind,
                validator_index = index,
                "[tc-consensus] Vote from unknown validator index"
            );
            return Ok(ProcessorResult::Invalid);
        };

        let message = ctx
            .serializer
            .vote_signing_bytes(V::KIND, height, round, vote.block_hash())?;
        if !ctx
            .signatures
            .verify(&message, vote.signature(), &public_key)
            .await
        {
            warn!(
                height,
                round,
                kind,
                validator_index = index,
                "[tc-consensus] Invalid vote signature"
            );
            return Ok(ProcessorResult::Invalid);
        }

        let admission = {
            let mut state = round_state.write();
            V::admit(&mut state, vote.clone())?
        };

        match admission {
            VoteAdmission::Added => {
                if broadcast {
                    V::broadcast(ctx.broadcaster.as_ref(), &vote);
                }
                ctx.round_state_changed(height, round);
                Ok(ProcessorResult::Accepted)
            }
            VoteAdmission::Duplicate => Ok(ProcessorResult::Skipped),
            VoteAdmission::Equivocation => {
                warn!(
                    height,
                    round,
                    kind,
                    validator_index = index,
                    "[tc-consensus] Equivocation detected"
                );
                metrics::record_equivocation(kind);
                Ok(ProcessorResult::Invalid)
            }
        }
    }
}
