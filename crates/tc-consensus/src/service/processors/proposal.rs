//! Proposal admission.

use std::sync::Arc;

use shared_types::short_hash;
use tracing::{debug, warn};

use super::ProcessorContext;
use crate::domain::{
    is_majority, ConsensusResult, MessageType, ProcessorResult, Proposal, ValidatorWallet,
};
use crate::metrics;

/// Validates and admits [`Proposal`]s.
pub struct ProposalProcessor {
    ctx: Arc<ProcessorContext>,
}

impl ProposalProcessor {
    pub fn new(ctx: Arc<ProcessorContext>) -> Self {
        Self { ctx }
    }

    /// Checks, in order: height, round window, proposer index, signature,
    /// block shape, lock proof, first-write-wins. Proposals for earlier
    /// rounds of the current height are admitted like current ones.
    pub async fn process(
        &self,
        proposal: Proposal,
        broadcast: bool,
    ) -> ConsensusResult<ProcessorResult> {
        let result = self
            .ctx
            .commit_lock
            .run_non_exclusive(self.admit(proposal, broadcast))
            .await;
        if let Ok(outcome) = &result {
            metrics::record_message(MessageType::Proposal.as_str(), outcome.as_str());
        }
        result
    }

    async fn admit(&self, proposal: Proposal, broadcast: bool) -> ConsensusResult<ProcessorResult> {
        let ctx = &self.ctx;
        let (height, round) = (proposal.block_number, proposal.round);
        // Earlier rounds of the current height stay open: a late proposal
        // is what lets a precommit majority at that round commit.
        if height != ctx.state.height() {
            debug!(height, round, "[tc-consensus] Proposal for other height skipped");
            return Ok(ProcessorResult::Skipped);
        }
        if ctx.exceeds_lookahead(round) {
            warn!(height, round, "[tc-consensus] Proposal round out of bounds");
            return Ok(ProcessorResult::Invalid);
        }
        let Some(round_state) = ctx.repository.get(height, round) else {
            debug!(height, round, "[tc-consensus] No round state for proposal");
            return Ok(ProcessorResult::Skipped);
        };

        let (proposer_index, proposer_key, validators) = {
            let state = round_state.read();
            (
                state.proposer_index(),
                state.proposer().bls_public_key,
                state.validators().to_vec(),
            )
        };

        if proposal.validator_index != proposer_index {
            warn!(
                height,
                round,
                validator_index = proposal.validator_index,
                expected = proposer_index,
                "[tc-consensus] Proposal from wrong proposer"
            );
            return Ok(ProcessorResult::Invalid);
        }

        let message = ctx.serializer.proposal_signing_bytes(&proposal)?;
        if !ctx
            .signatures
            .verify(&message, &proposal.signature, &proposer_key)
            .await
        {
            warn!(height, round, "[tc-consensus] Invalid proposal signature");
            return Ok(ProcessorResult::Invalid);
        }

        if proposal.block.number() != height || !proposal.block.is_payload_consistent() {
            warn!(height, round, "[tc-consensus] Malformed proposal block");
            return Ok(ProcessorResult::Invalid);
        }

        if !self.has_valid_lock_proof(&proposal, &validators).await? {
            warn!(
                height,
                round,
                valid_round = ?proposal.valid_round,
                "[tc-consensus] Invalid proposal lock proof"
            );
            return Ok(ProcessorResult::Invalid);
        }

        {
            let mut state = round_state.write();
            if state.has_proposal() {
                return Ok(ProcessorResult::Skipped);
            }
            state.add_proposal(proposal.clone())?;
        }

        debug!(
            height,
            round,
            block_hash = %short_hash(&proposal.block_hash()),
            "[tc-consensus] Proposal accepted"
        );
        if broadcast {
            ctx.broadcaster.broadcast_proposal(&proposal);
        }
        ctx.round_state_changed(height, round);
        Ok(ProcessorResult::Accepted)
    }

    /// Re-proposals must point at an earlier round, and a lock proof that is
    /// present must be a verified prevote majority for the block at that
    /// round. A missing proof is accepted.
    async fn has_valid_lock_proof(
        &self,
        proposal: &Proposal,
        validators: &[ValidatorWallet],
    ) -> ConsensusResult<bool> {
        let Some(valid_round) = proposal.valid_round else {
            return Ok(true);
        };
        if valid_round >= proposal.round {
            return Ok(false);
        }
        let Some(lock_proof) = &proposal.lock_proof else {
            debug!(
                height = proposal.block_number,
                round = proposal.round,
                valid_round,
                "[tc-consensus] Re-proposal without lock proof"
            );
            return Ok(true);
        };

        if !is_majority(lock_proof.participants(), validators.len()) {
            return Ok(false);
        }
        let message = self.ctx.serializer.vote_signing_bytes(
            MessageType::Prevote,
            proposal.block_number,
            valid_round,
            Some(proposal.block_hash()),
        )?;
        Ok(self
            .ctx
            .aggregator
            .verify(lock_proof, &message, validators)
            .await)
    }
}
