//! # Equivocation Handling
//!
//! Drives a single observer engine through its public message handler with
//! votes signed by devnet validator keys.
//!
//! ## Flows Tested:
//!
//! 1. A second, conflicting vote from one validator is rejected as `Invalid`
//!    and kept as evidence with both messages.
//! 2. Conflicting votes never count twice toward a quorum.

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use node_runtime::{validator_keypair, validator_wallets};
    use shared_types::Hash;
    use tc_consensus::{
        BincodeSerializer, BlsSignatureService, ChannelBroadcaster, ConsensusConfig,
        ConsensusDependencies, ConsensusMessage, ConsensusService, InMemoryExecution,
        MessageHandler, MessageSerializer, MessageType, Precommit, Prevote, ProcessorResult,
        RoundRobinProposerSelector, StaticValidatorSet,
    };

    use crate::integration::init_tracing;

    // =========================================================================
    // TEST FIXTURES
    // =========================================================================

    async fn observer() -> ConsensusService {
        let (broadcaster, _outbound) = ChannelBroadcaster::new();
        let deps = ConsensusDependencies {
            validators: Arc::new(StaticValidatorSet::new(validator_wallets(4).unwrap())),
            proposer_selector: Arc::new(RoundRobinProposerSelector::new(4)),
            signatures: Arc::new(BlsSignatureService::new()),
            serializer: Arc::new(BincodeSerializer::new()),
            broadcaster: Arc::new(broadcaster),
            execution: Arc::new(InMemoryExecution::new()),
            signer: None,
        };
        let (service, _events) = ConsensusService::new(ConsensusConfig::default(), deps).unwrap();
        service.start(1).await.unwrap();
        service
    }

    fn signature_over(index: usize, kind: MessageType, block_hash: Option<Hash>) -> [u8; 96] {
        let message = BincodeSerializer::new()
            .vote_signing_bytes(kind, 1, 0, block_hash)
            .unwrap();
        validator_keypair(index).unwrap().sign(&message).to_bytes()
    }

    fn prevote(index: usize, block_hash: Option<Hash>) -> ConsensusMessage {
        Prevote {
            block_number: 1,
            round: 0,
            block_hash,
            validator_index: index,
            signature: signature_over(index, MessageType::Prevote, block_hash),
        }
        .into()
    }

    fn precommit(index: usize, block_hash: Option<Hash>) -> ConsensusMessage {
        Precommit {
            block_number: 1,
            round: 0,
            block_hash,
            validator_index: index,
            signature: signature_over(index, MessageType::Precommit, block_hash),
        }
        .into()
    }

    // =========================================================================
    // INTEGRATION TESTS
    // =========================================================================

    #[tokio::test]
    async fn test_conflicting_prevote_is_evidence() {
        init_tracing();
        let service = observer().await;
        let handler = service.processors();

        let first = prevote(2, Some([0xAB; 32]));
        let conflicting = prevote(2, None);

        assert_eq!(
            handler.handle_message(first.clone(), false).await.unwrap(),
            ProcessorResult::Accepted
        );
        assert_eq!(
            handler.handle_message(conflicting.clone(), false).await.unwrap(),
            ProcessorResult::Invalid
        );
        assert_eq!(
            handler.handle_message(first.clone(), false).await.unwrap(),
            ProcessorResult::Skipped
        );

        let round_state = service.repository().get(1, 0).unwrap();
        let state = round_state.read();
        let evidence = state.equivocations();
        assert_eq!(evidence.len(), 1);
        assert_eq!(evidence[0].kind, MessageType::Prevote);
        assert_eq!(evidence[0].validator_index, 2);
        assert_eq!(evidence[0].first, first);
        assert_eq!(evidence[0].second, conflicting);
    }

    #[tokio::test]
    async fn test_equivocation_never_reaches_quorum() {
        init_tracing();
        let service = observer().await;
        let handler = service.processors();
        let block_a = Some([0x0A; 32]);
        let block_b = Some([0x0B; 32]);

        // Validators 0 and 1 precommit A, then try to add weight to B
        for index in [0, 1] {
            assert_eq!(
                handler
                    .handle_message(precommit(index, block_a), false)
                    .await
                    .unwrap(),
                ProcessorResult::Accepted
            );
            assert_eq!(
                handler
                    .handle_message(precommit(index, block_b), false)
                    .await
                    .unwrap(),
                ProcessorResult::Invalid
            );
        }
        assert_eq!(
            handler
                .handle_message(precommit(2, block_b), false)
                .await
                .unwrap(),
            ProcessorResult::Accepted
        );

        let round_state = service.repository().get(1, 0).unwrap();
        let state = round_state.read();
        assert_eq!(state.precommit_count(block_a), 2);
        assert_eq!(state.precommit_count(block_b), 1);
        assert!(state.has_majority_precommits_any());
        assert_eq!(state.equivocations().len(), 2);
        assert_eq!(service.current_height(), 1);
    }
}
