//! # Devnet Flows
//!
//! Whole networks of validators running in one process through
//! `node_runtime::Devnet`: real BLS keys, real timers, channel routing.
//!
//! ## Flows Tested:
//!
//! 1. **Happy path**: four validators commit consecutive heights with the
//!    same blocks and a chained parent hash.
//! 2. **Silent proposer**: the round-0 proposer never comes online, so the
//!    others time out, move to round 1 and commit there.
//! 3. **Commit proofs**: the aggregated precommit signature of every commit
//!    verifies against the validator set.

#[cfg(test)]
mod tests {
    use std::sync::Arc;
    use std::time::Duration;

    use node_runtime::{validator_wallets, Devnet, DevnetOptions};
    use tc_consensus::domain::Aggregator;
    use tc_consensus::{
        BincodeSerializer, BlsSignatureService, ConsensusConfig, MessageSerializer, MessageType,
        Milestone,
    };

    use crate::integration::init_tracing;

    // =========================================================================
    // TEST FIXTURES
    // =========================================================================

    fn fast_config(validators: usize) -> ConsensusConfig {
        ConsensusConfig::with_milestone(Milestone {
            activation_height: 0,
            round_validators: validators,
            stage_timeout_ms: 300,
            stage_timeout_increase_ms: 150,
        })
    }

    const WAIT: Duration = Duration::from_secs(60);

    // =========================================================================
    // INTEGRATION TESTS
    // =========================================================================

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_four_validators_commit_consecutive_heights() {
        init_tracing();
        let devnet = Devnet::launch(DevnetOptions::new(fast_config(4), 4))
            .await
            .unwrap();
        devnet.wait_for_height(4, WAIT).await.unwrap();

        let reference = devnet.nodes()[0].execution.committed();
        for node in devnet.nodes() {
            let committed = node.execution.committed();
            for height in 0..4 {
                assert_eq!(
                    committed[height].block_hash(),
                    reference[height].block_hash(),
                    "validator {} diverged at height {}",
                    node.index,
                    height + 1
                );
            }
        }

        for (offset, commit) in reference.iter().take(4).enumerate() {
            assert_eq!(commit.block_number(), offset as u64 + 1);
            assert!(commit.commit.proof.aggregate.participants() >= 3);
        }
        for pair in reference[..4].windows(2) {
            assert_eq!(
                pair[1].commit.block.header.parent_hash,
                pair[0].block_hash()
            );
        }

        devnet.shutdown().await.unwrap();
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_silent_proposer_forces_round_change() {
        init_tracing();
        let wallets = validator_wallets(4).unwrap();
        let options = DevnetOptions::new(fast_config(4), 4).with_offline(vec![0]);
        let devnet = Devnet::launch(options).await.unwrap();
        assert_eq!(devnet.nodes().len(), 3);
        assert!(devnet.node(0).is_none());

        devnet.wait_for_height(2, WAIT).await.unwrap();

        for node in devnet.nodes() {
            let first = &node.execution.committed()[0];
            assert!(
                first.round() >= 1,
                "height 1 cannot commit in round 0 without its proposer"
            );
            assert_ne!(first.commit.block.header.generator, wallets[0].address);
            assert!(!first.commit.proof.aggregate.has_signed(0));
        }

        devnet.shutdown().await.unwrap();
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_commit_proofs_verify() {
        init_tracing();
        let wallets = validator_wallets(4).unwrap();
        let devnet = Devnet::launch(DevnetOptions::new(fast_config(4), 4))
            .await
            .unwrap();
        devnet.wait_for_height(2, WAIT).await.unwrap();
        let committed = devnet.nodes()[1].execution.committed();
        devnet.shutdown().await.unwrap();

        let serializer = BincodeSerializer::new();
        let aggregator = Aggregator::new(Arc::new(BlsSignatureService::new()));
        for commit in committed.iter().take(2) {
            let message = serializer
                .vote_signing_bytes(
                    MessageType::Precommit,
                    commit.block_number(),
                    commit.round(),
                    Some(commit.block_hash()),
                )
                .unwrap();
            assert!(
                aggregator
                    .verify(&commit.commit.proof.aggregate, &message, &wallets)
                    .await
            );

            let wrong_round = serializer
                .vote_signing_bytes(
                    MessageType::Precommit,
                    commit.block_number(),
                    commit.round() + 1,
                    Some(commit.block_hash()),
                )
                .unwrap();
            assert!(
                !aggregator
                    .verify(&commit.commit.proof.aggregate, &wrong_round, &wallets)
                    .await
            );
        }
    }
}
