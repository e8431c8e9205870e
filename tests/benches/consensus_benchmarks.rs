//! # Tidal-Chain Consensus Benchmarks
//!
//! | Operation | Validators |
//! |-----------|------------|
//! | Aggregate precommit signatures | 4, 53, 101 |
//! | Verify an aggregated commit proof | 4, 53, 101 |

use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;

use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion, Throughput};
use node_runtime::{validator_keypair, validator_wallets};
use tc_consensus::domain::Aggregator;
use tc_consensus::{BincodeSerializer, BlsSignatureService, MessageSerializer, MessageType};

const SIZES: [usize; 3] = [4, 53, 101];

fn precommit_signatures(validators: usize, message: &[u8]) -> BTreeMap<usize, [u8; 96]> {
    // A bare majority signs
    (0..validators * 2 / 3 + 1)
        .map(|index| {
            let key = validator_keypair(index).expect("validator key");
            (index, key.sign(message).to_bytes())
        })
        .collect()
}

fn bench_aggregation(c: &mut Criterion) {
    let mut group = c.benchmark_group("tc-consensus-aggregation");
    group.measurement_time(Duration::from_secs(10));

    let aggregator = Aggregator::new(Arc::new(BlsSignatureService::new()));
    let message = BincodeSerializer::new()
        .vote_signing_bytes(MessageType::Precommit, 1, 0, Some([7u8; 32]))
        .expect("signing bytes");

    for validators in SIZES {
        let signatures = precommit_signatures(validators, &message);
        group.throughput(Throughput::Elements(signatures.len() as u64));
        group.bench_with_input(
            BenchmarkId::new("aggregate", validators),
            &signatures,
            |b, signatures| {
                b.iter(|| aggregator.aggregate(black_box(signatures), validators))
            },
        );
    }
    group.finish();
}

fn bench_proof_verification(c: &mut Criterion) {
    let mut group = c.benchmark_group("tc-consensus-verification");
    group.measurement_time(Duration::from_secs(10));

    let runtime = tokio::runtime::Runtime::new().expect("tokio runtime");
    let aggregator = Aggregator::new(Arc::new(BlsSignatureService::new()));
    let message = BincodeSerializer::new()
        .vote_signing_bytes(MessageType::Precommit, 1, 0, Some([7u8; 32]))
        .expect("signing bytes");

    for validators in SIZES {
        let wallets = validator_wallets(validators).expect("validator wallets");
        let proof = aggregator
            .aggregate(&precommit_signatures(validators, &message), validators)
            .expect("aggregate");

        group.bench_with_input(
            BenchmarkId::new("verify_commit_proof", validators),
            &proof,
            |b, proof| {
                b.iter(|| {
                    runtime.block_on(aggregator.verify(black_box(proof), &message, &wallets))
                })
            },
        );
    }
    group.finish();
}

criterion_group!(benches, bench_aggregation, bench_proof_verification);
criterion_main!(benches);
