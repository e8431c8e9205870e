//! BLS signature aggregation over validator bitmaps.

use std::collections::BTreeMap;
use std::sync::Arc;

use bitvec::prelude::*;
use shared_crypto::{BlsPublicKeyBytes, BlsSignatureBytes};

use super::{AggregatedSignature, ConsensusError, ConsensusResult, ValidatorIndex, ValidatorWallet};
use crate::ports::SignatureService;

/// Combines per-validator signatures over the same content.
pub struct Aggregator {
    signatures: Arc<dyn SignatureService>,
}

impl Aggregator {
    pub fn new(signatures: Arc<dyn SignatureService>) -> Self {
        Self { signatures }
    }

    /// Aggregate `signatures` into one signature and a bitmap of
    /// `total_validators` bits.
    ///
    /// Callers must pass signatures over identical content only.
    pub fn aggregate(
        &self,
        signatures: &BTreeMap<ValidatorIndex, BlsSignatureBytes>,
        total_validators: usize,
    ) -> ConsensusResult<AggregatedSignature> {
        if signatures.is_empty() {
            return Err(ConsensusError::NoSignatures);
        }

        let mut validators = bitvec![u8, Msb0; 0; total_validators];
        for &index in signatures.keys() {
            if index >= total_validators {
                return Err(ConsensusError::ValidatorIndexOutOfRange {
                    index,
                    validators: total_validators,
                });
            }
            validators.set(index, true);
        }

        let collected: Vec<BlsSignatureBytes> = signatures.values().copied().collect();
        let signature = self
            .signatures
            .aggregate_signatures(&collected)
            .map_err(ConsensusError::Aggregation)?;

        Ok(AggregatedSignature {
            signature,
            validators,
        })
    }

    /// Check an aggregate against the public keys its bitmap selects.
    ///
    /// A bitmap sized differently from `validators` or selecting nobody
    /// fails verification.
    pub async fn verify(
        &self,
        aggregate: &AggregatedSignature,
        message: &[u8],
        validators: &[ValidatorWallet],
    ) -> bool {
        if aggregate.validators.len() != validators.len() {
            return false;
        }

        let public_keys: Vec<BlsPublicKeyBytes> = aggregate
            .validators
            .iter_ones()
            .map(|index| validators[index].bls_public_key)
            .collect();
        if public_keys.is_empty() {
            return false;
        }

        self.signatures
            .verify_aggregate(message, &aggregate.signature, &public_keys)
            .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::adapters::BlsSignatureService;
    use crate::test_support::TestNetwork;

    fn aggregator() -> Aggregator {
        Aggregator::new(Arc::new(BlsSignatureService::new()))
    }

    #[tokio::test]
    async fn test_aggregate_and_verify() {
        let network = TestNetwork::new(4);
        let message = b"prevote-1-0";
        let signatures: BTreeMap<_, _> = [0usize, 2, 3]
            .into_iter()
            .map(|i| (i, network.sign(i, message)))
            .collect();

        let aggregator = aggregator();
        let aggregate = aggregator.aggregate(&signatures, 4).unwrap();

        assert_eq!(aggregate.validators.len(), 4);
        assert_eq!(aggregate.signer_indices(), vec![0, 2, 3]);
        assert!(
            aggregator
                .verify(&aggregate, message, &network.validators)
                .await
        );
        assert!(
            !aggregator
                .verify(&aggregate, b"other message", &network.validators)
                .await
        );
    }

    #[tokio::test]
    async fn test_verify_rejects_tampered_bitmap() {
        let network = TestNetwork::new(4);
        let message = b"precommit";
        let signatures: BTreeMap<_, _> = [0usize, 1]
            .into_iter()
            .map(|i| (i, network.sign(i, message)))
            .collect();

        let aggregator = aggregator();
        let mut aggregate = aggregator.aggregate(&signatures, 4).unwrap();
        aggregate.validators.set(2, true);
        assert!(
            !aggregator
                .verify(&aggregate, message, &network.validators)
                .await
        );

        let mut short = aggregator.aggregate(&signatures, 4).unwrap();
        short.validators.truncate(3);
        assert!(!aggregator.verify(&short, message, &network.validators).await);
    }

    #[tokio::test]
    async fn test_verify_malformed_signature_is_false() {
        let network = TestNetwork::new(4);
        let aggregate = AggregatedSignature {
            signature: [0xAB; 96],
            validators: bitvec![u8, Msb0; 1; 4],
        };
        assert!(
            !aggregator()
                .verify(&aggregate, b"anything", &network.validators)
                .await
        );
    }

    #[test]
    fn test_aggregate_errors() {
        let network = TestNetwork::new(4);
        let aggregator = aggregator();

        assert_eq!(
            aggregator.aggregate(&BTreeMap::new(), 4),
            Err(ConsensusError::NoSignatures)
        );

        let out_of_range: BTreeMap<_, _> = [(7usize, network.sign(0, b"x"))].into_iter().collect();
        assert!(matches!(
            aggregator.aggregate(&out_of_range, 4),
            Err(ConsensusError::ValidatorIndexOutOfRange { index: 7, .. })
        ));
    }
}
