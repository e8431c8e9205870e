//! BLS signature adapters over `shared-crypto`.

use async_trait::async_trait;
use shared_crypto::{
    verify_bytes, BlsKeyPair, BlsPublicKey, BlsPublicKeyBytes, BlsSignature, BlsSignatureBytes,
};
use tracing::warn;

use crate::ports::{SignatureService, Signer};

/// BLS verification and aggregation.
///
/// Pairing checks run on tokio's blocking pool so message processors keep
/// interleaving while a verification is in flight.
#[derive(Clone, Copy, Debug, Default)]
pub struct BlsSignatureService;

impl BlsSignatureService {
    pub fn new() -> Self {
        Self
    }
}

fn fast_aggregate_verify(
    message: &[u8],
    signature: &BlsSignatureBytes,
    public_keys: &[BlsPublicKeyBytes],
) -> bool {
    let Ok(signature) = BlsSignature::from_bytes(signature) else {
        return false;
    };
    let keys: Result<Vec<BlsPublicKey>, _> =
        public_keys.iter().map(BlsPublicKey::from_bytes).collect();
    match keys {
        Ok(keys) => signature.fast_aggregate_verify(message, &keys),
        Err(_) => false,
    }
}

#[async_trait]
impl SignatureService for BlsSignatureService {
    async fn verify(
        &self,
        message: &[u8],
        signature: &BlsSignatureBytes,
        public_key: &BlsPublicKeyBytes,
    ) -> bool {
        let message = message.to_vec();
        let (signature, public_key) = (*signature, *public_key);
        tokio::task::spawn_blocking(move || verify_bytes(&message, &signature, &public_key))
            .await
            .unwrap_or_else(|e| {
                warn!("[tc-consensus] Signature verification task failed: {}", e);
                false
            })
    }

    async fn verify_aggregate(
        &self,
        message: &[u8],
        signature: &BlsSignatureBytes,
        public_keys: &[BlsPublicKeyBytes],
    ) -> bool {
        let message = message.to_vec();
        let signature = *signature;
        let public_keys = public_keys.to_vec();
        tokio::task::spawn_blocking(move || {
            fast_aggregate_verify(&message, &signature, &public_keys)
        })
        .await
        .unwrap_or_else(|e| {
            warn!("[tc-consensus] Aggregate verification task failed: {}", e);
            false
        })
    }

    fn aggregate_signatures(
        &self,
        signatures: &[BlsSignatureBytes],
    ) -> Result<BlsSignatureBytes, String> {
        let parsed = signatures
            .iter()
            .map(BlsSignature::from_bytes)
            .collect::<Result<Vec<_>, _>>()
            .map_err(|e| e.to_string())?;
        BlsSignature::aggregate(&parsed)
            .map(|aggregate| aggregate.to_bytes())
            .map_err(|e| e.to_string())
    }
}

/// Local validator key backed by a [`BlsKeyPair`].
pub struct BlsSigner {
    keypair: BlsKeyPair,
}

impl BlsSigner {
    pub fn new(keypair: BlsKeyPair) -> Self {
        Self { keypair }
    }
}

impl Signer for BlsSigner {
    fn public_key(&self) -> BlsPublicKeyBytes {
        self.keypair.public_key().to_bytes()
    }

    fn sign(&self, message: &[u8]) -> BlsSignatureBytes {
        self.keypair.sign(message).to_bytes()
    }
}
