//! BLS12-381 Signature Implementation
//!
//! Provides BLS signature primitives for:
//! - Key generation (random or from a 32-byte seed)
//! - Sign/verify operations
//! - Signature and public key aggregation
//! - Fast aggregate verification (all signers signed the same message)
//!
//! Uses blst's `min_pk` variant: 48-byte public keys (G1) and 96-byte
//! signatures (G2). Consensus votes and commit proofs are built on this.

use blst::min_pk::{AggregatePublicKey, AggregateSignature, PublicKey, SecretKey, Signature};
use blst::BLST_ERROR;
use rand::RngCore;
use zeroize::Zeroize;

use crate::CryptoError;

/// Domain separation tag for BLS signatures (proof-of-possession scheme)
const DST: &[u8] = b"BLS_SIG_BLS12381G2_XMD:SHA-256_SSWU_RO_POP_";

/// Length of a compressed public key.
pub const PUBLIC_KEY_LENGTH: usize = 48;

/// Length of a compressed signature.
pub const SIGNATURE_LENGTH: usize = 96;

/// Raw compressed public key bytes.
pub type BlsPublicKeyBytes = [u8; PUBLIC_KEY_LENGTH];

/// Raw compressed signature bytes.
pub type BlsSignatureBytes = [u8; SIGNATURE_LENGTH];

/// BLS secret key seed wrapper (32 bytes), wiped on drop
#[derive(Clone, Zeroize)]
#[zeroize(drop)]
pub struct BlsSecretKey([u8; 32]);

impl BlsSecretKey {
    /// Create from raw bytes
    pub fn from_bytes(bytes: &[u8; 32]) -> Self {
        Self(*bytes)
    }

    /// Get raw bytes
    pub fn as_bytes(&self) -> &[u8; 32] {
        &self.0
    }
}

/// BLS public key (48 bytes compressed)
#[derive(Clone, Debug)]
pub struct BlsPublicKey(PublicKey);

impl PartialEq for BlsPublicKey {
    fn eq(&self, other: &Self) -> bool {
        self.to_bytes() == other.to_bytes()
    }
}

impl Eq for BlsPublicKey {}

/// BLS signature (96 bytes compressed)
#[derive(Clone, Debug)]
pub struct BlsSignature(Signature);

impl PartialEq for BlsSignature {
    fn eq(&self, other: &Self) -> bool {
        self.to_bytes() == other.to_bytes()
    }
}

impl Eq for BlsSignature {}

/// BLS key pair for signing operations
pub struct BlsKeyPair {
    secret: SecretKey,
    public: BlsPublicKey,
}

impl BlsKeyPair {
    /// Generate a new random key pair
    pub fn generate() -> Result<Self, CryptoError> {
        let mut ikm = BlsSecretKey([0u8; 32]);
        rand::thread_rng().fill_bytes(&mut ikm.0);
        Self::from_seed(&ikm)
    }

    /// Derive a key pair from 32 bytes of input keying material.
    ///
    /// The same seed always yields the same key pair.
    pub fn from_seed(seed: &BlsSecretKey) -> Result<Self, CryptoError> {
        let secret = SecretKey::key_gen(seed.as_bytes(), &[])
            .map_err(|e| CryptoError::KeyGenerationFailed(format!("{e:?}")))?;
        let public = BlsPublicKey(secret.sk_to_pk());
        Ok(Self { secret, public })
    }

    /// Sign a message
    pub fn sign(&self, message: &[u8]) -> BlsSignature {
        BlsSignature(self.secret.sign(message, DST, &[]))
    }

    /// Get the public key
    pub fn public_key(&self) -> BlsPublicKey {
        self.public.clone()
    }
}

impl BlsPublicKey {
    /// Verify a signature against this public key
    pub fn verify(&self, message: &[u8], signature: &BlsSignature) -> bool {
        signature.0.verify(true, message, DST, &[], &self.0, true) == BLST_ERROR::BLST_SUCCESS
    }

    /// Create from 48-byte compressed representation
    pub fn from_bytes(bytes: &BlsPublicKeyBytes) -> Result<Self, CryptoError> {
        PublicKey::from_bytes(bytes)
            .map(BlsPublicKey)
            .map_err(|_| CryptoError::InvalidPublicKey)
    }

    /// Serialize to 48-byte compressed form
    pub fn to_bytes(&self) -> BlsPublicKeyBytes {
        self.0.to_bytes()
    }

    /// Aggregate multiple public keys into one
    ///
    /// The aggregated key can verify aggregated signatures.
    pub fn aggregate(keys: &[BlsPublicKey]) -> Result<Self, CryptoError> {
        if keys.is_empty() {
            return Err(CryptoError::InvalidInput("empty key list".into()));
        }
        let refs: Vec<&PublicKey> = keys.iter().map(|k| &k.0).collect();
        AggregatePublicKey::aggregate(&refs, true)
            .map(|apk| BlsPublicKey(apk.to_public_key()))
            .map_err(|_| CryptoError::AggregationFailed)
    }
}

impl BlsSignature {
    /// Create from 96-byte representation
    pub fn from_bytes(bytes: &BlsSignatureBytes) -> Result<Self, CryptoError> {
        Signature::from_bytes(bytes)
            .map(BlsSignature)
            .map_err(|_| CryptoError::InvalidSignature)
    }

    /// Serialize to 96-byte form
    pub fn to_bytes(&self) -> BlsSignatureBytes {
        self.0.to_bytes()
    }

    /// Aggregate multiple signatures into one
    ///
    /// The aggregated signature can be verified against the aggregated public key.
    pub fn aggregate(sigs: &[BlsSignature]) -> Result<Self, CryptoError> {
        if sigs.is_empty() {
            return Err(CryptoError::InvalidInput("empty signature list".into()));
        }
        let refs: Vec<&Signature> = sigs.iter().map(|s| &s.0).collect();
        AggregateSignature::aggregate(&refs, true)
            .map(|asig| BlsSignature(asig.to_signature()))
            .map_err(|_| CryptoError::AggregationFailed)
    }

    /// Verify an aggregate of signatures over the same message.
    ///
    /// Every key in `public_keys` must have signed `message`.
    pub fn fast_aggregate_verify(&self, message: &[u8], public_keys: &[BlsPublicKey]) -> bool {
        if public_keys.is_empty() {
            return false;
        }
        let refs: Vec<&PublicKey> = public_keys.iter().map(|k| &k.0).collect();
        self.0.fast_aggregate_verify(true, message, DST, &refs) == BLST_ERROR::BLST_SUCCESS
    }
}

/// Verify raw signature bytes against raw public key bytes.
///
/// Malformed keys or signatures verify as `false`.
pub fn verify_bytes(
    message: &[u8],
    signature: &BlsSignatureBytes,
    public_key: &BlsPublicKeyBytes,
) -> bool {
    let Ok(sig) = BlsSignature::from_bytes(signature) else {
        return false;
    };
    let Ok(pk) = BlsPublicKey::from_bytes(public_key) else {
        return false;
    };
    pk.verify(message, &sig)
}
