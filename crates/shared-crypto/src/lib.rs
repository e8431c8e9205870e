//! # Shared Crypto - BLS Primitives
//!
//! ## Components
//!
//! | Module | Algorithm | Use Case |
//! |--------|-----------|----------|
//! | `bls` | BLS12-381 (`min_pk`) | Consensus votes, lock proofs, commit proofs |
//!
//! ## Security Properties
//!
//! - **Proof-of-possession DST**: aggregate verification over a single
//!   message is safe against rogue-key attacks for registered keys.
//! - **Zeroized seeds**: secret seeds are wiped from memory on drop.

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod bls;
pub mod errors;

// Re-exports
pub use bls::{
    verify_bytes, BlsKeyPair, BlsPublicKey, BlsPublicKeyBytes, BlsSecretKey, BlsSignature,
    BlsSignatureBytes, PUBLIC_KEY_LENGTH, SIGNATURE_LENGTH,
};
pub use errors::CryptoError;

/// Crate version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
