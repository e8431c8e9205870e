//! # Shared Types Crate
//!
//! Chain entities and error types shared by every Tidal-Chain crate.
//!
//! ## Design Principles
//!
//! - **Single Source of Truth**: cross-crate types are defined here.
//! - **Content Addressing**: blocks are identified by the keccak-256 hash of
//!   their header, which commits to the transaction payload.

pub mod entities;
pub mod errors;

pub use entities::*;
pub use errors::*;
