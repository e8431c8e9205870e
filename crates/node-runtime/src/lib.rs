//! # Node Runtime Library
//!
//! Devnet wiring for Tidal-Chain, exposed as a library so integration tests
//! can drive the same network the `node-runtime` binary runs.
//!
//! - `config`: `NodeConfig` from `TC_*` environment variables
//! - `devnet`: in-process validators, message routing, shutdown

pub mod config;
pub mod devnet;

pub use config::{ConfigError, NodeConfig};
pub use devnet::{validator_keypair, validator_wallets, Devnet, DevnetNode, DevnetOptions};
