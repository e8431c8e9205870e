//! # Tidal-Chain Test Suite
//!
//! Unified test crate containing:
//!
//! ## Structure
//!
//! ```text
//! tests/
//! ├── src/integration/   # Cross-crate consensus flows
//! │   ├── devnet_flows.rs    # Multi-validator devnet reaching commits
//! │   └── equivocation.rs    # Conflicting votes through the public API
//! └── benches/           # Criterion benchmarks
//! ```
//!
//! ## Running Tests
//!
//! ```bash
//! # All tests
//! cargo test -p tc-tests
//!
//! # Benchmarks
//! cargo bench -p tc-tests
//! ```

pub mod integration;
