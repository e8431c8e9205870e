//! # Consensus Metrics
//!
//! Prometheus metrics for monitoring round progress.
//!
//! ## Usage
//!
//! Enable with the `metrics` feature:
//! ```toml
//! tc-consensus = { path = "...", features = ["metrics"] }
//! ```
//!
//! ## Metrics Exported
//!
//! - `consensus_rounds_started_total` - Counter of rounds entered
//! - `consensus_messages_total` - Counter of processed messages (by type and result)
//! - `consensus_timeouts_total` - Counter of fired stage timeouts (by stage)
//! - `consensus_equivocations_total` - Counter of detected equivocations (by type)
//! - `consensus_commits_total` - Counter of committed heights
//! - `consensus_commit_round` - Histogram of the round heights commit in

#[cfg(feature = "metrics")]
use lazy_static::lazy_static;

#[cfg(feature = "metrics")]
use prometheus::{
    register_counter_vec, register_histogram, register_int_counter, CounterVec, Histogram,
    IntCounter,
};

#[cfg(feature = "metrics")]
lazy_static! {
    /// Rounds entered by the driver
    pub static ref ROUNDS_STARTED: IntCounter = register_int_counter!(
        "consensus_rounds_started_total",
        "Total number of consensus rounds started"
    )
    .expect("Failed to create ROUNDS_STARTED metric");

    /// Processed messages, labeled by message type and result
    pub static ref MESSAGES: CounterVec = register_counter_vec!(
        "consensus_messages_total",
        "Total number of consensus messages processed",
        &["type", "result"]
    )
    .expect("Failed to create MESSAGES metric");

    /// Fired timeouts, labeled by stage
    pub static ref TIMEOUTS: CounterVec = register_counter_vec!(
        "consensus_timeouts_total",
        "Total number of stage timeouts fired",
        &["stage"]
    )
    .expect("Failed to create TIMEOUTS metric");

    /// Detected equivocations, labeled by vote type
    pub static ref EQUIVOCATIONS: CounterVec = register_counter_vec!(
        "consensus_equivocations_total",
        "Total number of equivocating votes detected",
        &["type"]
    )
    .expect("Failed to create EQUIVOCATIONS metric");

    /// Committed heights
    pub static ref COMMITS: IntCounter = register_int_counter!(
        "consensus_commits_total",
        "Total number of heights committed"
    )
    .expect("Failed to create COMMITS metric");

    /// Round in which each height committed
    pub static ref COMMIT_ROUND: Histogram = register_histogram!(
        "consensus_commit_round",
        "Round in which a height was committed",
        vec![0.0, 1.0, 2.0, 3.0, 5.0, 8.0, 13.0]
    )
    .expect("Failed to create COMMIT_ROUND metric");
}

/// Record a round start
#[cfg(feature = "metrics")]
pub fn record_round_started() {
    ROUNDS_STARTED.inc();
}

/// Record a processed message with its result
#[cfg(feature = "metrics")]
pub fn record_message(kind: &str, result: &str) {
    MESSAGES.with_label_values(&[kind, result]).inc();
}

/// Record a fired timeout
#[cfg(feature = "metrics")]
pub fn record_timeout(stage: &str) {
    TIMEOUTS.with_label_values(&[stage]).inc();
}

/// Record an equivocation
#[cfg(feature = "metrics")]
pub fn record_equivocation(kind: &str) {
    EQUIVOCATIONS.with_label_values(&[kind]).inc();
}

/// Record a committed height
#[cfg(feature = "metrics")]
pub fn record_commit(round: u32) {
    COMMITS.inc();
    COMMIT_ROUND.observe(f64::from(round));
}

// No-op implementations when metrics feature is disabled
#[cfg(not(feature = "metrics"))]
pub fn record_round_started() {}

#[cfg(not(feature = "metrics"))]
pub fn record_message(_kind: &str, _result: &str) {}

#[cfg(not(feature = "metrics"))]
pub fn record_timeout(_stage: &str) {}

#[cfg(not(feature = "metrics"))]
pub fn record_equivocation(_kind: &str) {}

#[cfg(not(feature = "metrics"))]
pub fn record_commit(_round: u32) {}
