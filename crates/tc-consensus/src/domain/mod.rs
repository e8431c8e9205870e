//! Domain layer for the consensus round engine
//!
//! - quorum: majority / minority thresholds
//! - aggregator: BLS aggregation over validator bitmaps
//! - round_state: per-(height, round) proposal, votes and commit

mod aggregator;
mod commit;
mod config;
mod error;
mod messages;
pub mod quorum;
mod round_state;
mod tally;
mod validator;

pub use aggregator::*;
pub use commit::*;
pub use config::*;
pub use error::*;
pub use messages::*;
pub use quorum::{is_majority, is_minority};
pub use round_state::*;
pub use tally::*;
pub use validator::*;
