//! # Node Configuration
//!
//! Devnet parameters loaded from the environment.
//!
//! | Variable | Default | Description |
//! |----------|---------|-------------|
//! | `TC_VALIDATORS` | `4` | Number of in-process validators |
//! | `TC_STAGE_TIMEOUT_MS` | `2000` | Base stage timeout |
//! | `TC_STAGE_TIMEOUT_INCREASE_MS` | `2000` | Extra timeout per round |
//! | `TC_MAX_ROUND_LOOKAHEAD` | `10` | Rounds ahead of the current one accepted |
//! | `TC_MAX_HEIGHT` | unset | Stop once every validator committed this height |

use std::env;
use std::str::FromStr;

use shared_types::BlockNumber;
use tc_consensus::{ConsensusConfig, Milestone};
use thiserror::Error;

/// Configuration errors.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("{name} is not a valid value: '{value}'")]
    Invalid { name: &'static str, value: String },

    #[error("TC_VALIDATORS must be at least 1")]
    NoValidators,
}

/// Complete devnet configuration.
#[derive(Debug, Clone)]
pub struct NodeConfig {
    pub validators: usize,
    pub stage_timeout_ms: u64,
    pub stage_timeout_increase_ms: u64,
    pub max_round_lookahead: u32,
    /// `None` runs until Ctrl-C
    pub max_height: Option<BlockNumber>,
}

impl Default for NodeConfig {
    fn default() -> Self {
        let milestone = Milestone::default();
        Self {
            validators: milestone.round_validators,
            stage_timeout_ms: milestone.stage_timeout_ms,
            stage_timeout_increase_ms: milestone.stage_timeout_increase_ms,
            max_round_lookahead: ConsensusConfig::default().max_round_lookahead,
            max_height: None,
        }
    }
}

fn parse_var<T: FromStr>(name: &'static str) -> Result<Option<T>, ConfigError> {
    match env::var(name) {
        Ok(value) => value
            .trim()
            .parse()
            .map(Some)
            .map_err(|_| ConfigError::Invalid { name, value }),
        Err(_) => Ok(None),
    }
}

impl NodeConfig {
    /// Read the `TC_*` variables, falling back to defaults.
    pub fn from_env() -> Result<Self, ConfigError> {
        let defaults = Self::default();
        let config = Self {
            validators: parse_var("TC_VALIDATORS")?.unwrap_or(defaults.validators),
            stage_timeout_ms: parse_var("TC_STAGE_TIMEOUT_MS")?
                .unwrap_or(defaults.stage_timeout_ms),
            stage_timeout_increase_ms: parse_var("TC_STAGE_TIMEOUT_INCREASE_MS")?
                .unwrap_or(defaults.stage_timeout_increase_ms),
            max_round_lookahead: parse_var("TC_MAX_ROUND_LOOKAHEAD")?
                .unwrap_or(defaults.max_round_lookahead),
            max_height: parse_var("TC_MAX_HEIGHT")?,
        };
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.validators == 0 {
            return Err(ConfigError::NoValidators);
        }
        Ok(())
    }

    /// Single-milestone consensus configuration for every validator
    pub fn consensus_config(&self) -> ConsensusConfig {
        ConsensusConfig {
            max_round_lookahead: self.max_round_lookahead,
            ..ConsensusConfig::with_milestone(Milestone {
                activation_height: 0,
                round_validators: self.validators,
                stage_timeout_ms: self.stage_timeout_ms,
                stage_timeout_increase_ms: self.stage_timeout_increase_ms,
            })
        }
    }
}
