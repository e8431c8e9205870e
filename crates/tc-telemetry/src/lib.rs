//! # Tidal Telemetry
//!
//! Logging setup shared by Tidal-Chain binaries.
//!
//! ## Usage
//!
//! ```rust,ignore
//! use tc_telemetry::{init_logging, TelemetryConfig};
//!
//! fn main() -> anyhow::Result<()> {
//!     let config = TelemetryConfig::from_env()?;
//!     init_logging(&config)?;
//!     // Application code here
//!     Ok(())
//! }
//! ```
//!
//! ## Environment Variables
//!
//! | Variable | Default | Description |
//! |----------|---------|-------------|
//! | `TC_LOG_LEVEL` | `info` | `EnvFilter` directive |
//! | `TC_LOG_FORMAT` | `text` | `text` or `json` |
//! | `TC_LOG_TARGET` | `false` | Show module targets |
//! | `TC_SERVICE_NAME` | `tidal-chain` | Service name |

mod config;
mod logging;

pub use config::{LogFormat, TelemetryConfig};
pub use logging::{env_filter, init_logging};

use thiserror::Error;

/// Telemetry initialization errors
#[derive(Error, Debug)]
pub enum TelemetryError {
    #[error("Failed to initialize logging: {0}")]
    LoggingInit(String),

    #[error("Invalid configuration: {0}")]
    Config(String),
}
