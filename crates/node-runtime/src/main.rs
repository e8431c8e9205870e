//! # Tidal-Chain Node Runtime
//!
//! Runs an in-process devnet: every validator gets its own consensus engine
//! and in-memory chain, and broadcasts are routed between them over
//! channels.
//!
//! ## Startup Sequence
//!
//! 1. Load telemetry and node configuration from the environment
//! 2. Install the logging subscriber
//! 3. Launch the devnet at height 1
//! 4. Report progress until Ctrl-C or `TC_MAX_HEIGHT`
//! 5. Stop every driver and report halted validators

use std::time::Duration;

use anyhow::{Context, Result};
use tracing::info;

use node_runtime::{Devnet, DevnetOptions, NodeConfig};
use tc_telemetry::{init_logging, TelemetryConfig};

const PROGRESS_INTERVAL: Duration = Duration::from_secs(5);

#[tokio::main]
async fn main() -> Result<()> {
    let telemetry = TelemetryConfig::from_env().context("Failed to load telemetry config")?;
    init_logging(&telemetry).context("Failed to initialize logging")?;

    let config = NodeConfig::from_env().context("Failed to load node config")?;
    info!("===========================================");
    info!("  Tidal-Chain Node Runtime v{}", env!("CARGO_PKG_VERSION"));
    info!("  Validators: {}", config.validators);
    info!(
        "  Stage timeout: {} ms (+{} ms per round)",
        config.stage_timeout_ms, config.stage_timeout_increase_ms
    );
    info!("===========================================");

    let options = DevnetOptions::new(config.consensus_config(), config.validators);
    let devnet = Devnet::launch(options)
        .await
        .context("Failed to launch devnet")?;

    match config.max_height {
        Some(height) => {
            info!(height, "Running until every validator commits the target height");
            tokio::select! {
                reached = wait_for_target(&devnet, height) => reached?,
                _ = tokio::signal::ctrl_c() => info!("Ctrl-C received"),
            }
        }
        None => {
            info!("Node is running. Press Ctrl+C to stop.");
            tokio::select! {
                _ = report_progress(&devnet) => {}
                signal = tokio::signal::ctrl_c() => signal.context("Failed to listen for Ctrl-C")?,
            }
        }
    }

    info!(
        height = devnet.min_committed_height(),
        "Shutting down devnet"
    );
    devnet.shutdown().await
}

async fn wait_for_target(devnet: &Devnet, height: u64) -> Result<()> {
    loop {
        let step = (devnet.min_committed_height() + 1).min(height);
        devnet.wait_for_height(step, Duration::from_secs(3600)).await?;
        info!(height = step, "Height committed by every validator");
        if step >= height {
            return Ok(());
        }
    }
}

async fn report_progress(devnet: &Devnet) {
    let mut interval = tokio::time::interval(PROGRESS_INTERVAL);
    loop {
        interval.tick().await;
        for node in devnet.nodes() {
            info!(
                validator = node.index,
                height = node.committed_height(),
                round = node.service.current_round(),
                "Validator progress"
            );
        }
    }
}
