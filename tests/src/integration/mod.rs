//! Cross-crate integration flows.

mod devnet_flows;
mod equivocation;

/// Install a test subscriber once; `RUST_LOG` controls verbosity.
#[cfg(test)]
pub(crate) fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}
