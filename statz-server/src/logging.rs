//! `tracing` subscriber setup.
//!
//! `RUST_LOG` wins over the configured level when set.

use anyhow::anyhow;
use statz_core::config::GeneralConfig;
use tracing_subscriber::EnvFilter;

/// Install the global subscriber described by `config`.
///
/// # Errors
/// Fails if the level does not parse or a global subscriber is already
/// installed.
pub fn init(config: &GeneralConfig) -> anyhow::Result<()> {
    let filter = match EnvFilter::try_from_default_env() {
        Ok(filter) => filter,
        Err(_) => EnvFilter::try_new(&config.log_level)
            .map_err(|e| anyhow!("invalid log level {:?}: {e}", config.log_level))?,
    };

    let builder = tracing_subscriber::fmt().with_env_filter(filter).with_target(true);
    let installed = if config.json_logs {
        builder.json().try_init()
    } else {
        builder.try_init()
    };
    installed.map_err(|e| anyhow!("failed to install tracing subscriber: {e}"))
}
