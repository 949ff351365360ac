use anyhow::{Context, Result};
use tracing_subscriber::EnvFilter;

/// Install the global JSON subscriber at `log_level`, unless `RUST_LOG`
/// overrides it.
///
/// Logs go to stderr so that `blobctl` output on stdout stays clean.
///
/// # Errors
///
/// Returns an error if a global subscriber is already set or the level does
/// not parse.
pub fn init_tracing(log_level: &str) -> Result<()> {
    let filter = match EnvFilter::try_from_default_env() {
        Ok(filter) => filter,
        Err(_) => EnvFilter::try_new(log_level)
            .with_context(|| format!("invalid log level {log_level:?}"))?,
    };

    tracing_subscriber::fmt()
        .json()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .try_init()
        .map_err(|e| anyhow::anyhow!("failed to initialise tracing subscriber: {e}"))
}

