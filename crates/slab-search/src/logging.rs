//! Structured logging setup.
//!
//! Installs a global `tracing` subscriber writing to **stderr**, either in
//! a human `pretty` format or as JSON lines. `RUST_LOG` overrides the
//! configured level, e.g. `RUST_LOG=slab_search_core=debug`.
//!
//! Field names used across the crates: `key` (document key), `model`,
//! `error`, and the `SyncRun` counter names.

use anyhow::{anyhow, bail, Result};
use std::sync::OnceLock;
use tracing_subscriber::prelude::*;
use tracing_subscriber::{fmt, EnvFilter};

use crate::config::LoggingConfig;

static LOGGING_INITIALIZED: OnceLock<bool> = OnceLock::new();

/// Initialize the global subscriber. Calling it twice is an error.
pub fn init_logging(config: &LoggingConfig) -> Result<()> {
    if LOGGING_INITIALIZED.get().is_some() {
        bail!("logging already initialized");
    }

    let env_filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(&config.level))
        .map_err(|e| anyhow!("invalid log level '{}': {}", config.level, e))?;

    let registry = tracing_subscriber::registry().with(env_filter);
    let installed = match config.format.as_str() {
        "json" => registry
            .with(
                fmt::layer()
                    .json()
                    .with_writer(std::io::stderr)
                    .with_target(true)
                    .with_current_span(false),
            )
            .try_init(),
        _ => registry
            .with(
                fmt::layer()
                    .with_writer(std::io::stderr)
                    .with_target(false)
                    .with_ansi(atty::is(atty::Stream::Stderr)),
            )
            .try_init(),
    };
    installed.map_err(|e| anyhow!("failed to set global subscriber: {}", e))?;

    let _ = LOGGING_INITIALIZED.set(true);
    Ok(())
}
