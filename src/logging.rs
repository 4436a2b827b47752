//! Diagnostic logging.
//!
//! The shell owns the terminal, so log records never go to stdout or stderr.
//! They are written to a file chosen with `--log-file`; without it nothing is
//! installed and the `tracing` macros are no-ops.

use anyhow::{Context, Result};
use std::fs::File;
use std::path::Path;
use std::sync::Arc;
use tracing_subscriber::prelude::*;
use tracing_subscriber::{EnvFilter, fmt};

/// Install the global subscriber, logging to a fresh file at `log_file_path`.
///
/// Filtering follows `RUST_LOG`, with DEBUG as the default level.
pub fn init_global(log_file_path: &Path) -> Result<()> {
    let log_file = File::create(log_file_path)
        .with_context(|| format!("cannot create log file {}", log_file_path.display()))?;
    build_subscriber(log_file)
        .try_init()
        .context("a global tracing subscriber is already installed")?;
    Ok(())
}

/// Build a subscriber writing plain-text records to `log_file`.
pub fn build_subscriber(log_file: File) -> impl tracing::Subscriber + Send + Sync {
    let env_filter = EnvFilter::from_default_env().add_directive(tracing::Level::DEBUG.into());

    let fmt_layer = fmt::layer()
        .with_ansi(false)
        .with_writer(Arc::new(log_file));

    tracing_subscriber::registry()
        .with(fmt_layer)
        .with(env_filter)
}
