//! Diagnostic logging.
//!
//! Structured `tracing` events go to a daily rolling file in the data directory so
//! they never interleave with the coloured terminal output. `RUST_LOG` overrides
//! the configured filter.

use std::path::Path;

use tracing_appender::{non_blocking, non_blocking::WorkerGuard, rolling};
use tracing_subscriber::{EnvFilter, fmt, prelude::*};

use crate::Res;

/// Keeps the background log writer alive; logs are flushed when it is dropped.
pub struct LoggingGuard {
    _guard: WorkerGuard,
}

pub fn init_logging(filter_directives: &str, log_dir: &Path) -> Res<LoggingGuard> {
    std::fs::create_dir_all(log_dir)?;

    let (writer, guard) = non_blocking(rolling::daily(log_dir, "spbackup.log"));
    let filter = std::env::var("RUST_LOG")
        .ok()
        .map(EnvFilter::new)
        .unwrap_or_else(|| EnvFilter::new(filter_directives));

    let fmt_layer = fmt::layer()
        .with_writer(writer)
        .with_ansi(false)
        .with_target(true)
        .with_thread_names(true);

    tracing_subscriber::registry()
        .with(filter)
        .with(fmt_layer)
        .try_init()?;

    Ok(LoggingGuard { _guard: guard })
}
