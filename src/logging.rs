//! File-based logging. The TUI owns the terminal, so tracing output goes to
//! a daily rolling file under the config directory instead of stderr.

use anyhow::Result;
use std::path::Path;
use tracing_appender::non_blocking::WorkerGuard;
use tracing_appender::rolling::{RollingFileAppender, Rotation};
use tracing_subscriber::{EnvFilter, fmt, layer::SubscriberExt, util::SubscriberInitExt};

const LOG_FILE_PREFIX: &str = "chime";
const DEFAULT_FILTER: &str = "chime=debug,warn";

/// Installs the global subscriber. Keep the returned guard alive for the
/// lifetime of the program or buffered lines are lost on exit.
///
/// The filter comes from `RUST_LOG` when set.
pub fn init_logging(log_dir: &Path) -> Result<WorkerGuard> {
    crate::config::ensure_dir(log_dir)?;

    let file_appender = RollingFileAppender::new(Rotation::DAILY, log_dir, LOG_FILE_PREFIX);
    let (non_blocking, guard) = tracing_appender::non_blocking(file_appender);

    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(DEFAULT_FILTER));

    let fmt_layer = fmt::layer()
        .with_writer(non_blocking)
        .with_ansi(false)
        .with_target(true);

    tracing_subscriber::registry()
        .with(filter)
        .with(fmt_layer)
        .try_init()?;

    tracing::info!(dir = %log_dir.display(), "logging initialized");
    Ok(guard)
}
