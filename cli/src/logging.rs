//! Tracing setup for the CLI.
//!
//! Logs go to `docsight.log` in the application log directory. Stdout is
//! reserved for command output.

use config::PathManager;
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::{EnvFilter, fmt, prelude::*};

const DEFAULT_FILTER: &str = "info,docsight_core=debug,llm=info";

/// Install the global subscriber. Keep the returned guard alive until exit so
/// buffered lines are flushed.
pub fn init_logging(to_stderr: bool) -> Option<WorkerGuard> {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(DEFAULT_FILTER));

    if to_stderr {
        init_stderr_logging(filter);
        return None;
    }

    let Some(path) = PathManager::log_file_path() else {
        eprintln!("[docsight] No log path available, logging to stderr");
        init_stderr_logging(filter);
        return None;
    };

    if let Some(parent) = path.parent()
        && let Err(e) = std::fs::create_dir_all(parent)
    {
        eprintln!("[docsight] Failed to create log directory {:?}: {}", parent, e);
    }

    let file = match std::fs::OpenOptions::new()
        .create(true)
        .append(true)
        .open(&path)
    {
        Ok(file) => file,
        Err(e) => {
            eprintln!("[docsight] Failed to open log file {:?}: {}", path, e);
            init_stderr_logging(filter);
            return None;
        }
    };

    let (non_blocking, guard) = tracing_appender::non_blocking(file);
    let subscriber = tracing_subscriber::registry().with(filter).with(
        fmt::layer()
            .with_writer(non_blocking)
            .with_ansi(false)
            .with_target(true)
            .with_file(true)
            .with_line_number(true),
    );

    match tracing::subscriber::set_global_default(subscriber) {
        Ok(()) => tracing::info!("Logging initialized, writing to {:?}", path),
        Err(e) => eprintln!("[docsight] Failed to set tracing subscriber: {}", e),
    }
    Some(guard)
}

fn init_stderr_logging(filter: EnvFilter) {
    let subscriber = tracing_subscriber::registry()
        .with(filter)
        .with(fmt::layer().with_writer(std::io::stderr).with_target(true));

    if let Err(e) = tracing::subscriber::set_global_default(subscriber) {
        eprintln!("[docsight] Failed to set tracing subscriber: {}", e);
    }
}
