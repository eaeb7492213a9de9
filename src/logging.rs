//! Tracing setup for the command-line client.
//!
//! Logs go to the data directory (`.../relaychat/logs/relaychat.log`) so they
//! do not interleave with the conversation on stdout. Falls back to stderr
//! when the file cannot be opened.

use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::{EnvFilter, fmt, prelude::*};

use crate::config::PathManager;

const DEFAULT_FILTER: &str = "info,relaychat=debug";

/// Installs the global subscriber. Keep the returned guard alive for the
/// life of the program or buffered lines are lost.
pub fn init_logging() -> Option<WorkerGuard> {
    let Some(path) = PathManager::log_file_path() else {
        init_stderr_logging();
        return None;
    };

    if let Some(parent) = path.parent() {
        if let Err(e) = std::fs::create_dir_all(parent) {
            eprintln!("[relaychat] Failed to create log directory {:?}: {}", parent, e);
        }
    }

    let file = std::fs::OpenOptions::new()
        .create(true)
        .append(true)
        .open(&path);

    match file {
        Ok(file) => {
            let (non_blocking, guard) = tracing_appender::non_blocking(file);
            let filter =
                EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(DEFAULT_FILTER));
            let subscriber = tracing_subscriber::registry().with(filter).with(
                fmt::layer()
                    .with_writer(non_blocking)
                    .with_ansi(false)
                    .with_target(true)
                    .with_file(true)
                    .with_line_number(true),
            );
            if let Err(e) = tracing::subscriber::set_global_default(subscriber) {
                eprintln!("[relaychat] Failed to set tracing subscriber: {}", e);
            }
            tracing::info!("Logging initialized, writing to {:?}", path);
            Some(guard)
        }
        Err(e) => {
            eprintln!("[relaychat] Failed to open log file {:?}: {}", path, e);
            init_stderr_logging();
            None
        }
    }
}

/// Returns whether the subscriber was installed.
pub fn init_stderr_logging() -> bool {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn"));
    let subscriber = tracing_subscriber::registry().with(filter).with(
        fmt::layer()
            .with_writer(std::io::stderr)
            .with_ansi(true)
            .with_target(true),
    );
    match tracing::subscriber::set_global_default(subscriber) {
        Ok(()) => true,
        Err(e) => {
            eprintln!("[relaychat] Failed to set tracing subscriber: {}", e);
            false
        }
    }
}
