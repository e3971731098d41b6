//! File logging. The terminal belongs to the UI, so nothing goes to stderr
//! once it is up.

use std::fs;
use std::path::PathBuf;

use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::EnvFilter;

const LOG_FILE_NAME: &str = "ntfsmount.log";

/// Installs the global subscriber writing to `~/Library/Logs/ntfsmount.log`.
///
/// The returned guard flushes the writer on drop and must live until exit.
pub fn init() -> Option<WorkerGuard> {
    let dir = log_dir();
    if let Err(e) = fs::create_dir_all(&dir) {
        eprintln!(
            "ntfsmount: failed to create log directory {}: {}",
            dir.display(),
            e
        );
        return None;
    }

    let appender = tracing_appender::rolling::never(&dir, LOG_FILE_NAME);
    let (writer, guard) = tracing_appender::non_blocking(appender);

    tracing_subscriber::fmt()
        .with_writer(writer)
        .with_ansi(false)
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    Some(guard)
}

fn log_dir() -> PathBuf {
    dirs::home_dir()
        .map(|home| home.join("Library").join("Logs"))
        .unwrap_or_else(std::env::temp_dir)
}
