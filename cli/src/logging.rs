use std::path::{Path, PathBuf};
use std::sync::OnceLock;

use tracing::Level;
use tracing_appender::non_blocking::WorkerGuard;
use tracing_appender::rolling::{RollingFileAppender, Rotation};
use tracing_subscriber::fmt::time::UtcTime;
use tracing_subscriber::prelude::*;
use tracing_subscriber::{fmt, EnvFilter};

use crate::config::{runtime_dir, LogLevel};

static INIT: OnceLock<()> = OnceLock::new();

pub const DAEMON_LOG_PREFIX: &str = "sentinel-daemon";
const DAEMON_LOG_SUFFIX: &str = "log";
const KEPT_LOG_FILES: usize = 7;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogMode {
    /// Background daemon: rotated files only.
    File,
    /// Interactive commands.
    Stderr,
    /// Foreground daemon: files plus a copy on the terminal.
    Both,
}

pub struct LogGuard {
    _guard: Option<WorkerGuard>,
}

/// Installs the global subscriber once; later calls are no-ops.
pub fn init(level: LogLevel, mode: LogMode, cli_override: Option<LogLevel>) -> LogGuard {
    let mut guard = None;

    INIT.get_or_init(|| {
        let Some(level) = cli_override.unwrap_or(level).as_tracing_level() else {
            return;
        };

        guard = match mode {
            LogMode::Stderr => {
                init_stderr_logging(level);
                None
            }
            LogMode::File => init_file_logging(level, false),
            LogMode::Both => init_file_logging(level, true),
        };
    });

    LogGuard { _guard: guard }
}

fn build_env_filter(level: Level) -> EnvFilter {
    EnvFilter::builder()
        .with_default_directive(level.into())
        .from_env_lossy()
}

fn daily_appender(log_dir: &Path) -> Option<RollingFileAppender> {
    RollingFileAppender::builder()
        .rotation(Rotation::DAILY)
        .filename_prefix(DAEMON_LOG_PREFIX)
        .filename_suffix(DAEMON_LOG_SUFFIX)
        .max_log_files(KEPT_LOG_FILES)
        .build(log_dir)
        .ok()
}

fn init_stderr_logging(level: Level) {
    let stderr_layer = fmt::layer()
        .with_writer(std::io::stderr)
        .with_timer(UtcTime::rfc_3339())
        .with_target(true);

    tracing_subscriber::registry()
        .with(build_env_filter(level))
        .with(stderr_layer)
        .init();
}

fn init_file_logging(level: Level, echo_stderr: bool) -> Option<WorkerGuard> {
    let dir = log_dir();
    let appender = match std::fs::create_dir_all(&dir) {
        Ok(()) => daily_appender(&dir),
        Err(e) => {
            eprintln!("Warning: Failed to create log directory {:?}: {}", dir, e);
            None
        }
    };

    let Some(appender) = appender else {
        if echo_stderr {
            init_stderr_logging(level);
        }
        return None;
    };

    let (non_blocking, guard) = tracing_appender::non_blocking(appender);

    let file_layer = fmt::layer()
        .with_writer(non_blocking)
        .with_timer(UtcTime::rfc_3339())
        .with_ansi(false)
        .with_target(true)
        .with_file(true)
        .with_line_number(true);
    let stderr_layer = echo_stderr.then(|| {
        fmt::layer()
            .with_writer(std::io::stderr)
            .with_timer(UtcTime::rfc_3339())
            .with_target(true)
    });

    tracing_subscriber::registry()
        .with(build_env_filter(level))
        .with(file_layer)
        .with(stderr_layer)
        .init();

    Some(guard)
}

/// Directory the daemon writes its rotated logs into.
pub fn log_dir() -> PathBuf {
    runtime_dir()
}

/// The most recent daemon log in `dir`. Daily files sort by date.
pub fn newest_daemon_log(dir: &Path) -> Option<PathBuf> {
    let suffix = format!(".{}", DAEMON_LOG_SUFFIX);
    std::fs::read_dir(dir)
        .ok()?
        .filter_map(|e| e.ok())
        .filter(|e| {
            let name = e.file_name();
            let name = name.to_string_lossy();
            name.starts_with(DAEMON_LOG_PREFIX) && name.ends_with(&suffix)
        })
        .map(|e| e.path())
        .max()
}

#[cfg(test)]
mod tests {
    use std::io::Write;

    use super::*;

    #[test]
    fn test_appender_names_match_log_lookup() {
        let dir = tempfile::tempdir().unwrap();
        let mut appender = daily_appender(dir.path()).unwrap();
        appender.write_all(b"daemon starting\n").unwrap();
        appender.flush().unwrap();

        let newest = newest_daemon_log(dir.path()).unwrap();
        let content = std::fs::read_to_string(newest).unwrap();
        assert!(content.contains("daemon starting"));
    }

    #[test]
    fn test_newest_daemon_log() {
        let dir = tempfile::tempdir().unwrap();
        for name in [
            "sentinel-daemon.2026-10-16.log",
            "sentinel-daemon.2026-10-18.log",
            "sentinel-daemon.2026-10-17.log",
            "other.2026-10-19.log",
            "sentinel-daemon.2026-10-19.txt",
        ] {
            std::fs::write(dir.path().join(name), "").unwrap();
        }

        let newest = newest_daemon_log(dir.path()).unwrap();
        assert_eq!(
            newest.file_name().unwrap().to_string_lossy(),
            "sentinel-daemon.2026-10-18.log"
        );
    }

    #[test]
    fn test_no_daemon_log() {
        let dir = tempfile::tempdir().unwrap();
        assert!(newest_daemon_log(dir.path()).is_none());
        assert!(newest_daemon_log(&dir.path().join("missing")).is_none());
    }
}
