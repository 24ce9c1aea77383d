//! # notify-logging
//!
//! Structured logging with `tracing`.
//!
//! Output goes either to stderr or to an append-only log file. The target is
//! chosen from the `--log-file` flag by [`resolve_log_target`]:
//!
//! | flag | target |
//! |---|---|
//! | absent or empty | `<config-dir>/notification.log` |
//! | `-` | stderr |
//! | any other path | that file, made absolute |
//!
//! `RUST_LOG` takes precedence over the configured level.

#![deny(unsafe_code)]

use std::fs::{File, OpenOptions};
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use thiserror::Error;
use tracing_subscriber::EnvFilter;

/// Default log file name inside the config directory.
pub const DEFAULT_LOG_FILE: &str = "notification.log";

/// Errors raised while preparing log output.
#[derive(Debug, Error)]
pub enum LoggingError {
    /// The log file could not be opened or its path resolved.
    #[error("failed to open log file {path}: {source}")]
    Io {
        /// The offending path.
        path: PathBuf,
        /// Underlying error.
        #[source]
        source: std::io::Error,
    },
}

/// Where log lines are written.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum LogTarget {
    /// Human-readable output on stderr.
    Stderr,
    /// Appended to this (absolute) file.
    File(PathBuf),
}

/// Resolve the log target from the config directory and the `--log-file` flag.
pub fn resolve_log_target(config_dir: &Path, flag: Option<&str>) -> Result<LogTarget, LoggingError> {
    match flag {
        Some("-") => Ok(LogTarget::Stderr),
        Some(path) if !path.is_empty() => {
            let path = PathBuf::from(path);
            let absolute = std::path::absolute(&path).map_err(|source| LoggingError::Io {
                path: path.clone(),
                source,
            })?;
            Ok(LogTarget::File(absolute))
        }
        _ => Ok(LogTarget::File(config_dir.join(DEFAULT_LOG_FILE))),
    }
}

/// Open `path` for appending, creating it if needed.
pub fn open_log_file(path: &Path) -> Result<File, LoggingError> {
    OpenOptions::new()
        .create(true)
        .append(true)
        .open(path)
        .map_err(|source| LoggingError::Io {
            path: path.to_path_buf(),
            source,
        })
}

/// Initialize the global tracing subscriber.
///
/// Call once at startup; later calls leave the first subscriber in place.
///
/// # Arguments
///
/// * `level` - Filter directive used when `RUST_LOG` is unset.
/// * `target` - Output destination.
pub fn init_subscriber(level: &str, target: &LogTarget) -> Result<(), LoggingError> {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));

    match target {
        LogTarget::Stderr => {
            let subscriber = tracing_subscriber::fmt()
                .with_env_filter(filter)
                .with_target(true)
                .with_writer(std::io::stderr)
                .compact();
            let _ = subscriber.try_init();
        }
        LogTarget::File(path) => {
            let file = open_log_file(path)?;
            let subscriber = tracing_subscriber::fmt()
                .with_env_filter(filter)
                .with_target(true)
                .with_ansi(false)
                .with_writer(Mutex::new(file))
                .compact();
            let _ = subscriber.try_init();
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn no_flag_uses_config_dir() {
        let target = resolve_log_target(Path::new("/etc/notify"), None).unwrap();
        assert_eq!(
            target,
            LogTarget::File(PathBuf::from("/etc/notify/notification.log"))
        );
    }

    #[test]
    fn empty_flag_uses_config_dir() {
        let target = resolve_log_target(Path::new("/etc/notify"), Some("")).unwrap();
        assert_eq!(
            target,
            LogTarget::File(PathBuf::from("/etc/notify/notification.log"))
        );
    }

    #[test]
    fn dash_means_stderr() {
        let target = resolve_log_target(Path::new("/etc/notify"), Some("-")).unwrap();
        assert_eq!(target, LogTarget::Stderr);
    }

    #[test]
    fn relative_path_made_absolute() {
        let target = resolve_log_target(Path::new("/etc/notify"), Some("logs/n.log")).unwrap();
        let LogTarget::File(path) = target else {
            panic!("expected file target");
        };
        assert!(path.is_absolute());
        assert!(path.ends_with("logs/n.log"));
    }

    #[test]
    fn absolute_path_kept() {
        let target = resolve_log_target(Path::new("/etc/notify"), Some("/var/log/n.log")).unwrap();
        assert_eq!(target, LogTarget::File(PathBuf::from("/var/log/n.log")));
    }

    #[test]
    fn open_log_file_appends() {
        use std::io::Write;

        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join(DEFAULT_LOG_FILE);
        std::fs::write(&path, "first\n").unwrap();

        let mut file = open_log_file(&path).unwrap();
        file.write_all(b"second\n").unwrap();

        let content = std::fs::read_to_string(&path).unwrap();
        assert_eq!(content, "first\nsecond\n");
    }

    #[test]
    fn open_log_file_in_missing_dir_fails() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("missing").join(DEFAULT_LOG_FILE);
        let err = open_log_file(&path).unwrap_err();
        assert!(err.to_string().contains("failed to open log file"));
    }
}
