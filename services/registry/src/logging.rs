//! Tracing setup for the registry binary.
//!
//! JSON lines go to `IMGREG_LOG_FILE` when it is set, stdout otherwise.

use std::fs::{self, File, OpenOptions};
use std::io;
use std::path::Path;

use anyhow::{Context, Result};
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::{
    fmt::writer::BoxMakeWriter, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter,
};

use crate::config::Config;

/// Open the log file for appending, creating parent directories.
pub fn open_log_file(path: &Path) -> io::Result<File> {
    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() {
            fs::create_dir_all(parent)?;
        }
    }
    OpenOptions::new().create(true).append(true).open(path)
}

/// Writer for the configured destination.
///
/// The returned guard flushes buffered lines on drop and must be held
/// for the life of the process.
pub fn make_writer(log_file: Option<&Path>) -> Result<(BoxMakeWriter, Option<WorkerGuard>)> {
    match log_file {
        Some(path) => {
            let file = open_log_file(path)
                .with_context(|| format!("failed to open log file {}", path.display()))?;
            let (non_blocking, guard) = tracing_appender::non_blocking(file);
            Ok((BoxMakeWriter::new(non_blocking), Some(guard)))
        }
        None => Ok((BoxMakeWriter::new(io::stdout), None)),
    }
}

/// Install the global subscriber (prefer RUST_LOG, fallback to IMGREG_LOG_LEVEL).
pub fn init(config: &Config) -> Result<Option<WorkerGuard>> {
    let (writer, guard) = make_writer(config.log_file.as_deref())?;

    tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| config.log_level.clone().into()))
        .with(tracing_subscriber::fmt::layer().json().with_writer(writer))
        .init();

    Ok(guard)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;
    use tracing_subscriber::Registry;

    #[test]
    fn test_open_log_file_creates_parents_and_appends() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("logs/nested/registry.log");

        {
            use std::io::Write;
            writeln!(open_log_file(&path).unwrap(), "first").unwrap();
            writeln!(open_log_file(&path).unwrap(), "second").unwrap();
        }

        assert_eq!(fs::read_to_string(&path).unwrap(), "first\nsecond\n");
    }

    #[test]
    fn test_events_land_in_log_file_as_json() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("registry.log");

        let (writer, guard) = make_writer(Some(&path)).unwrap();
        let subscriber =
            Registry::default().with(tracing_subscriber::fmt::layer().json().with_writer(writer));
        tracing::subscriber::with_default(subscriber, || {
            tracing::info!(uuid = "u1", "Image created");
        });
        drop(guard);

        let content = fs::read_to_string(&path).unwrap();
        let line: serde_json::Value = serde_json::from_str(content.lines().next().unwrap()).unwrap();
        assert_eq!(line["fields"]["message"], "Image created");
        assert_eq!(line["fields"]["uuid"], "u1");
    }

    #[test]
    fn test_stdout_when_unset() {
        let (_writer, guard) = make_writer(None).unwrap();
        assert!(guard.is_none());
    }

    #[test]
    fn test_unopenable_log_file_is_an_error() {
        let dir = TempDir::new().unwrap();
        let blocker = dir.path().join("blocker");
        fs::write(&blocker, b"").unwrap();

        assert!(make_writer(Some(&blocker.join("registry.log"))).is_err());
    }
}
