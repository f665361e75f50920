//! Tracing configuration and log routing.
//!
//! Run reports are printed on stdout, so log events go to stderr through a compact formatter.
//! Every event is also mirrored to a log file, which keeps retry warnings from a long batch
//! around after the terminal has scrolled past them.
use std::path::{Path, PathBuf};
use std::sync::OnceLock;

use tracing_appender::non_blocking::{NonBlocking, WorkerGuard};
use tracing_subscriber::{EnvFilter, fmt, prelude::*};

const LOG_FILE_VAR: &str = "RUSTYSUM_LOG_FILE";
const DEFAULT_LOG_DIR: &str = "logs";
const DEFAULT_LOG_FILE: &str = "rustysum.log";

static LOG_GUARD: OnceLock<WorkerGuard> = OnceLock::new();

/// Where mirrored log events are written.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LogTarget {
    /// Append to a file chosen through `RUSTYSUM_LOG_FILE`.
    Explicit(PathBuf),
    /// `logs/rustysum.log` relative to the working directory.
    Default,
}

impl LogTarget {
    /// Pick the log target from a key lookup. Blank values fall back to the default file.
    pub fn from_lookup<F>(lookup: F) -> Self
    where
        F: Fn(&str) -> Option<String>,
    {
        lookup(LOG_FILE_VAR)
            .map(|value| value.trim().to_string())
            .filter(|value| !value.is_empty())
            .map_or(Self::Default, |path| Self::Explicit(PathBuf::from(path)))
    }

    /// Path the file layer writes to.
    pub fn path(&self) -> PathBuf {
        match self {
            Self::Explicit(path) => path.clone(),
            Self::Default => Path::new(DEFAULT_LOG_DIR).join(DEFAULT_LOG_FILE),
        }
    }
}

/// Install the global subscriber: `RUST_LOG` filter (default `info`), stderr and file layers.
///
/// A file that cannot be opened only disables the file layer.
pub fn init_tracing() {
    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let stderr_layer = fmt::layer()
        .with_writer(std::io::stderr)
        .with_target(false)
        .compact();
    let target = LogTarget::from_lookup(|key| std::env::var(key).ok());
    let file_layer = open_file_writer(&target).map(|writer| {
        fmt::layer()
            .with_writer(writer)
            .with_target(true)
            .with_ansi(false)
            .compact()
    });

    tracing_subscriber::registry()
        .with(env_filter)
        .with(stderr_layer)
        .with(file_layer)
        .init();
}

fn open_file_writer(target: &LogTarget) -> Option<NonBlocking> {
    let path = target.path();
    if let Some(parent) = path.parent().filter(|dir| !dir.as_os_str().is_empty()) {
        if let Err(err) = std::fs::create_dir_all(parent) {
            eprintln!("Failed to create log directory {}: {err}", parent.display());
            return None;
        }
    }

    let file = match std::fs::OpenOptions::new()
        .create(true)
        .append(true)
        .open(&path)
    {
        Ok(file) => file,
        Err(err) => {
            eprintln!("Failed to open log file {}: {err}", path.display());
            return None;
        }
    };
    let (writer, guard) = tracing_appender::non_blocking(file);
    let _ = LOG_GUARD.set(guard);
    Some(writer)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn explicit_path_wins() {
        let lookup = |key: &str| (key == LOG_FILE_VAR).then(|| " /tmp/run.log ".to_string());
        let target = LogTarget::from_lookup(lookup);
        assert_eq!(target, LogTarget::Explicit(PathBuf::from("/tmp/run.log")));
        assert_eq!(target.path(), PathBuf::from("/tmp/run.log"));
    }

    #[test]
    fn missing_or_blank_falls_back_to_default() {
        assert_eq!(LogTarget::from_lookup(|_| None), LogTarget::Default);
        assert_eq!(
            LogTarget::from_lookup(|_| Some("  ".into())),
            LogTarget::Default
        );
        assert_eq!(
            LogTarget::Default.path(),
            Path::new("logs").join("rustysum.log")
        );
    }

    #[test]
    fn file_writer_creates_missing_directories() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("nested").join("run.log");
        assert!(open_file_writer(&LogTarget::Explicit(path.clone())).is_some());
        assert!(path.exists());
    }
}
