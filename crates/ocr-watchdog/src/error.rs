//! Error types for the OCR watchdog

use std::path::{Path, PathBuf};
use thiserror::Error;

/// Result type alias for watchdog operations
pub type Result<T> = std::result::Result<T, Error>;

/// Watchdog errors
///
/// Only [`Error::Config`] and [`Error::Watch`] are fatal; everything else is
/// terminal for a single job and gets logged by the worker that hit it.
#[derive(Debug, Error)]
pub enum Error {
    /// Configuration error (missing directory, bad value)
    #[error("Configuration error: {0}")]
    Config(String),

    /// The directory watcher could not be created or attached
    #[error("Failed to watch '{}': {source}", path.display())]
    Watch {
        path: PathBuf,
        #[source]
        source: notify::Error,
    },

    /// Source file could not be statted
    #[error("Failed to stat '{}': {source}", path.display())]
    Stat {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// Temp-file creation or the staging move failed
    #[error("Failed to stage '{}' as '{}': {source}", source_path.display(), target.display())]
    Staging {
        source_path: PathBuf,
        target: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// External OCR tool failed to start or exited non-zero
    #[error("OCR of '{}' failed: {message}", path.display())]
    Conversion { path: PathBuf, message: String },

    /// Failed directory could not be created or the file could not be moved into it
    #[error("Failed directory error for '{}': {source}", path.display())]
    FailedDirectory {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// Rename, chown or chmod after a successful conversion failed
    #[error("Failed to finalize '{}' ({step}): {source}", path.display())]
    Finalization {
        path: PathBuf,
        step: &'static str,
        #[source]
        source: std::io::Error,
    },

    /// A blocking task panicked or was cancelled
    #[error("Internal error: {0}")]
    Internal(String),

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// TOML config parse error
    #[error("Config parse error: {0}")]
    TomlParse(#[from] toml::de::Error),
}

impl Error {
    /// Create a configuration error
    pub fn config(message: impl Into<String>) -> Self {
        Self::Config(message.into())
    }

    /// Create a stat error
    pub fn stat(path: &Path, source: std::io::Error) -> Self {
        Self::Stat {
            path: path.to_path_buf(),
            source,
        }
    }

    /// Create a staging error
    pub fn staging(source_path: &Path, target: &Path, source: std::io::Error) -> Self {
        Self::Staging {
            source_path: source_path.to_path_buf(),
            target: target.to_path_buf(),
            source,
        }
    }

    /// Create a conversion error
    pub fn conversion(path: &Path, message: impl Into<String>) -> Self {
        Self::Conversion {
            path: path.to_path_buf(),
            message: message.into(),
        }
    }

    /// Create a failed-directory error
    pub fn failed_directory(path: &Path, source: std::io::Error) -> Self {
        Self::FailedDirectory {
            path: path.to_path_buf(),
            source,
        }
    }

    /// Create a finalization error
    pub fn finalization(path: &Path, step: &'static str, source: std::io::Error) -> Self {
        Self::Finalization {
            path: path.to_path_buf(),
            step,
            source,
        }
    }

    /// Create an error for a failed blocking task
    pub fn join(source: tokio::task::JoinError) -> Self {
        Self::Internal(format!("Task join error: {}", source))
    }

    /// Whether this error should stop the process instead of a single job
    pub fn is_fatal(&self) -> bool {
        matches!(self, Error::Config(_) | Error::Watch { .. })
    }
}
