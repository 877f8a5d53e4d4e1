//! Error types for hostsync-core.

use std::path::PathBuf;

use thiserror::Error;

/// Startup configuration failures. Every variant is fatal (exit code 2).
#[derive(Debug, Error)]
pub enum ConfigError {
    /// A compile-time source path is absent or not a regular file.
    #[error("sync source missing or not a regular file: {path}")]
    MissingSource { path: PathBuf },

    /// Could not stat a source path for a reason other than absence.
    #[error("I/O error at {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// Two sync items write the same host path.
    #[error("duplicate sync target: {target}")]
    DuplicateTarget { target: PathBuf },

    /// An action map key names no sync item target.
    #[error("post-copy actions registered for unknown target: {target}")]
    OrphanActions { target: PathBuf },

    /// A command-line value failed validation.
    #[error("invalid argument: {0}")]
    InvalidArgument(String),
}

pub(crate) fn io_err(path: impl Into<PathBuf>, source: std::io::Error) -> ConfigError {
    ConfigError::Io {
        path: path.into(),
        source,
    }
}
