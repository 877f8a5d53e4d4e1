//! Error types for hostsync-sync.

use std::path::PathBuf;

use thiserror::Error;

use hostsync_exec::HostExecError;

/// Why a single item or action failed within a pass.
///
/// Recorded per item or per command and logged; never fatal to the process.
#[derive(Debug, Error)]
pub enum SyncError {
    /// The container-side source could not be read. The host is untouched.
    #[error("cannot read source {path}: {source}")]
    SourceRead {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// A host-side copy step failed.
    #[error("{step} failed for {target}: {source}")]
    Copy {
        step: &'static str,
        target: PathBuf,
        #[source]
        source: HostExecError,
    },

    /// The host copy did not hash to the source digest after the rename.
    #[error("post-copy digest mismatch for {target}: host {actual} vs source {expected}")]
    VerifyMismatch {
        target: PathBuf,
        expected: String,
        actual: String,
    },

    /// A post-copy action returned a non-success status.
    #[error("post-copy action `{command}` failed for {target}: {source}")]
    Action {
        target: PathBuf,
        command: String,
        #[source]
        source: HostExecError,
    },
}

/// Convenience constructor for [`SyncError::Copy`].
pub(crate) fn copy_err(
    step: &'static str,
    target: impl Into<PathBuf>,
    source: HostExecError,
) -> SyncError {
    SyncError::Copy {
        step,
        target: target.into(),
        source,
    }
}
