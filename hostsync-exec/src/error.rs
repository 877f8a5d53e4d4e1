use thiserror::Error;

use crate::command::HostExit;

/// Failure of a single host command. Never fatal to the process.
#[derive(Debug, Error)]
pub enum HostExecError {
    #[error("empty host command")]
    EmptyCommand,

    /// The namespace-entry program (or the command itself, with an empty
    /// prefix) could not be started.
    #[error("failed to spawn `{program}`: {source}")]
    Spawn {
        program: String,
        #[source]
        source: std::io::Error,
    },

    #[error("I/O error talking to `{program}`: {source}")]
    Io {
        program: String,
        #[source]
        source: std::io::Error,
    },

    /// The command ran but did not succeed (non-zero exit, signal, timeout).
    #[error("`{command}` failed ({exit}): {stderr}")]
    Failed {
        command: String,
        exit: HostExit,
        stderr: String,
    },
}
