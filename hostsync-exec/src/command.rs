//! Host command and result types.

use std::fmt;
use std::time::Duration;

use crate::error::HostExecError;

/// A command to run on the host, with optional bytes for its stdin.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HostCommand {
    argv: Vec<String>,
    stdin: Option<Vec<u8>>,
}

impl HostCommand {
    pub fn new<I, S>(argv: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            argv: argv.into_iter().map(Into::into).collect(),
            stdin: None,
        }
    }

    /// Stream `bytes` into the command's stdin, then close it.
    pub fn with_stdin(mut self, bytes: Vec<u8>) -> Self {
        self.stdin = Some(bytes);
        self
    }

    pub fn argv(&self) -> &[String] {
        &self.argv
    }

    pub fn stdin(&self) -> Option<&[u8]> {
        self.stdin.as_deref()
    }

    pub fn program(&self) -> Option<&str> {
        self.argv.first().map(String::as_str)
    }
}

impl fmt::Display for HostCommand {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.argv.join(" "))
    }
}

/// How a host command ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HostExit {
    /// Normal exit with a status code.
    Code(i32),
    /// Terminated by a signal other than our own timeout kill.
    Signal(i32),
    /// Killed after exceeding the executor's per-command timeout.
    Timeout,
}

impl HostExit {
    pub fn success(&self) -> bool {
        matches!(self, HostExit::Code(0))
    }
}

impl fmt::Display for HostExit {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            HostExit::Code(code) => write!(f, "exit {code}"),
            HostExit::Signal(sig) => write!(f, "signal {sig}"),
            HostExit::Timeout => f.write_str("TIMEOUT"),
        }
    }
}

/// Result of a host command that was started.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HostOutput {
    pub exit: HostExit,
    pub stdout: Vec<u8>,
    pub stderr: Vec<u8>,
    pub duration: Duration,
}

impl HostOutput {
    pub fn success(&self) -> bool {
        self.exit.success()
    }

    pub fn stdout_lossy(&self) -> String {
        String::from_utf8_lossy(&self.stdout).into_owned()
    }

    pub fn stderr_trimmed(&self) -> String {
        String::from_utf8_lossy(&self.stderr).trim().to_owned()
    }

    /// Turn a non-success exit into [`HostExecError::Failed`].
    pub fn check(self, command: &HostCommand) -> Result<HostOutput, HostExecError> {
        if self.success() {
            Ok(self)
        } else {
            Err(HostExecError::Failed {
                command: command.to_string(),
                exit: self.exit,
                stderr: self.stderr_trimmed(),
            })
        }
    }
}
