//! Host command execution across the container/host boundary.
//!
//! [`NsenterExecutor`] prepends a fixed prefix (by default `nsenter` targeting
//! PID 1 with the mount, PID and network namespaces) to every argv, so each
//! command runs against the host filesystem and service manager. Every
//! privileged side effect of the agent goes through [`HostExecutor`], which
//! keeps the boundary in one place and lets tests substitute a fake host.

use std::io::ErrorKind;
use std::os::unix::process::ExitStatusExt;
use std::process::{ExitStatus, Stdio};
use std::time::Duration;

use async_trait::async_trait;
use tokio::io::AsyncWriteExt;
use tokio::process::Command;
use tokio::time::Instant;

use crate::command::{HostCommand, HostExit, HostOutput};
use crate::error::HostExecError;

/// Per-command timeout when none is configured.
pub const DEFAULT_COMMAND_TIMEOUT: Duration = Duration::from_secs(60);

/// Enter the host's namespaces through PID 1, then exec the argv.
pub const NSENTER_PREFIX: &[&str] = &[
    "nsenter", "--target", "1", "--mount", "--pid", "--net", "--uts", "--ipc", "--",
];

/// Runs commands on the host and reports how they ended.
///
/// Callers block (await) until the command terminates or times out.
/// `Err` means the command could not be started or talked to; a command that
/// ran and failed is `Ok` with a non-success [`HostExit`].
#[async_trait]
pub trait HostExecutor: Send + Sync {
    async fn run_on_host(&self, command: &HostCommand) -> Result<HostOutput, HostExecError>;
}

/// Production executor: `prefix ++ argv` as a child process.
#[derive(Debug, Clone)]
pub struct NsenterExecutor {
    prefix: Vec<String>,
    timeout: Duration,
}

impl NsenterExecutor {
    pub fn new<I, S>(prefix: I, timeout: Duration) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            prefix: prefix.into_iter().map(Into::into).collect(),
            timeout,
        }
    }

    /// Run commands directly, without entering any namespace.
    pub fn local(timeout: Duration) -> Self {
        Self::new(Vec::<String>::new(), timeout)
    }

    pub fn prefix(&self) -> &[String] {
        &self.prefix
    }

    pub fn timeout(&self) -> Duration {
        self.timeout
    }
}

impl Default for NsenterExecutor {
    fn default() -> Self {
        Self::new(NSENTER_PREFIX.iter().copied(), DEFAULT_COMMAND_TIMEOUT)
    }
}

#[async_trait]
impl HostExecutor for NsenterExecutor {
    async fn run_on_host(&self, command: &HostCommand) -> Result<HostOutput, HostExecError> {
        if command.argv().is_empty() {
            return Err(HostExecError::EmptyCommand);
        }
        let mut argv = self.prefix.iter().chain(command.argv());
        let Some(program) = argv.next() else {
            return Err(HostExecError::EmptyCommand);
        };

        let mut child_cmd = Command::new(program);
        child_cmd
            .args(argv)
            .stdin(if command.stdin().is_some() {
                Stdio::piped()
            } else {
                Stdio::null()
            })
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);

        let started = Instant::now();
        let mut child = child_cmd.spawn().map_err(|source| HostExecError::Spawn {
            program: program.clone(),
            source,
        })?;

        let stdin_pipe = child.stdin.take();
        let payload = command.stdin().map(<[u8]>::to_vec);
        let feed = async move {
            if let (Some(mut pipe), Some(bytes)) = (stdin_pipe, payload) {
                pipe.write_all(&bytes).await?;
                pipe.shutdown().await?;
            }
            Ok::<(), std::io::Error>(())
        };

        // The child is owned by this future; dropping it on timeout kills it.
        let run = async move {
            let (fed, output) = tokio::join!(feed, child.wait_with_output());
            (fed, output)
        };

        let (fed, output) = match tokio::time::timeout(self.timeout, run).await {
            Ok(done) => done,
            Err(_) => {
                let duration = started.elapsed();
                tracing::warn!(
                    command = %command,
                    timeout_s = self.timeout.as_secs_f64(),
                    "host command timed out and was killed",
                );
                return Ok(HostOutput {
                    exit: HostExit::Timeout,
                    stdout: Vec::new(),
                    stderr: Vec::new(),
                    duration,
                });
            }
        };

        let output = output.map_err(|source| HostExecError::Io {
            program: program.clone(),
            source,
        })?;
        let exit = exit_of(output.status);

        // A child that exits before draining stdin shows up as EPIPE; its
        // exit status is the more useful report.
        if let Err(source) = fed {
            if source.kind() != ErrorKind::BrokenPipe && exit.success() {
                return Err(HostExecError::Io {
                    program: program.clone(),
                    source,
                });
            }
        }

        let duration = started.elapsed();
        tracing::debug!(
            command = %command,
            exit = %exit,
            duration_ms = duration.as_millis() as u64,
            "host command finished",
        );
        Ok(HostOutput {
            exit,
            stdout: output.stdout,
            stderr: output.stderr,
            duration,
        })
    }
}

fn exit_of(status: ExitStatus) -> HostExit {
    match (status.code(), status.signal()) {
        (Some(code), _) => HostExit::Code(code),
        (None, Some(signal)) => HostExit::Signal(signal),
        (None, None) => HostExit::Code(-1),
    }
}
