use std::time::Duration;

use tokio::signal::unix::{signal, SignalKind};
use tokio::sync::watch;
use tokio::task::JoinHandle;

use hostsync_core::{SyncPlan, NOTICE};
use hostsync_exec::HostExecutor;
use hostsync_sync::{run_pass_until, PassResult};

use crate::error::DaemonError;

/// How the agent should drive passes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RunOptions {
    /// Run exactly one pass and return its result.
    pub once: bool,
    /// Pause between passes in periodic mode.
    pub interval: Duration,
}

#[derive(Debug)]
pub enum RunOutcome {
    /// `--once`: the single pass that ran.
    Once(PassResult),
    /// Periodic mode ended on a shutdown request.
    Stopped { passes: u64 },
}

impl RunOutcome {
    /// Process exit code: `--once` reports the pass, periodic mode always 0.
    pub fn exit_code(&self) -> u8 {
        match self {
            RunOutcome::Once(result) if result.overall_ok => 0,
            RunOutcome::Once(_) => 1,
            RunOutcome::Stopped { .. } => 0,
        }
    }
}

/// Shutdown flag shared by the signal listener and the loop.
pub fn shutdown_channel() -> (watch::Sender<bool>, watch::Receiver<bool>) {
    watch::channel(false)
}

/// Flip the shutdown flag on the first SIGTERM or SIGINT.
///
/// Must be called from inside the runtime.
pub fn listen_for_signals(shutdown: watch::Sender<bool>) -> Result<JoinHandle<()>, DaemonError> {
    let mut term = signal(SignalKind::terminate()).map_err(|source| DaemonError::Signal {
        signal: "SIGTERM",
        source,
    })?;
    let mut int = signal(SignalKind::interrupt()).map_err(|source| DaemonError::Signal {
        signal: "SIGINT",
        source,
    })?;

    Ok(tokio::spawn(async move {
        let name = tokio::select! {
            _ = term.recv() => "SIGTERM",
            _ = int.recv() => "SIGINT",
        };
        tracing::info!(target: NOTICE, signal = name, "shutdown requested");
        let _ = shutdown.send(true);
    }))
}

/// Drive passes until done.
///
/// The flag is checked before every item and wakes the idle sleep. An
/// in-flight host command is never interrupted; it finishes under its own
/// timeout. A dropped sender counts as a shutdown request.
pub async fn run(
    exec: &dyn HostExecutor,
    plan: &SyncPlan,
    opts: RunOptions,
    mut shutdown: watch::Receiver<bool>,
) -> RunOutcome {
    if opts.once {
        let result = run_pass_until(exec, plan, || *shutdown.borrow()).await;
        return RunOutcome::Once(result);
    }

    tracing::info!(
        target: NOTICE,
        interval_secs = opts.interval.as_secs(),
        items = plan.items().len(),
        "sync loop started",
    );

    let mut passes = 0u64;
    loop {
        if *shutdown.borrow() {
            break;
        }
        let result = run_pass_until(exec, plan, || *shutdown.borrow()).await;
        passes += 1;
        if !result.overall_ok {
            tracing::warn!(pass = passes, "pass finished with failures; retrying next interval");
        }

        tokio::select! {
            _ = tokio::time::sleep(opts.interval) => {}
            changed = shutdown.changed() => {
                if changed.is_err() || *shutdown.borrow() {
                    break;
                }
            }
        }
    }

    tracing::info!(target: NOTICE, passes, "sync loop stopped");
    RunOutcome::Stopped { passes }
}

/// Build a single-threaded runtime, listen for signals and run to completion.
pub fn start_blocking(
    exec: &dyn HostExecutor,
    plan: &SyncPlan,
    opts: RunOptions,
) -> Result<RunOutcome, DaemonError> {
    let runtime = tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()
        .map_err(DaemonError::Runtime)?;

    runtime.block_on(async {
        let (tx, rx) = shutdown_channel();
        let listener = listen_for_signals(tx)?;
        let outcome = run(exec, plan, opts, rx).await;
        listener.abort();
        Ok(outcome)
    })
}
