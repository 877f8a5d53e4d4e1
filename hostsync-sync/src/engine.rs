//! Per-item sync transaction.
//!
//! ## `sync_item`: compare, copy, verify
//!
//! 1. Read the container source and SHA-256 it.
//! 2. Probe the host target (digest + mode/owner) and classify staleness.
//! 3. If stale: `mkdir -p` the target directory, unlink any temp left by a
//!    previous run, stream the bytes into `<dir>/.<name>.hostsync.tmp`,
//!    chmod + chown the temp, then rename it over the target.
//! 4. Re-hash the target on the host and compare with the source digest.
//!
//! Any failure after the temp exists deletes it again. `Changed` is only
//! reported once the rename and verification have succeeded.

use std::os::unix::fs::PermissionsExt;

use hostsync_core::{SyncItem, TargetPath};
use hostsync_exec::{HostCommand, HostExecutor, HostOutput};

use crate::error::{copy_err, SyncError};
use crate::host_ops;
use crate::staleness::{self, sha256_hex, Desired};

/// Outcome of syncing a single item.
#[derive(Debug)]
pub enum ItemOutcome {
    /// Host copy already matched content, mode and ownership.
    Unchanged { target: TargetPath },
    /// Host copy was replaced and verified.
    Changed { target: TargetPath },
    /// Something went wrong; the previous host copy (if any) is intact.
    Failed { target: TargetPath, error: SyncError },
}

impl ItemOutcome {
    pub fn target(&self) -> &TargetPath {
        match self {
            ItemOutcome::Unchanged { target }
            | ItemOutcome::Changed { target }
            | ItemOutcome::Failed { target, .. } => target,
        }
    }

    pub fn is_changed(&self) -> bool {
        matches!(self, ItemOutcome::Changed { .. })
    }

    pub fn is_failed(&self) -> bool {
        matches!(self, ItemOutcome::Failed { .. })
    }
}

/// Bring one host target in line with its container source.
pub async fn sync_item(exec: &dyn HostExecutor, item: &SyncItem) -> ItemOutcome {
    let target = item.target_path.clone();
    match try_sync_item(exec, item).await {
        Ok(true) => ItemOutcome::Changed { target },
        Ok(false) => ItemOutcome::Unchanged { target },
        Err(error) => ItemOutcome::Failed { target, error },
    }
}

async fn try_sync_item(exec: &dyn HostExecutor, item: &SyncItem) -> Result<bool, SyncError> {
    let source = &item.source_path;
    let read_err = |e: std::io::Error| SyncError::SourceRead {
        path: source.clone(),
        source: e,
    };
    let bytes = tokio::fs::read(source).await.map_err(read_err)?;
    let mode = match item.mode {
        Some(mode) => mode,
        None => {
            let meta = tokio::fs::metadata(source).await.map_err(read_err)?;
            meta.permissions().mode() & 0o7777
        }
    };

    let digest = sha256_hex(&bytes);
    let desired = Desired {
        digest: &digest,
        mode,
        owner: item.desired_owner(),
        group: item.desired_group(),
    };

    let host = staleness::inspect(exec, &item.target_path).await;
    let signal = staleness::check(&host, &desired);
    if !signal.is_stale() {
        tracing::debug!(path = %item.target_path, sha256 = %digest, "up-to-date");
        return Ok(false);
    }

    tracing::info!(
        path = %item.target_path,
        source_sha256 = %digest,
        host_sha256 = host.digest.as_deref().unwrap_or("missing"),
        reason = %signal,
        "target stale, updating",
    );

    copy_to_host(exec, item, bytes, &desired).await?;
    verify(exec, &item.target_path, &digest).await?;
    Ok(true)
}

/// Run one copy step; a non-success exit becomes a [`SyncError::Copy`].
async fn run_step(
    exec: &dyn HostExecutor,
    step: &'static str,
    target: &TargetPath,
    command: HostCommand,
) -> Result<HostOutput, SyncError> {
    let output = exec
        .run_on_host(&command)
        .await
        .map_err(|e| copy_err(step, target.as_path(), e))?;
    output
        .check(&command)
        .map_err(|e| copy_err(step, target.as_path(), e))
}

async fn copy_to_host(
    exec: &dyn HostExecutor,
    item: &SyncItem,
    bytes: Vec<u8>,
    desired: &Desired<'_>,
) -> Result<(), SyncError> {
    let target = &item.target_path;
    let tmp = target.temp_path();

    run_step(exec, "mkdir", target, host_ops::make_dir(&target.parent_dir())).await?;
    run_step(exec, "remove stale temp", target, host_ops::remove(&tmp)).await?;

    let staged = async {
        run_step(exec, "write temp", target, host_ops::write_stream(&tmp, bytes)).await?;
        run_step(exec, "chmod", target, host_ops::set_mode(&tmp, desired.mode)).await?;
        run_step(
            exec,
            "chown",
            target,
            host_ops::set_owner(&tmp, desired.owner, desired.group),
        )
        .await?;
        run_step(exec, "rename", target, host_ops::rename(&tmp, target.as_path())).await?;
        Ok::<(), SyncError>(())
    }
    .await;

    if let Err(err) = staged {
        match exec.run_on_host(&host_ops::remove(&tmp)).await {
            Ok(out) if out.success() => {}
            Ok(out) => tracing::warn!(
                temp = %tmp.display(),
                exit = %out.exit,
                "could not remove temp file; next pass will retry",
            ),
            Err(cleanup) => tracing::warn!(
                temp = %tmp.display(),
                error = %cleanup,
                "could not remove temp file; next pass will retry",
            ),
        }
        return Err(err);
    }
    Ok(())
}

/// Re-hash the target after the rename.
///
/// The new bytes are already in place once the rename succeeded, so a re-hash
/// that cannot run or answer only warns and the item still counts as
/// changed. Only a digest that reads back different fails the item; the next
/// pass sees that as drift and copies again.
async fn verify(exec: &dyn HostExecutor, target: &TargetPath, expected: &str) -> Result<(), SyncError> {
    let command = host_ops::fingerprint(target.as_path());
    let actual = match exec.run_on_host(&command).await {
        Ok(output) if output.success() => {
            let parsed = host_ops::parse_fingerprint(&output.stdout_lossy());
            if parsed.is_none() {
                tracing::warn!(path = %target, "post-copy digest unreadable; keeping the update");
            }
            parsed
        }
        Ok(output) => {
            tracing::warn!(
                path = %target,
                exit = %output.exit,
                stderr = %output.stderr_trimmed(),
                "post-copy digest unavailable; keeping the update",
            );
            None
        }
        Err(err) => {
            tracing::warn!(path = %target, error = %err, "post-copy digest failed to run; keeping the update");
            None
        }
    };
    let Some(actual) = actual else {
        return Ok(());
    };
    if actual != expected {
        return Err(SyncError::VerifyMismatch {
            target: target.0.clone(),
            expected: expected.to_owned(),
            actual,
        });
    }
    tracing::debug!(path = %target, sha256 = %actual, "post-copy digest verified");
    Ok(())
}
