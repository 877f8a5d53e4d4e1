//! Pass driver: the canonical sync entrypoint for `--once` and the periodic
//! loop.
//!
//! One pass = sync every item in declared order, then dispatch post-copy
//! actions for the targets that changed. All copies complete before any
//! action starts, so a restart triggered by one file never races the copy of
//! another file the same service reads.

use chrono::{DateTime, Utc};
use serde::Serialize;
use tokio::time::Instant;

use hostsync_core::{SyncPlan, TargetPath};
use hostsync_exec::HostExecutor;

use crate::dispatch::{self, DispatchReport};
use crate::engine::{self, ItemOutcome};

/// Aggregate result of one pass. Created and discarded per pass.
#[derive(Debug, Clone, Serialize)]
pub struct PassResult {
    pub started_at: DateTime<Utc>,
    pub duration_ms: u64,
    /// Targets replaced this pass, in item order.
    pub changed: Vec<TargetPath>,
    /// Targets whose sync failed, in item order.
    pub failed: Vec<TargetPath>,
    pub unchanged: usize,
    /// Targets not visited because shutdown was requested mid-pass.
    pub skipped: Vec<TargetPath>,
    /// Targets whose post-copy action sequence aborted.
    pub action_failures: Vec<TargetPath>,
    pub actions_run: usize,
    pub overall_ok: bool,
}

/// Run one full pass.
pub async fn run_pass(exec: &dyn HostExecutor, plan: &SyncPlan) -> PassResult {
    run_pass_until(exec, plan, || false).await
}

/// Run one pass, checking `cancelled` before each item.
///
/// Once cancelled, remaining items are skipped but actions for targets that
/// already changed still run: a host file is never left replaced without its
/// service actions, since the next pass would see it as up-to-date.
pub async fn run_pass_until<F>(exec: &dyn HostExecutor, plan: &SyncPlan, cancelled: F) -> PassResult
where
    F: Fn() -> bool,
{
    let started_at = Utc::now();
    let started = Instant::now();

    let mut outcomes = Vec::with_capacity(plan.items().len());
    let mut skipped = Vec::new();
    for item in plan.items() {
        if cancelled() {
            skipped.push(item.target_path.clone());
            continue;
        }
        outcomes.push(engine::sync_item(exec, item).await);
    }
    if !skipped.is_empty() {
        tracing::warn!(skipped = skipped.len(), "shutdown requested; remaining items skipped");
    }

    let mut changed = Vec::new();
    let mut failed = Vec::new();
    let mut unchanged = 0usize;
    for outcome in &outcomes {
        match outcome {
            ItemOutcome::Changed { target } => {
                tracing::info!(path = %target, "synced");
                changed.push(target.clone());
            }
            ItemOutcome::Unchanged { .. } => unchanged += 1,
            ItemOutcome::Failed { target, error } => {
                tracing::warn!(path = %target, error = %error, "sync failed");
                failed.push(target.clone());
            }
        }
    }

    let DispatchReport {
        commands_run,
        failed_targets,
        ..
    } = dispatch::dispatch(exec, &changed, plan.actions()).await;

    let overall_ok = failed.is_empty() && skipped.is_empty() && failed_targets.is_empty();
    let duration = started.elapsed();
    tracing::info!(
        changed = changed.len(),
        unchanged,
        failed = failed.len(),
        actions_run = commands_run,
        action_failures = failed_targets.len(),
        ok = overall_ok,
        duration_ms = duration.as_millis() as u64,
        "sync pass complete",
    );

    PassResult {
        started_at,
        duration_ms: duration.as_millis() as u64,
        changed,
        failed,
        unchanged,
        skipped,
        action_failures: failed_targets,
        actions_run: commands_run,
        overall_ok,
    }
}
