//! Post-copy action dispatcher.
//!
//! Targets are visited in the order given (sync-list order). Within a target
//! commands run strictly one after another; the first failure skips the rest
//! of that target's commands, and the next target still runs. Nothing is
//! retried within a pass.

use hostsync_core::{ActionMap, TargetPath};
use hostsync_exec::{HostCommand, HostExecutor};

use crate::error::SyncError;

/// What the dispatcher did during one pass.
#[derive(Debug, Default)]
pub struct DispatchReport {
    /// Number of host commands started.
    pub commands_run: usize,
    /// Targets whose action sequence was cut short, in visit order.
    pub failed_targets: Vec<TargetPath>,
    pub errors: Vec<SyncError>,
}

impl DispatchReport {
    pub fn all_ok(&self) -> bool {
        self.failed_targets.is_empty()
    }
}

/// Run the registered actions for every target in `changed`.
pub async fn dispatch(
    exec: &dyn HostExecutor,
    changed: &[TargetPath],
    actions: &ActionMap,
) -> DispatchReport {
    let mut report = DispatchReport::default();

    for target in changed {
        for action in actions.commands_for(target) {
            let command = HostCommand::new(action.argv().iter().cloned());
            report.commands_run += 1;

            let result = match exec.run_on_host(&command).await {
                Ok(output) => output.check(&command),
                Err(err) => Err(err),
            };
            match result {
                Ok(_) => {
                    tracing::info!(path = %target, command = %action, "post-copy action succeeded");
                }
                Err(source) => {
                    tracing::error!(
                        path = %target,
                        command = %action,
                        error = %source,
                        "post-copy action failed; skipping remaining actions for target",
                    );
                    report.failed_targets.push(target.clone());
                    report.errors.push(SyncError::Action {
                        target: target.0.clone(),
                        command: action.to_string(),
                        source,
                    });
                    break;
                }
            }
        }
    }

    report
}
