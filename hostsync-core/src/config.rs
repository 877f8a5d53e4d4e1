//! Startup configuration assembly.
//!
//! The sync plan is built exactly once from three inputs:
//!
//! 1. compile-time constants ([`builtin_plan`]): the item list and the
//!    post-copy action map;
//! 2. the `IS_V1_ENABLED` environment variable, which only selects the
//!    launcher script source;
//! 3. command-line options carried in [`AssembleOptions`].
//!
//! Assembly fails fast with a [`ConfigError`] when a source is missing, so
//! post-copy actions never run against a host left half-updated.

use std::collections::HashSet;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::error::{io_err, ConfigError};
use crate::types::{ActionMap, SyncItem, TargetPath};
use crate::NOTICE;

/// Environment variable selecting the v1 launcher script.
pub const V1_ENABLED_ENV: &str = "IS_V1_ENABLED";

/// Default pause between passes in periodic mode.
pub const DEFAULT_SYNC_INTERVAL: Duration = Duration::from_secs(900);

/// Directory in the container image holding the authoritative copies.
pub const SCRIPTS_DIR: &str = "/usr/share/sonic/systemd_scripts";

pub const HOST_LAUNCHER: &str = "/usr/bin/restapi.sh";
pub const HOST_SERVICE_UNIT: &str = "/lib/systemd/system/restapi.service";
pub const HOST_CONTAINER_CHECKER: &str = "/bin/container_checker";
pub const HOST_WATCHDOG: &str = "/usr/local/bin/restapi_watchdog.sh";

/// Immutable sync plan: ordered items plus their post-copy actions.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SyncPlan {
    items: Vec<SyncItem>,
    actions: ActionMap,
}

impl SyncPlan {
    pub fn new(items: Vec<SyncItem>, actions: ActionMap) -> Self {
        Self { items, actions }
    }

    pub fn items(&self) -> &[SyncItem] {
        &self.items
    }

    pub fn actions(&self) -> &ActionMap {
        &self.actions
    }

    /// Drop every post-copy action (`--no-post-actions`).
    ///
    /// Consumes the plan so it can only happen before the first pass.
    pub fn without_post_actions(mut self) -> Self {
        self.actions.clear();
        self
    }

    /// Resolve every source path under `root` instead of `/`.
    pub fn rerooted(mut self, root: &Path) -> Self {
        if root == Path::new("/") {
            return self;
        }
        for item in &mut self.items {
            let relative = item
                .source_path
                .strip_prefix("/")
                .unwrap_or(&item.source_path)
                .to_path_buf();
            item.source_path = root.join(relative);
        }
        self
    }
}

/// Inputs for [`assemble`] that come from the environment and CLI.
#[derive(Debug, Clone)]
pub struct AssembleOptions {
    pub v1_enabled: bool,
    pub source_root: PathBuf,
    pub post_actions: bool,
}

impl Default for AssembleOptions {
    fn default() -> Self {
        Self {
            v1_enabled: false,
            source_root: PathBuf::from("/"),
            post_actions: true,
        }
    }
}

// ---------------------------------------------------------------------------
// Environment
// ---------------------------------------------------------------------------

/// Interpret a boolean environment value.
///
/// `1 true yes y on` are true (case-insensitive). Unset, empty and
/// `0 false no n off` are false. Anything else is false with a warning.
pub fn parse_bool_flag(raw: Option<&str>) -> bool {
    let Some(raw) = raw else {
        return false;
    };
    match raw.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "y" | "on" => true,
        "" | "0" | "false" | "no" | "n" | "off" => false,
        other => {
            tracing::warn!(value = other, "unrecognized boolean value, treating as false");
            false
        }
    }
}

/// Read [`V1_ENABLED_ENV`] from the process environment.
pub fn v1_enabled_from_env() -> bool {
    parse_bool_flag(std::env::var(V1_ENABLED_ENV).ok().as_deref())
}

// ---------------------------------------------------------------------------
// Compile-time plan
// ---------------------------------------------------------------------------

/// Container-side launcher script for the selected variant.
pub fn launcher_source(v1_enabled: bool) -> PathBuf {
    let name = if v1_enabled {
        "restapi_v1.sh"
    } else {
        "restapi.sh"
    };
    Path::new(SCRIPTS_DIR).join(name)
}

/// The fixed item list and action map shipped with the sidecar.
pub fn builtin_plan(v1_enabled: bool) -> SyncPlan {
    let scripts = Path::new(SCRIPTS_DIR);
    let items = vec![
        SyncItem::new(launcher_source(v1_enabled), HOST_LAUNCHER).with_mode(0o755),
        SyncItem::new(scripts.join("restapi.service"), HOST_SERVICE_UNIT).with_mode(0o644),
        SyncItem::new(scripts.join("container_checker"), HOST_CONTAINER_CHECKER).with_mode(0o755),
        SyncItem::new(scripts.join("restapi_watchdog.sh"), HOST_WATCHDOG).with_mode(0o755),
    ];

    let mut actions = ActionMap::new();
    actions.insert(
        HOST_LAUNCHER,
        [
            ["docker", "stop", "restapi"].as_slice(),
            ["docker", "rm", "restapi"].as_slice(),
            ["systemctl", "daemon-reload"].as_slice(),
            ["systemctl", "restart", "restapi"].as_slice(),
        ],
    );
    actions.insert(
        HOST_SERVICE_UNIT,
        [
            ["systemctl", "daemon-reload"].as_slice(),
            ["systemctl", "restart", "restapi"].as_slice(),
        ],
    );
    actions.insert(
        HOST_CONTAINER_CHECKER,
        [
            ["systemctl", "daemon-reload"].as_slice(),
            ["systemctl", "restart", "monit"].as_slice(),
        ],
    );
    actions.insert(HOST_WATCHDOG, [["systemctl", "restart", "restapi-watchdog"]]);

    SyncPlan::new(items, actions)
}

// ---------------------------------------------------------------------------
// Validation
// ---------------------------------------------------------------------------

/// Reject duplicate targets and action keys that name no item.
pub fn validate(plan: &SyncPlan) -> Result<(), ConfigError> {
    let mut targets: HashSet<&TargetPath> = HashSet::new();
    for item in plan.items() {
        if !targets.insert(&item.target_path) {
            return Err(ConfigError::DuplicateTarget {
                target: item.target_path.0.clone(),
            });
        }
    }

    let mut orphans: Vec<&TargetPath> = plan
        .actions()
        .targets()
        .filter(|t| !targets.contains(t))
        .collect();
    orphans.sort();
    if let Some(orphan) = orphans.first() {
        return Err(ConfigError::OrphanActions {
            target: orphan.0.clone(),
        });
    }
    Ok(())
}

/// Every source must exist as a regular file.
pub fn verify_sources(plan: &SyncPlan) -> Result<(), ConfigError> {
    for item in plan.items() {
        let path = &item.source_path;
        match std::fs::metadata(path) {
            Ok(meta) if meta.is_file() => {}
            Ok(_) => return Err(ConfigError::MissingSource { path: path.clone() }),
            Err(err) if err.kind() == ErrorKind::NotFound => {
                return Err(ConfigError::MissingSource { path: path.clone() });
            }
            Err(err) => return Err(io_err(path, err)),
        }
    }
    Ok(())
}

/// Build, re-root, validate and verify the plan.
pub fn assemble(opts: &AssembleOptions) -> Result<SyncPlan, ConfigError> {
    if !opts.source_root.is_dir() {
        return Err(ConfigError::InvalidArgument(format!(
            "source root {} is not a directory",
            opts.source_root.display()
        )));
    }
    let plan = builtin_plan(opts.v1_enabled).rerooted(&opts.source_root);

    let launcher = plan
        .items()
        .first()
        .map(|item| item.source_path.display().to_string())
        .unwrap_or_default();
    tracing::info!(
        target: NOTICE,
        v1_enabled = opts.v1_enabled,
        launcher_source = %launcher,
        "{}={}; launcher source set to {}",
        V1_ENABLED_ENV,
        opts.v1_enabled,
        launcher,
    );

    validate(&plan)?;
    verify_sources(&plan)?;

    if opts.post_actions {
        Ok(plan)
    } else {
        tracing::info!(target: NOTICE, "post-copy host actions disabled for this run");
        Ok(plan.without_post_actions())
    }
}
