//! Domain types for the sync plan.
//!
//! All path fields use `PathBuf`; host-side paths are wrapped in
//! [`TargetPath`] so they cannot be confused with container-side sources.

use std::collections::HashMap;
use std::fmt;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

/// Owner and group applied to host files when an item does not name one.
pub const DEFAULT_OWNER: &str = "root";
pub const DEFAULT_GROUP: &str = "root";

// ---------------------------------------------------------------------------
// Newtypes
// ---------------------------------------------------------------------------

/// An absolute path on the host filesystem.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct TargetPath(pub PathBuf);

impl TargetPath {
    pub fn as_path(&self) -> &Path {
        &self.0
    }

    /// Directory that must exist on the host before the target can be written.
    pub fn parent_dir(&self) -> PathBuf {
        match self.0.parent() {
            Some(parent) if !parent.as_os_str().is_empty() => parent.to_path_buf(),
            _ => PathBuf::from("/"),
        }
    }

    /// Deterministic sibling temp path: `<dir>/.<name>.hostsync.tmp`.
    ///
    /// Same directory as the target so the final rename stays on one
    /// filesystem. Being deterministic lets a later run unlink a temp left
    /// behind by a killed one.
    pub fn temp_path(&self) -> PathBuf {
        let name = self
            .0
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default();
        self.parent_dir().join(format!(".{name}.hostsync.tmp"))
    }
}

impl fmt::Display for TargetPath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.display().fmt(f)
    }
}

impl From<PathBuf> for TargetPath {
    fn from(p: PathBuf) -> Self {
        Self(p)
    }
}

impl From<&str> for TargetPath {
    fn from(s: &str) -> Self {
        Self(PathBuf::from(s))
    }
}

/// One host command: program followed by its arguments.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ActionCommand(pub Vec<String>);

impl ActionCommand {
    pub fn argv(&self) -> &[String] {
        &self.0
    }
}

impl fmt::Display for ActionCommand {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0.join(" "))
    }
}

impl From<&[&str]> for ActionCommand {
    fn from(tokens: &[&str]) -> Self {
        Self(tokens.iter().map(|t| (*t).to_owned()).collect())
    }
}

impl<const N: usize> From<[&str; N]> for ActionCommand {
    fn from(tokens: [&str; N]) -> Self {
        Self(tokens.iter().map(|t| (*t).to_owned()).collect())
    }
}

// ---------------------------------------------------------------------------
// Sync item
// ---------------------------------------------------------------------------

/// One file kept in sync from the container image onto the host.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SyncItem {
    /// Absolute path inside the container filesystem.
    pub source_path: PathBuf,
    /// Absolute path on the host filesystem.
    pub target_path: TargetPath,
    /// Permission bits for the host copy; `None` preserves the source mode.
    pub mode: Option<u32>,
    pub owner: Option<String>,
    pub group: Option<String>,
}

impl SyncItem {
    pub fn new(source: impl Into<PathBuf>, target: impl Into<PathBuf>) -> Self {
        Self {
            source_path: source.into(),
            target_path: TargetPath(target.into()),
            mode: None,
            owner: None,
            group: None,
        }
    }

    pub fn with_mode(mut self, mode: u32) -> Self {
        self.mode = Some(mode);
        self
    }

    pub fn with_owner(mut self, owner: impl Into<String>, group: impl Into<String>) -> Self {
        self.owner = Some(owner.into());
        self.group = Some(group.into());
        self
    }

    pub fn desired_owner(&self) -> &str {
        self.owner.as_deref().unwrap_or(DEFAULT_OWNER)
    }

    pub fn desired_group(&self) -> &str {
        self.group.as_deref().unwrap_or(DEFAULT_GROUP)
    }
}

// ---------------------------------------------------------------------------
// Action map
// ---------------------------------------------------------------------------

/// Post-copy commands keyed by target path.
///
/// Commands under one target run in insertion order. Identical commands under
/// different targets are kept as-is; every target owns its own restart
/// sequence.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ActionMap(HashMap<TargetPath, Vec<ActionCommand>>);

impl ActionMap {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register `commands` for `target`, appending to any existing sequence.
    pub fn insert<I, C>(&mut self, target: impl Into<TargetPath>, commands: I)
    where
        I: IntoIterator<Item = C>,
        C: Into<ActionCommand>,
    {
        self.0
            .entry(target.into())
            .or_default()
            .extend(commands.into_iter().map(Into::into));
    }

    /// Commands for `target`; empty when none are registered.
    pub fn commands_for(&self, target: &TargetPath) -> &[ActionCommand] {
        self.0.get(target).map(Vec::as_slice).unwrap_or(&[])
    }

    pub fn targets(&self) -> impl Iterator<Item = &TargetPath> {
        self.0.keys()
    }

    pub fn clear(&mut self) {
        self.0.clear();
    }

    pub fn is_empty(&self) -> bool {
        self.0.values().all(Vec::is_empty)
    }
}
