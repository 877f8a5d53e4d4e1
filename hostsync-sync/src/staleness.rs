//! Staleness classification for one sync item.
//!
//! Signal precedence:
//! 1. `Missing` (host lookup failed: absent or unreadable)
//! 2. `ContentDiffers` (SHA-256 of host copy differs from source)
//! 3. `ModeDiffers` (permission bits differ from the desired mode)
//! 4. `OwnerDiffers` (owner or group differ)
//! 5. `Current`

use std::fmt;

use sha2::{Digest, Sha256};

use hostsync_core::TargetPath;
use hostsync_exec::HostExecutor;

use crate::host_ops::{self, FileAttrs};

/// Hex SHA-256 of `bytes`.
pub fn sha256_hex(bytes: &[u8]) -> String {
    let mut h = Sha256::new();
    h.update(bytes);
    hex::encode(h.finalize())
}

/// What the host reports about a target.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct HostState {
    pub digest: Option<String>,
    pub attrs: Option<FileAttrs>,
}

/// Desired end state of a target.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Desired<'a> {
    pub digest: &'a str,
    pub mode: u32,
    pub owner: &'a str,
    pub group: &'a str,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StalenessSignal {
    Current,
    Missing,
    ContentDiffers { host: String },
    ModeDiffers { host: u32 },
    OwnerDiffers { host: String },
}

impl StalenessSignal {
    pub fn is_stale(&self) -> bool {
        !matches!(self, StalenessSignal::Current)
    }
}

impl fmt::Display for StalenessSignal {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            StalenessSignal::Current => f.write_str("up-to-date"),
            StalenessSignal::Missing => f.write_str("missing on host"),
            StalenessSignal::ContentDiffers { host } => write!(f, "content differs (host {host})"),
            StalenessSignal::ModeDiffers { host } => write!(f, "mode differs (host {host:o})"),
            StalenessSignal::OwnerDiffers { host } => write!(f, "ownership differs (host {host})"),
        }
    }
}

/// Ask the host for the target's digest and attributes.
///
/// Any lookup failure (absent file, permission problem, executor error) is
/// folded into `None`: the target is then treated as stale and the copy
/// step surfaces the real error if there is one.
pub async fn inspect(exec: &dyn HostExecutor, target: &TargetPath) -> HostState {
    let digest = match exec.run_on_host(&host_ops::fingerprint(target.as_path())).await {
        Ok(out) if out.success() => host_ops::parse_fingerprint(&out.stdout_lossy()),
        Ok(out) => {
            tracing::debug!(path = %target, exit = %out.exit, "host fingerprint unavailable");
            None
        }
        Err(err) => {
            tracing::warn!(path = %target, error = %err, "host fingerprint lookup failed");
            None
        }
    };
    if digest.is_none() {
        return HostState::default();
    }

    let attrs = match exec.run_on_host(&host_ops::attributes(target.as_path())).await {
        Ok(out) if out.success() => host_ops::parse_attributes(&out.stdout_lossy()),
        Ok(_) => None,
        Err(err) => {
            tracing::warn!(path = %target, error = %err, "host stat lookup failed");
            None
        }
    };
    HostState { digest, attrs }
}

/// Compare the host state with the desired state.
pub fn check(host: &HostState, desired: &Desired<'_>) -> StalenessSignal {
    let Some(host_digest) = host.digest.as_deref() else {
        return StalenessSignal::Missing;
    };
    if host_digest != desired.digest {
        return StalenessSignal::ContentDiffers {
            host: host_digest.to_owned(),
        };
    }
    let Some(attrs) = host.attrs.as_ref() else {
        return StalenessSignal::Missing;
    };
    if attrs.mode & 0o7777 != desired.mode & 0o7777 {
        return StalenessSignal::ModeDiffers { host: attrs.mode };
    }
    if attrs.owner != desired.owner || attrs.group != desired.group {
        return StalenessSignal::OwnerDiffers {
            host: format!("{}:{}", attrs.owner, attrs.group),
        };
    }
    StalenessSignal::Current
}
