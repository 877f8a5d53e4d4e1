//! hostsync core library: domain types, configuration assembly, errors.
//!
//! - [`types`]: [`SyncItem`], [`TargetPath`], [`ActionMap`]
//! - [`config`]: the compile-time plan and startup validation
//! - [`error`]: [`ConfigError`]

pub mod config;
pub mod error;
pub mod types;

pub use config::{assemble, AssembleOptions, SyncPlan};
pub use error::ConfigError;
pub use types::{ActionCommand, ActionMap, SyncItem, TargetPath};

/// Tracing target for events that the syslog sink records at NOTICE.
///
/// Use as `tracing::info!(target: NOTICE, ...)`.
pub const NOTICE: &str = "notice";
