//! # hostsync-exec
//!
//! The single gateway for privileged host-side work. Everything the agent
//! does to the host (reading fingerprints, writing files, restarting
//! services) is a [`HostCommand`] run through a [`HostExecutor`].

pub mod command;
mod error;
pub mod executor;

pub use command::{HostCommand, HostExit, HostOutput};
pub use error::HostExecError;
pub use executor::{HostExecutor, NsenterExecutor, DEFAULT_COMMAND_TIMEOUT, NSENTER_PREFIX};
