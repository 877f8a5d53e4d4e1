//! Agent runtime: the periodic sync loop, signal-driven shutdown and
//! logging setup.

mod error;
pub mod logging;
mod runtime;

pub use error::DaemonError;
pub use runtime::{listen_for_signals, run, shutdown_channel, start_blocking, RunOptions, RunOutcome};
