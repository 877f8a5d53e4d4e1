//! hostsync-sync: compare, copy, verify and act.
//!
//! [`pipeline::run_pass`] is the entry point. It drives [`engine::sync_item`]
//! over the plan and then [`dispatch::dispatch`] over the changed targets.

pub mod dispatch;
pub mod engine;
pub mod error;
pub mod host_ops;
pub mod pipeline;
pub mod staleness;

pub use engine::ItemOutcome;
pub use error::SyncError;
pub use pipeline::{run_pass, run_pass_until, PassResult};
