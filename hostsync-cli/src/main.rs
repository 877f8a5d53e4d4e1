//! hostsync: keep host-side service scripts in sync with the copies shipped
//! in this container image.
//!
//! # Usage
//!
//! ```text
//! hostsync [--once [--json]] [--interval <secs>] [--no-post-actions]
//!          [--command-timeout <secs>] [--host-prefix <cmd>] [--source-root <dir>]
//!          [--log-level <level>] [--no-syslog]
//! ```
//!
//! Exit codes: 0 success, 1 failed pass in `--once` mode, 2 bad configuration.

use std::path::PathBuf;
use std::process::ExitCode;
use std::time::Duration;

use anyhow::{Context, Result};
use clap::Parser;

use hostsync_core::config::{v1_enabled_from_env, DEFAULT_SYNC_INTERVAL};
use hostsync_core::{assemble, AssembleOptions, NOTICE};
use hostsync_daemon::{logging, start_blocking, RunOptions, RunOutcome};
use hostsync_exec::{NsenterExecutor, DEFAULT_COMMAND_TIMEOUT, NSENTER_PREFIX};

const EXIT_FAILURE: u8 = 1;
const EXIT_CONFIG: u8 = 2;

// ---------------------------------------------------------------------------
// CLI entry point
// ---------------------------------------------------------------------------

#[derive(Parser, Debug)]
#[command(
    name = "hostsync",
    version,
    about = "Sync host service scripts from the container image and restart what changed",
    long_about = None,
)]
struct Cli {
    /// Run a single pass and exit: 0 if everything succeeded, 1 otherwise.
    #[arg(long)]
    once: bool,

    /// Seconds between passes in periodic mode.
    #[arg(
        long,
        value_name = "SECONDS",
        default_value_t = DEFAULT_SYNC_INTERVAL.as_secs(),
        value_parser = clap::value_parser!(u64).range(1..),
    )]
    interval: u64,

    /// Copy files but never run the post-copy service actions.
    #[arg(long)]
    no_post_actions: bool,

    /// Per host-command timeout in seconds.
    #[arg(
        long,
        value_name = "SECONDS",
        default_value_t = DEFAULT_COMMAND_TIMEOUT.as_secs(),
        value_parser = clap::value_parser!(u64).range(1..),
    )]
    command_timeout: u64,

    /// Command prefix that enters the host namespaces (whitespace-separated).
    /// An empty string runs host commands locally.
    #[arg(long, value_name = "CMD")]
    host_prefix: Option<String>,

    /// Directory the container source paths are resolved under.
    #[arg(long, value_name = "DIR", default_value = "/")]
    source_root: PathBuf,

    /// Print the pass summary as JSON on stdout (requires --once).
    #[arg(long, requires = "once")]
    json: bool,

    /// Log level.
    #[arg(
        long,
        value_name = "LEVEL",
        default_value = "info",
        value_parser = ["error", "warn", "info", "debug", "trace"],
    )]
    log_level: String,

    /// Log to stderr only.
    #[arg(long)]
    no_syslog: bool,
}

impl Cli {
    fn executor(&self) -> NsenterExecutor {
        let timeout = Duration::from_secs(self.command_timeout);
        match &self.host_prefix {
            Some(prefix) => NsenterExecutor::new(prefix.split_whitespace(), timeout),
            None => NsenterExecutor::new(NSENTER_PREFIX.iter().copied(), timeout),
        }
    }

    fn run(self) -> Result<ExitCode> {
        let opts = AssembleOptions {
            v1_enabled: v1_enabled_from_env(),
            source_root: self.source_root.clone(),
            post_actions: !self.no_post_actions,
        };
        let plan = match assemble(&opts) {
            Ok(plan) => plan,
            Err(err) => {
                tracing::error!(error = %err, "configuration error, refusing to start");
                return Ok(ExitCode::from(EXIT_CONFIG));
            }
        };

        let exec = self.executor();
        tracing::info!(
            target: NOTICE,
            items = plan.items().len(),
            host_prefix = %exec.prefix().join(" "),
            command_timeout_secs = self.command_timeout,
            "hostsync ready",
        );

        let run_opts = RunOptions {
            once: self.once,
            interval: Duration::from_secs(self.interval),
        };
        let outcome = start_blocking(&exec, &plan, run_opts).context("sync runtime failed")?;

        if self.json {
            if let RunOutcome::Once(result) = &outcome {
                let json = serde_json::to_string_pretty(result).context("serialize pass summary")?;
                println!("{json}");
            }
        }
        Ok(ExitCode::from(outcome.exit_code()))
    }
}

// ---------------------------------------------------------------------------
// Main
// ---------------------------------------------------------------------------

fn main() -> ExitCode {
    let cli = Cli::parse();

    if let Err(err) = logging::init(&cli.log_level, !cli.no_syslog) {
        eprintln!("hostsync: {err}");
        return ExitCode::from(EXIT_CONFIG);
    }

    match cli.run() {
        Ok(code) => code,
        Err(err) => {
            tracing::error!(error = %format!("{err:#}"), "fatal error");
            ExitCode::from(EXIT_FAILURE)
        }
    }
}
