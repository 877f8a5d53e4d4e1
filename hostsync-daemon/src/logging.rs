//! Tracing setup: a `fmt` layer on stderr plus an RFC 3164 syslog layer.
//!
//! Syslog severities follow the tracing level, except that info events
//! logged under the [`NOTICE`] target are sent as NOTICE.

use std::fmt::{self, Write as _};
use std::io::IsTerminal;
use std::sync::Mutex;

use syslog::{Facility, Formatter3164, Logger, LoggerBackend};
use tracing::field::{Field, Visit};
use tracing::{Event, Level, Subscriber};
use tracing_subscriber::layer::{Context, SubscriberExt};
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{fmt as tfmt, EnvFilter, Layer};

use hostsync_core::NOTICE;

use crate::error::DaemonError;

/// Identifier the agent logs under in the system log.
pub const SYSLOG_IDENT: &str = "hostsync";

/// Syslog severities the agent emits.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Severity {
    Err,
    Warning,
    Notice,
    Info,
    Debug,
}

pub fn severity_for(level: &Level, target: &str) -> Severity {
    match *level {
        Level::ERROR => Severity::Err,
        Level::WARN => Severity::Warning,
        Level::INFO if target == NOTICE => Severity::Notice,
        Level::INFO => Severity::Info,
        _ => Severity::Debug,
    }
}

/// Install the global subscriber.
///
/// The filter comes from `level` alone; the environment is never consulted.
/// A missing syslog socket is not fatal: the agent keeps logging to stderr
/// and says so.
pub fn init(level: &str, use_syslog: bool) -> Result<(), DaemonError> {
    let filter = level_filter(level)?;

    let (syslog_layer, syslog_failure) = if use_syslog {
        match SyslogLayer::connect() {
            Ok(layer) => (Some(layer), None),
            Err(err) => (None, Some(err.to_string())),
        }
    } else {
        (None, None)
    };

    let _ = tracing_subscriber::registry()
        .with(filter)
        .with(
            tfmt::layer()
                .with_target(false)
                .with_ansi(std::io::stderr().is_terminal())
                .with_writer(std::io::stderr),
        )
        .with(syslog_layer)
        .try_init();

    if let Some(error) = syslog_failure {
        tracing::warn!(%error, "syslog unavailable, logging to stderr only");
    }
    Ok(())
}

fn level_filter(level: &str) -> Result<EnvFilter, DaemonError> {
    EnvFilter::try_new(level).map_err(|e| DaemonError::LogFilter {
        filter: level.to_owned(),
        reason: e.to_string(),
    })
}

/// Forwards events to the local syslog daemon.
pub struct SyslogLayer {
    logger: Mutex<Logger<LoggerBackend, Formatter3164>>,
}

impl SyslogLayer {
    pub fn connect() -> Result<Self, syslog::Error> {
        let formatter = Formatter3164 {
            facility: Facility::LOG_DAEMON,
            hostname: None,
            process: SYSLOG_IDENT.to_owned(),
            pid: std::process::id(),
        };
        let logger = syslog::unix(formatter)?;
        Ok(Self {
            logger: Mutex::new(logger),
        })
    }
}

impl<S: Subscriber> Layer<S> for SyslogLayer {
    fn on_event(&self, event: &Event<'_>, _ctx: Context<'_, S>) {
        let meta = event.metadata();
        let mut line = LineVisitor::default();
        event.record(&mut line);
        let text = line.finish();

        let Ok(mut logger) = self.logger.lock() else {
            return;
        };
        // A failed syslog write has nowhere better to go.
        let _ = match severity_for(meta.level(), meta.target()) {
            Severity::Err => logger.err(text),
            Severity::Warning => logger.warning(text),
            Severity::Notice => logger.notice(text),
            Severity::Info => logger.info(text),
            Severity::Debug => logger.debug(text),
        };
    }
}

/// Renders an event as `message key=value ...`.
#[derive(Default)]
struct LineVisitor {
    message: String,
    fields: String,
}

impl LineVisitor {
    fn finish(self) -> String {
        if self.fields.is_empty() {
            self.message
        } else if self.message.is_empty() {
            self.fields.trim_start().to_owned()
        } else {
            format!("{}{}", self.message, self.fields)
        }
    }
}

impl Visit for LineVisitor {
    fn record_str(&mut self, field: &Field, value: &str) {
        if field.name() == "message" {
            self.message.push_str(value);
        } else {
            let _ = write!(self.fields, " {}={}", field.name(), value);
        }
    }

    fn record_debug(&mut self, field: &Field, value: &dyn fmt::Debug) {
        if field.name() == "message" {
            let _ = write!(self.message, "{value:?}");
        } else {
            let _ = write!(self.fields, " {}={:?}", field.name(), value);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn notice_target_maps_to_notice_only_at_info() {
        assert_eq!(severity_for(&Level::INFO, NOTICE), Severity::Notice);
        assert_eq!(severity_for(&Level::INFO, "hostsync_sync::pipeline"), Severity::Info);
        assert_eq!(severity_for(&Level::WARN, NOTICE), Severity::Warning);
    }

    #[test]
    fn levels_map_to_syslog_severities() {
        assert_eq!(severity_for(&Level::ERROR, "x"), Severity::Err);
        assert_eq!(severity_for(&Level::DEBUG, "x"), Severity::Debug);
        assert_eq!(severity_for(&Level::TRACE, "x"), Severity::Debug);
    }

    #[test]
    fn level_filter_follows_the_given_level() {
        let filter = level_filter("warn").unwrap();
        assert_eq!(
            filter.max_level_hint(),
            Some(tracing::level_filters::LevelFilter::WARN)
        );
    }

    #[test]
    fn line_joins_message_and_fields() {
        let line = LineVisitor {
            message: "synced".to_owned(),
            fields: " path=/usr/bin/restapi.sh".to_owned(),
        };
        assert_eq!(line.finish(), "synced path=/usr/bin/restapi.sh");
    }
}
