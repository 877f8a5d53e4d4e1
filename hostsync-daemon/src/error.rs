use thiserror::Error;

/// Error surface for the agent runtime: things that stop the process rather
/// than a single pass.
#[derive(Debug, Error)]
pub enum DaemonError {
    #[error("failed to build tokio runtime: {0}")]
    Runtime(#[source] std::io::Error),

    #[error("failed to install {signal} handler: {source}")]
    Signal {
        signal: &'static str,
        #[source]
        source: std::io::Error,
    },

    #[error("invalid log filter `{filter}`: {reason}")]
    LogFilter { filter: String, reason: String },
}
