use std::io;
use std::path::PathBuf;

use thiserror::Error;

/// Invalid or unreadable configuration.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("invalid configuration: {0}")]
    Invalid(String),

    #[error("cannot read config {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("cannot parse config: {0}")]
    Parse(#[from] toml::de::Error),
}

/// Errors that stop the correlator service.
#[derive(Debug, Error)]
pub enum CorrelatorError {
    #[error("source error: {0}")]
    Source(#[from] txconf_source::SourceError),

    #[error("sink error: {0}")]
    Sink(#[from] txconf_sink::SinkError),

    #[error("configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("signal handler setup failed: {0}")]
    Signal(#[source] io::Error),

    #[error("worker {name} failed: {reason}")]
    Worker { name: &'static str, reason: String },

    #[error("service has already been started")]
    AlreadyStarted,
}

pub type CorrelatorResult<T> = Result<T, CorrelatorError>;
