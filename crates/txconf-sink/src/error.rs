use std::io;
use std::path::PathBuf;

/// Errors produced by output sinks.
#[derive(Debug, thiserror::Error)]
pub enum SinkError {
    #[error("cannot open output {path}: {source}")]
    Open {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("io error: {0}")]
    Io(#[from] io::Error),

    #[error("output {0} is already closed")]
    Closed(PathBuf),
}

pub type SinkResult<T> = Result<T, SinkError>;
