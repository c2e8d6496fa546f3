use std::io;
use std::path::PathBuf;

/// Which input an extraction failure came from.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum EventKind {
    Block,
    Chaincode,
}

impl std::fmt::Display for EventKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Block => f.write_str("block"),
            Self::Chaincode => f.write_str("chaincode"),
        }
    }
}

/// Errors produced by event sources and checkpointers.
#[derive(Debug, thiserror::Error)]
pub enum SourceError {
    /// A subscription could not be established.
    #[error("{kind} subscription failed: {reason}")]
    Subscription { kind: EventKind, reason: String },

    /// A subscription stream ended while the service was still running.
    #[error("{0} event stream closed")]
    StreamClosed(EventKind),

    /// The correlator inputs could not be extracted from an event.
    #[error("{kind} extraction failed: {reason}")]
    Extraction { kind: EventKind, reason: String },

    /// I/O error while reading events or persisting checkpoints.
    #[error("io error: {0}")]
    Io(#[from] io::Error),

    /// Checkpoint file could not be decoded or encoded.
    #[error("checkpoint error at {path}: {reason}")]
    Checkpoint { path: PathBuf, reason: String },
}

impl SourceError {
    pub(crate) fn block_extraction(reason: impl Into<String>) -> Self {
        Self::Extraction {
            kind: EventKind::Block,
            reason: reason.into(),
        }
    }

    pub(crate) fn chaincode_extraction(reason: impl Into<String>) -> Self {
        Self::Extraction {
            kind: EventKind::Chaincode,
            reason: reason.into(),
        }
    }
}

/// Convenience alias used throughout the source crate.
pub type SourceResult<T> = std::result::Result<T, SourceError>;
