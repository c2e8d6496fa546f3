use thiserror::Error;

/// Errors produced by type operations.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum TypeError {
    #[error("invalid transaction id {id:?}: {reason}")]
    InvalidTxId { id: String, reason: String },

    #[error("invalid block number {0:?}")]
    InvalidBlockNumber(String),

    #[error("header serialization error: {0}")]
    Serialization(String),
}
