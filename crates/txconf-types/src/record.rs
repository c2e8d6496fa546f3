use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::txid::TxId;

/// Correlation status of a [`PendingRecord`].
///
/// `Pending` is the only non-terminal status. A record leaves `Pending` at
/// most once and is flushed at that transition.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ConfirmStatus {
    /// Waiting for the claimed block header to appear in the cache.
    Pending,
    /// Matched against a cached block header.
    Confirmed,
    /// The transaction id failed the lexical format check.
    ErrorTxId,
    /// The matched header could not be serialized for output.
    ErrorHeader,
}

impl ConfirmStatus {
    /// The status name written to the output file.
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Pending => "CONFIRM_PENDING",
            Self::Confirmed => "CONFIRM_OK",
            Self::ErrorTxId => "CONFIRM_ERROR_TXID",
            Self::ErrorHeader => "CONFIRM_ERROR_HEADER",
        }
    }

    /// Returns `true` for every status except `Pending`.
    pub const fn is_terminal(&self) -> bool {
        !matches!(self, Self::Pending)
    }
}

impl fmt::Display for ConfirmStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// An in-flight correlation between a chaincode event and the block it
/// claims to have landed in.
///
/// Created `Pending` by the event listener. Only the correlator changes the
/// status (and attaches the resolved header); the shutdown drain flushes
/// whatever is left unchanged. The transaction id never changes.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct PendingRecord {
    tx_id: TxId,
    /// Current correlation status.
    pub status: ConfirmStatus,
    /// Business asset key extracted from the event payload.
    pub asset_key: String,
    /// Block sequence number the chaincode event was delivered with.
    pub block_ref: u64,
    /// Remaining payload fields, rendered `key=value`.
    pub payload: Vec<String>,
    /// Serialized block header, set on confirmation.
    pub resolved_header: Option<String>,
    /// Human-readable reason for a terminal error status.
    pub error: Option<String>,
    /// Local time at which the chaincode event was received.
    pub received_at: DateTime<Utc>,
    /// Set once the correlator has decided this record can never resolve.
    pub stalled: bool,
}

impl PendingRecord {
    /// Create a new `Pending` record.
    pub fn new(tx_id: TxId, asset_key: impl Into<String>, block_ref: u64, payload: Vec<String>) -> Self {
        Self {
            tx_id,
            status: ConfirmStatus::Pending,
            asset_key: asset_key.into(),
            block_ref,
            payload,
            resolved_header: None,
            error: None,
            received_at: Utc::now(),
            stalled: false,
        }
    }

    /// The correlation key.
    pub fn tx_id(&self) -> &TxId {
        &self.tx_id
    }

    /// Returns `true` while the record is still waiting for its block.
    pub fn is_pending(&self) -> bool {
        self.status == ConfirmStatus::Pending
    }

    /// Transition to `Confirmed`, attaching the serialized header.
    ///
    /// Returns `false` and leaves the record untouched if it is already terminal.
    pub fn confirm(&mut self, header_json: String) -> bool {
        if !self.is_pending() {
            return false;
        }
        self.status = ConfirmStatus::Confirmed;
        self.resolved_header = Some(header_json);
        true
    }

    /// Transition to `ErrorTxId`.
    pub fn reject_tx_id(&mut self, reason: impl Into<String>) -> bool {
        self.fail(ConfirmStatus::ErrorTxId, reason.into())
    }

    /// Transition to `ErrorHeader`.
    pub fn reject_header(&mut self, reason: impl Into<String>) -> bool {
        self.fail(ConfirmStatus::ErrorHeader, reason.into())
    }

    fn fail(&mut self, status: ConfirmStatus, reason: String) -> bool {
        if !self.is_pending() {
            return false;
        }
        self.status = status;
        self.error = Some(reason);
        true
    }
}
