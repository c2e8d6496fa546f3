use std::fmt;

use serde::{Deserialize, Serialize};

use crate::error::TypeError;

/// Number of hex characters in a well-formed transaction id (a SHA-256 digest).
pub const TX_ID_HEX_LEN: usize = 64;

/// Transaction identifier: the correlation key joining a chaincode event to
/// its block confirmation.
///
/// A `TxId` holds the identifier exactly as it was extracted from the event
/// payload. It is not validated at construction, because a malformed id must
/// still be carried through to the output as `CONFIRM_ERROR_TXID`. Use
/// [`TxId::validate`] to check the lexical format.
#[derive(Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TxId(String);

impl TxId {
    /// Wrap a raw identifier string.
    pub fn new(raw: impl Into<String>) -> Self {
        Self(raw.into())
    }

    /// The identifier as received.
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Check that the identifier is exactly [`TX_ID_HEX_LEN`] hex characters.
    pub fn validate(&self) -> Result<(), TypeError> {
        if self.0.len() != TX_ID_HEX_LEN {
            return Err(TypeError::InvalidTxId {
                id: self.0.clone(),
                reason: format!("expected {TX_ID_HEX_LEN} hex characters, got {}", self.0.len()),
            });
        }
        hex::decode(&self.0).map_err(|e| TypeError::InvalidTxId {
            id: self.0.clone(),
            reason: e.to_string(),
        })?;
        Ok(())
    }

    /// Returns `true` if [`TxId::validate`] succeeds.
    pub fn is_well_formed(&self) -> bool {
        self.validate().is_ok()
    }

    /// Short form (first 8 characters) for log lines.
    pub fn short(&self) -> &str {
        match self.0.char_indices().nth(8) {
            Some((idx, _)) => &self.0[..idx],
            None => &self.0,
        }
    }
}

impl fmt::Debug for TxId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "TxId({})", self.short())
    }
}

impl fmt::Display for TxId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for TxId {
    fn from(raw: &str) -> Self {
        Self::new(raw)
    }
}

impl From<String> for TxId {
    fn from(raw: String) -> Self {
        Self(raw)
    }
}
