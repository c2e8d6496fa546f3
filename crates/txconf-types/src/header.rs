use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::TypeError;

/// Header fields extracted from one block-commit notification.
///
/// Created once per received block by the block listener and owned by the
/// header cache afterwards. Never mutated.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct BlockHeader {
    /// Block sequence number. Rendered as a string on the wire.
    #[serde(with = "number_as_string")]
    pub number: u64,
    /// Content hash of the block data.
    pub data_hash: String,
    /// Hash of the parent block header.
    pub previous_hash: String,
    /// Local time at which the block event was observed.
    pub observed_at: DateTime<Utc>,
    /// Length in bytes of the raw block payload.
    pub payload_len: usize,
}

impl BlockHeader {
    /// Build a header observed now.
    pub fn new(
        number: u64,
        data_hash: impl Into<String>,
        previous_hash: impl Into<String>,
        payload_len: usize,
    ) -> Self {
        Self {
            number,
            data_hash: data_hash.into(),
            previous_hash: previous_hash.into(),
            observed_at: Utc::now(),
            payload_len,
        }
    }

    /// Parse a string-encoded block sequence number.
    pub fn parse_number(raw: &str) -> Result<u64, TypeError> {
        raw.trim()
            .parse::<u64>()
            .map_err(|_| TypeError::InvalidBlockNumber(raw.to_string()))
    }

    /// Render the header as compact JSON for the output `response` field.
    pub fn to_json(&self) -> Result<String, TypeError> {
        serde_json::to_string(self).map_err(|e| TypeError::Serialization(e.to_string()))
    }
}

mod number_as_string {
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(number: &u64, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(number)
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<u64, D::Error> {
        let raw = String::deserialize(deserializer)?;
        raw.parse().map_err(serde::de::Error::custom)
    }
}
