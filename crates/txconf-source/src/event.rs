use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use txconf_types::{BlockHeader, PendingRecord, TxId};

use crate::checkpoint::ChaincodePosition;
use crate::error::{SourceError, SourceResult};

/// Payload keys accepted for the transaction id, in lookup order.
const TX_ID_KEYS: [&str; 3] = ["tx_id", "txId", "txid"];

/// Payload keys accepted for the business asset key, in lookup order.
const ASSET_KEY_KEYS: [&str; 3] = ["asset_key", "assetKey", "key"];

/// Block header exactly as delivered by the ledger.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RawBlockHeader {
    /// String-encoded block sequence number.
    pub number: String,
    /// Content hash of the block data.
    pub data_hash: String,
    /// Hash of the parent block header.
    pub previous_hash: String,
}

/// One block-commit notification.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct BlockEvent {
    /// Decoded header, if the ledger delivered one.
    pub header: Option<RawBlockHeader>,
    /// Raw block bytes.
    pub data: Vec<u8>,
}

impl BlockEvent {
    /// Build a block event with a header.
    pub fn new(header: RawBlockHeader, data: Vec<u8>) -> Self {
        Self {
            header: Some(header),
            data,
        }
    }

    /// The block number, if a header is present and its number parses.
    pub fn number(&self) -> Option<u64> {
        self.header
            .as_ref()
            .and_then(|h| BlockHeader::parse_number(&h.number).ok())
    }

    /// Extract the cached header fields from this event.
    ///
    /// Fails if the header is missing, its number is not an integer, or its
    /// data hash is empty.
    pub fn extract_header(&self) -> SourceResult<BlockHeader> {
        let raw = self
            .header
            .as_ref()
            .ok_or_else(|| SourceError::block_extraction("block has no header"))?;
        let number = BlockHeader::parse_number(&raw.number)
            .map_err(|e| SourceError::block_extraction(e.to_string()))?;
        if raw.data_hash.is_empty() {
            return Err(SourceError::block_extraction(format!(
                "block {number} has an empty data hash"
            )));
        }
        Ok(BlockHeader::new(
            number,
            raw.data_hash.clone(),
            raw.previous_hash.clone(),
            self.data.len(),
        ))
    }
}

/// One chaincode event together with the block it was committed in.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ChaincodeEvent {
    /// Name of the emitting chaincode.
    pub chaincode_name: String,
    /// Event name set by the contract.
    pub event_name: String,
    /// Sequence number of the block carrying the transaction.
    pub block_number: u64,
    /// Raw payload bytes (a JSON object by contract agreement).
    pub payload: Vec<u8>,
}

impl ChaincodeEvent {
    /// Extract a new `Pending` correlation record from the payload.
    ///
    /// The payload must be a JSON object with a transaction id and an asset
    /// key. Every other top-level field becomes a `key=value` payload
    /// segment, in key order. The transaction id is not validated here.
    pub fn extract_record(&self) -> SourceResult<PendingRecord> {
        let mut fields: Map<String, Value> = serde_json::from_slice(&self.payload)
            .map_err(|e| SourceError::chaincode_extraction(format!("payload is not a JSON object: {e}")))?;

        let tx_id = take_string(&mut fields, &TX_ID_KEYS)
            .ok_or_else(|| SourceError::chaincode_extraction("payload has no transaction id"))?;
        let asset_key = take_string(&mut fields, &ASSET_KEY_KEYS)
            .ok_or_else(|| SourceError::chaincode_extraction("payload has no asset key"))?;

        let segments = fields
            .into_iter()
            .map(|(key, value)| match value {
                Value::String(s) => format!("{key}={s}"),
                other => format!("{key}={other}"),
            })
            .collect();

        Ok(PendingRecord::new(
            TxId::new(tx_id),
            asset_key,
            self.block_number,
            segments,
        ))
    }
}

/// Remove the first present key and return its value as a string.
///
/// Numbers are accepted and rendered in decimal; other JSON types are not.
fn take_string(fields: &mut Map<String, Value>, keys: &[&str]) -> Option<String> {
    for key in keys {
        match fields.remove(*key) {
            Some(Value::String(s)) if !s.is_empty() => return Some(s),
            Some(Value::Number(n)) => return Some(n.to_string()),
            Some(_) | None => continue,
        }
    }
    None
}

/// Filter for a chaincode event subscription.
#[derive(Clone, Debug, Default)]
pub struct EventFilter {
    /// Only events from this chaincode are delivered.
    pub chaincode_name: String,
    /// If set, resume after this checkpointed position.
    pub resume_after: Option<ChaincodePosition>,
}

impl EventFilter {
    /// Filter on a chaincode name with no resume position.
    pub fn chaincode(name: impl Into<String>) -> Self {
        Self {
            chaincode_name: name.into(),
            resume_after: None,
        }
    }

    /// Set the resume position.
    pub fn resume_after(mut self, position: Option<ChaincodePosition>) -> Self {
        self.resume_after = position;
        self
    }

    /// Returns `true` if the given event matches this filter.
    ///
    /// Resumption is block-granular: events in the checkpointed block are
    /// redelivered except the checkpointed transaction itself.
    pub fn matches(&self, event: &ChaincodeEvent) -> bool {
        if event.chaincode_name != self.chaincode_name {
            return false;
        }
        if let Some(ref position) = self.resume_after {
            if event.block_number < position.block {
                return false;
            }
            if event.block_number == position.block {
                if let Ok(record) = event.extract_record() {
                    if record.tx_id().as_str() == position.tx_id {
                        return false;
                    }
                }
            }
        }
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::EventKind;

    fn chaincode_event(payload: &str) -> ChaincodeEvent {
        ChaincodeEvent {
            chaincode_name: "assets".into(),
            event_name: "CreateAsset".into(),
            block_number: 100,
            payload: payload.as_bytes().to_vec(),
        }
    }

    #[test]
    fn extracts_block_header() {
        let event = BlockEvent::new(
            RawBlockHeader {
                number: "100".into(),
                data_hash: "abc".into(),
                previous_hash: "xyz".into(),
            },
            vec![0u8; 16],
        );
        let header = event.extract_header().unwrap();
        assert_eq!(header.number, 100);
        assert_eq!(header.data_hash, "abc");
        assert_eq!(header.previous_hash, "xyz");
        assert_eq!(header.payload_len, 16);
        assert_eq!(event.number(), Some(100));
    }

    #[test]
    fn block_without_header_fails_extraction() {
        let event = BlockEvent {
            header: None,
            data: Vec::new(),
        };
        let err = event.extract_header().unwrap_err();
        assert!(matches!(
            err,
            SourceError::Extraction {
                kind: EventKind::Block,
                ..
            }
        ));
        assert_eq!(event.number(), None);
    }

    #[test]
    fn block_with_bad_number_or_empty_hash_fails_extraction() {
        let bad_number = BlockEvent::new(
            RawBlockHeader {
                number: "x1".into(),
                data_hash: "abc".into(),
                previous_hash: String::new(),
            },
            Vec::new(),
        );
        assert!(bad_number.extract_header().is_err());

        let empty_hash = BlockEvent::new(
            RawBlockHeader {
                number: "1".into(),
                ..Default::default()
            },
            Vec::new(),
        );
        assert!(empty_hash.extract_header().is_err());
    }

    #[test]
    fn extracts_pending_record() {
        let event = chaincode_event(r#"{"tx_id":"abcd","asset_key":"B1","owner":"alice","qty":3}"#);
        let record = event.extract_record().unwrap();
        assert_eq!(record.tx_id().as_str(), "abcd");
        assert_eq!(record.asset_key, "B1");
        assert_eq!(record.block_ref, 100);
        assert!(record.is_pending());
        assert_eq!(record.payload, vec!["owner=alice", "qty=3"]);
    }

    #[test]
    fn accepts_key_aliases() {
        let record = chaincode_event(r#"{"txId":"ff","key":7}"#).extract_record().unwrap();
        assert_eq!(record.tx_id().as_str(), "ff");
        assert_eq!(record.asset_key, "7");
        assert!(record.payload.is_empty());
    }

    #[test]
    fn malformed_payload_fails_extraction() {
        assert!(chaincode_event("not json").extract_record().is_err());
        assert!(chaincode_event("[1,2]").extract_record().is_err());
        assert!(chaincode_event(r#"{"asset_key":"B1"}"#).extract_record().is_err());
        assert!(chaincode_event(r#"{"tx_id":"ab"}"#).extract_record().is_err());
        assert!(chaincode_event(r#"{"tx_id":"","asset_key":"B1"}"#).extract_record().is_err());
    }

    #[test]
    fn malformed_tx_id_still_extracts() {
        let record = chaincode_event(r#"{"tx_id":"not-hex","asset_key":"B1"}"#)
            .extract_record()
            .unwrap();
        assert!(!record.tx_id().is_well_formed());
    }

    #[test]
    fn filter_matches_chaincode_name() {
        let event = chaincode_event(r#"{"tx_id":"a","asset_key":"b"}"#);
        assert!(EventFilter::chaincode("assets").matches(&event));
        assert!(!EventFilter::chaincode("other").matches(&event));
    }

    #[test]
    fn filter_resumes_after_checkpoint() {
        let event = chaincode_event(r#"{"tx_id":"a","asset_key":"b"}"#);

        let earlier = EventFilter::chaincode("assets").resume_after(Some(ChaincodePosition {
            block: 99,
            tx_id: "zz".into(),
        }));
        assert!(earlier.matches(&event));

        let same_tx = EventFilter::chaincode("assets").resume_after(Some(ChaincodePosition {
            block: 100,
            tx_id: "a".into(),
        }));
        assert!(!same_tx.matches(&event));

        let later = EventFilter::chaincode("assets").resume_after(Some(ChaincodePosition {
            block: 101,
            tx_id: "a".into(),
        }));
        assert!(!later.matches(&event));
    }
}
