use std::fmt;

use crate::record::{ConfirmStatus, PendingRecord};

/// Separator between the fields of one output line.
pub const FIELD_DELIMITER: char = '\t';

/// Separator between the segments of the payload field.
pub const PAYLOAD_DELIMITER: char = '|';

/// Flattened projection of a flushed [`PendingRecord`].
///
/// Field order is fixed: status, asset key, transaction id, response,
/// payload. Write-once; there is no way back to a `PendingRecord`.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct OutputRecord {
    pub status: ConfirmStatus,
    pub asset_key: String,
    pub transaction_id: String,
    pub response: String,
    pub payload: Vec<String>,
}

impl OutputRecord {
    /// Render the record as one output line, without the trailing newline.
    pub fn to_line(&self) -> String {
        let payload = self
            .payload
            .iter()
            .map(|segment| escape_segment(segment))
            .collect::<Vec<_>>()
            .join(&PAYLOAD_DELIMITER.to_string());

        let fields = [
            self.status.as_str().to_string(),
            sanitize(&self.asset_key),
            sanitize(&self.transaction_id),
            sanitize(&self.response),
            payload,
        ];
        fields.join(&FIELD_DELIMITER.to_string())
    }
}

impl From<&PendingRecord> for OutputRecord {
    fn from(record: &PendingRecord) -> Self {
        let response = match record.status {
            ConfirmStatus::Confirmed => record.resolved_header.clone().unwrap_or_default(),
            ConfirmStatus::ErrorTxId | ConfirmStatus::ErrorHeader => {
                record.error.clone().unwrap_or_default()
            }
            ConfirmStatus::Pending => String::new(),
        };
        Self {
            status: record.status,
            asset_key: record.asset_key.clone(),
            transaction_id: record.tx_id().to_string(),
            response,
            payload: record.payload.clone(),
        }
    }
}

impl fmt::Display for OutputRecord {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_line())
    }
}

/// Replace characters that would break the line or field structure.
fn sanitize(field: &str) -> String {
    field
        .chars()
        .map(|c| match c {
            '\t' | '\r' | '\n' => ' ',
            other => other,
        })
        .collect()
}

/// Escape `\` as `\\` and the payload delimiter as `\|`.
fn escape_segment(segment: &str) -> String {
    let mut out = String::with_capacity(segment.len());
    for c in sanitize(segment).chars() {
        if c == '\\' || c == PAYLOAD_DELIMITER {
            out.push('\\');
        }
        out.push(c);
    }
    out
}
