use txconf_types::{BlockHeader, TypeError};

/// Renders a matched block header into the output `response` field.
///
/// A failure marks the record `CONFIRM_ERROR_HEADER` instead of confirming it.
pub trait HeaderEncoder: Send + Sync {
    fn encode(&self, header: &BlockHeader) -> Result<String, TypeError>;
}

/// Compact JSON rendering of every header field.
#[derive(Clone, Copy, Debug, Default)]
pub struct JsonHeaderEncoder;

impl HeaderEncoder for JsonHeaderEncoder {
    fn encode(&self, header: &BlockHeader) -> Result<String, TypeError> {
        header.to_json()
    }
}
