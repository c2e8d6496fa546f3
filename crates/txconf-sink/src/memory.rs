use std::sync::{Mutex, MutexGuard, PoisonError};

use txconf_types::{ConfirmStatus, OutputRecord};

use crate::error::SinkResult;
use crate::RecordSink;

/// Sink that keeps every written record in memory, in write order.
#[derive(Debug, Default)]
pub struct MemorySink {
    records: Mutex<Vec<OutputRecord>>,
}

impl MemorySink {
    pub fn new() -> Self {
        Self::default()
    }

    /// Clone of every record written so far.
    pub fn records(&self) -> Vec<OutputRecord> {
        self.guard().clone()
    }

    /// Records written for `transaction_id`.
    pub fn records_for(&self, transaction_id: &str) -> Vec<OutputRecord> {
        self.guard()
            .iter()
            .filter(|r| r.transaction_id == transaction_id)
            .cloned()
            .collect()
    }

    /// Number of records written with `status`.
    pub fn count(&self, status: ConfirmStatus) -> usize {
        self.guard().iter().filter(|r| r.status == status).count()
    }

    pub fn len(&self) -> usize {
        self.guard().len()
    }

    pub fn is_empty(&self) -> bool {
        self.guard().is_empty()
    }

    /// Rendered output lines, as a file sink would write them.
    pub fn lines(&self) -> Vec<String> {
        self.guard().iter().map(OutputRecord::to_line).collect()
    }

    fn guard(&self) -> MutexGuard<'_, Vec<OutputRecord>> {
        self.records.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl RecordSink for MemorySink {
    fn write(&self, record: &OutputRecord) -> SinkResult<()> {
        self.guard().push(record.clone());
        Ok(())
    }

    fn flush(&self) -> SinkResult<()> {
        Ok(())
    }
}
