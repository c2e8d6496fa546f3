//! Output sinks for txconf.
//!
//! Every terminal correlation record, and every record still pending at
//! shutdown, is written exactly once to a [`RecordSink`] as one line.
//!
//! - [`FileSink`] -- append-only file, never truncated, optionally renamed
//!   with a capture-time prefix when closed
//! - [`MemorySink`] -- collects records in memory for tests and embedding

pub mod error;
pub mod file;
pub mod memory;

pub use error::{SinkError, SinkResult};
pub use file::FileSink;
pub use memory::MemorySink;

use std::path::PathBuf;

use chrono::{DateTime, Utc};
use txconf_types::OutputRecord;

/// Append-only writer of output records.
pub trait RecordSink: Send + Sync {
    /// Append one record.
    fn write(&self, record: &OutputRecord) -> SinkResult<()>;

    /// Flush buffered output to the underlying medium.
    fn flush(&self) -> SinkResult<()>;

    /// Final step of shutdown: flush, close, and, when `rotate_at` is set,
    /// rename the output with that capture time. Returns the rotated
    /// location, if the sink was rotated.
    ///
    /// The default implementation only flushes.
    fn finish(&self, _rotate_at: Option<DateTime<Utc>>) -> SinkResult<Option<PathBuf>> {
        self.flush()?;
        Ok(None)
    }
}
