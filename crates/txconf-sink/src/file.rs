use std::fs::{self, File, OpenOptions};
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Mutex, MutexGuard, PoisonError};

use chrono::{DateTime, Utc};
use tracing::{debug, info};

use txconf_types::OutputRecord;

use crate::error::{SinkError, SinkResult};
use crate::RecordSink;

/// Timestamp format of the capture-time prefix added on rotation.
const ROTATE_PREFIX_FORMAT: &str = "%Y%m%dT%H%M%SZ";

/// Append-only output file.
///
/// The file is opened in append mode (created if absent, never truncated).
/// Each record is written as one line and flushed immediately, so a record
/// that [`RecordSink::write`] accepted survives a later crash.
pub struct FileSink {
    path: PathBuf,
    writer: Mutex<Option<BufWriter<File>>>,
    lines: AtomicU64,
}

impl FileSink {
    /// Open (or create) the output file at `path` for appending.
    pub fn open(path: &Path) -> SinkResult<Self> {
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                fs::create_dir_all(parent).map_err(|source| SinkError::Open {
                    path: path.to_path_buf(),
                    source,
                })?;
            }
        }

        let file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(path)
            .map_err(|source| SinkError::Open {
                path: path.to_path_buf(),
                source,
            })?;

        info!(path = %path.display(), "output opened");
        Ok(Self {
            path: path.to_path_buf(),
            writer: Mutex::new(Some(BufWriter::new(file))),
            lines: AtomicU64::new(0),
        })
    }

    /// Path the sink is writing to.
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Number of lines written since the sink was opened.
    pub fn lines_written(&self) -> u64 {
        self.lines.load(Ordering::Relaxed)
    }

    /// Flush and close the file. Later writes fail with [`SinkError::Closed`].
    pub fn close(&self) -> SinkResult<()> {
        if let Some(mut writer) = self.writer_guard().take() {
            writer.flush()?;
            writer.get_ref().sync_all()?;
            debug!(path = %self.path.display(), lines = self.lines_written(), "output closed");
        }
        Ok(())
    }

    /// Close the file and rename it with a capture-time prefix, e.g.
    /// `confirmations.log` becomes `20261018T120000Z_confirmations.log` in
    /// the same directory. Returns the new path.
    pub fn close_and_rotate(&self, captured_at: DateTime<Utc>) -> SinkResult<PathBuf> {
        self.close()?;
        let rotated = rotated_path(&self.path, captured_at);
        fs::rename(&self.path, &rotated)?;
        info!(from = %self.path.display(), to = %rotated.display(), "output rotated");
        Ok(rotated)
    }

    fn writer_guard(&self) -> MutexGuard<'_, Option<BufWriter<File>>> {
        self.writer.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

/// Compute the rotated file name for `path` captured at `captured_at`.
pub fn rotated_path(path: &Path, captured_at: DateTime<Utc>) -> PathBuf {
    let prefix = captured_at.format(ROTATE_PREFIX_FORMAT);
    let name = path
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default();
    path.with_file_name(format!("{prefix}_{name}"))
}

impl RecordSink for FileSink {
    fn write(&self, record: &OutputRecord) -> SinkResult<()> {
        let mut guard = self.writer_guard();
        let writer = guard
            .as_mut()
            .ok_or_else(|| SinkError::Closed(self.path.clone()))?;
        writeln!(writer, "{}", record.to_line())?;
        writer.flush()?;
        self.lines.fetch_add(1, Ordering::Relaxed);
        Ok(())
    }

    fn flush(&self) -> SinkResult<()> {
        if let Some(writer) = self.writer_guard().as_mut() {
            writer.flush()?;
        }
        Ok(())
    }

    fn finish(&self, rotate_at: Option<DateTime<Utc>>) -> SinkResult<Option<PathBuf>> {
        match rotate_at {
            Some(at) => self.close_and_rotate(at).map(Some),
            None => self.close().map(|()| None),
        }
    }
}

impl std::fmt::Debug for FileSink {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FileSink")
            .field("path", &self.path)
            .field("lines", &self.lines_written())
            .finish()
    }
}
