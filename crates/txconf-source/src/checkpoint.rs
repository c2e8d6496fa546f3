use std::fs;
use std::path::{Path, PathBuf};
use std::sync::{Mutex, MutexGuard, PoisonError};

use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::error::{SourceError, SourceResult};

/// Position of the last acknowledged chaincode event.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChaincodePosition {
    /// Block the event was committed in.
    pub block: u64,
    /// Transaction id of the event within that block.
    pub tx_id: String,
}

/// Stream-consumption progress for both subscriptions.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Checkpoint {
    /// Highest block number acknowledged on the block stream.
    pub block: Option<u64>,
    /// Last acknowledged position on the chaincode stream.
    pub chaincode: Option<ChaincodePosition>,
}

impl Checkpoint {
    /// Where the block subscription resumes: after the last block that every
    /// chaincode event still to be delivered can rely on.
    ///
    /// Chaincode delivery resumes inside the checkpointed block, so blocks
    /// restart at that block. With no chaincode progress every block is
    /// replayed.
    pub fn block_resume_point(&self) -> Option<u64> {
        let chaincode = self.chaincode.as_ref()?;
        let before_chaincode = chaincode.block.checked_sub(1)?;
        Some(self.block.map_or(before_chaincode, |b| b.min(before_chaincode)))
    }

    fn record_block(&mut self, number: u64) {
        self.block = Some(self.block.map_or(number, |current| current.max(number)));
    }

    fn record_chaincode(&mut self, block: u64, tx_id: &str) {
        self.chaincode = Some(ChaincodePosition {
            block,
            tx_id: tx_id.to_string(),
        });
    }
}

/// Checkpoint acknowledgement for the two event streams.
///
/// Listeners acknowledge every event they consume, including events dropped
/// for extraction failure, since the ledger will not resend them. Whether
/// progress survives a restart depends on the implementation.
pub trait Checkpointer: Send + Sync {
    /// Acknowledge a consumed block event.
    fn record_block(&self, number: u64);

    /// Acknowledge a consumed chaincode event.
    fn record_chaincode(&self, block: u64, tx_id: &str);

    /// The current in-memory progress.
    fn current(&self) -> Checkpoint;

    /// Persist the current progress. A no-op for volatile checkpointers.
    fn save(&self) -> SourceResult<()>;
}

fn lock(checkpoint: &Mutex<Checkpoint>) -> MutexGuard<'_, Checkpoint> {
    checkpoint.lock().unwrap_or_else(PoisonError::into_inner)
}

/// Volatile checkpointer: progress is lost when the process exits.
#[derive(Debug, Default)]
pub struct InMemoryCheckpointer {
    checkpoint: Mutex<Checkpoint>,
}

impl InMemoryCheckpointer {
    pub fn new() -> Self {
        Self::default()
    }
}

impl Checkpointer for InMemoryCheckpointer {
    fn record_block(&self, number: u64) {
        lock(&self.checkpoint).record_block(number);
    }

    fn record_chaincode(&self, block: u64, tx_id: &str) {
        lock(&self.checkpoint).record_chaincode(block, tx_id);
    }

    fn current(&self) -> Checkpoint {
        lock(&self.checkpoint).clone()
    }

    fn save(&self) -> SourceResult<()> {
        Ok(())
    }
}

/// Checkpointer persisted as a JSON file.
///
/// Loaded on startup (missing file means no progress yet) and written by
/// [`Checkpointer::save`], which replaces the file via a rename so a crash
/// never leaves a torn checkpoint behind.
#[derive(Debug)]
pub struct FileCheckpointer {
    path: PathBuf,
    checkpoint: Mutex<Checkpoint>,
}

impl FileCheckpointer {
    /// Open the checkpoint file at `path`, loading any saved progress.
    pub fn open(path: &Path) -> SourceResult<Self> {
        let checkpoint = match fs::read(path) {
            Ok(bytes) => serde_json::from_slice(&bytes).map_err(|e| SourceError::Checkpoint {
                path: path.to_path_buf(),
                reason: e.to_string(),
            })?,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Checkpoint::default(),
            Err(e) => return Err(e.into()),
        };

        info!(path = %path.display(), ?checkpoint, "checkpoint loaded");
        Ok(Self {
            path: path.to_path_buf(),
            checkpoint: Mutex::new(checkpoint),
        })
    }

    /// Path of the checkpoint file.
    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl Checkpointer for FileCheckpointer {
    fn record_block(&self, number: u64) {
        lock(&self.checkpoint).record_block(number);
    }

    fn record_chaincode(&self, block: u64, tx_id: &str) {
        lock(&self.checkpoint).record_chaincode(block, tx_id);
    }

    fn current(&self) -> Checkpoint {
        lock(&self.checkpoint).clone()
    }

    fn save(&self) -> SourceResult<()> {
        let checkpoint = self.current();
        let bytes = serde_json::to_vec_pretty(&checkpoint).map_err(|e| SourceError::Checkpoint {
            path: self.path.clone(),
            reason: e.to_string(),
        })?;

        if let Some(parent) = self.path.parent() {
            if !parent.as_os_str().is_empty() {
                fs::create_dir_all(parent)?;
            }
        }
        let tmp = self.path.with_extension("tmp");
        fs::write(&tmp, bytes)?;
        fs::rename(&tmp, &self.path)?;

        debug!(path = %self.path.display(), ?checkpoint, "checkpoint saved");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn block_checkpoint_only_moves_forward() {
        let cp = InMemoryCheckpointer::new();
        assert_eq!(cp.current(), Checkpoint::default());
        cp.record_block(10);
        cp.record_block(8);
        assert_eq!(cp.current().block, Some(10));
    }

    #[test]
    fn block_resume_covers_undelivered_chaincode_events() {
        let cp = InMemoryCheckpointer::new();
        assert_eq!(cp.current().block_resume_point(), None);

        cp.record_block(4);
        assert_eq!(cp.current().block_resume_point(), None);

        cp.record_chaincode(3, "aa");
        assert_eq!(cp.current().block_resume_point(), Some(2));

        cp.record_chaincode(9, "bb");
        assert_eq!(cp.current().block_resume_point(), Some(4));

        cp.record_chaincode(0, "cc");
        assert_eq!(cp.current().block_resume_point(), None);
    }

    #[test]
    fn chaincode_checkpoint_tracks_last_event() {
        let cp = InMemoryCheckpointer::new();
        cp.record_chaincode(5, "aa");
        cp.record_chaincode(6, "bb");
        assert_eq!(
            cp.current().chaincode,
            Some(ChaincodePosition {
                block: 6,
                tx_id: "bb".into()
            })
        );
        cp.save().unwrap();
    }

    #[test]
    fn file_checkpoint_survives_reopen() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("state").join("checkpoint.json");

        let cp = FileCheckpointer::open(&path).unwrap();
        assert_eq!(cp.current(), Checkpoint::default());
        cp.record_block(42);
        cp.record_chaincode(41, "cafe");
        cp.save().unwrap();

        let reopened = FileCheckpointer::open(&path).unwrap();
        assert_eq!(reopened.current().block, Some(42));
        assert_eq!(reopened.current().chaincode.unwrap().tx_id, "cafe");
        assert!(!path.with_extension("tmp").exists());
    }

    #[test]
    fn corrupt_checkpoint_file_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("checkpoint.json");
        fs::write(&path, b"{not json").unwrap();
        let err = FileCheckpointer::open(&path).unwrap_err();
        assert!(matches!(err, SourceError::Checkpoint { .. }));
    }

    #[test]
    fn unsaved_progress_is_not_persisted() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("checkpoint.json");
        let cp = FileCheckpointer::open(&path).unwrap();
        cp.record_block(1);
        drop(cp);
        assert_eq!(FileCheckpointer::open(&path).unwrap().current().block, None);
    }
}
