use std::collections::HashMap;
use std::sync::Mutex;

use tokio::sync::watch;

use txconf_types::{PendingRecord, TxId};

use crate::lock;

struct Slot {
    record: PendingRecord,
    revision: u64,
}

struct Inner {
    slots: HashMap<TxId, Slot>,
    next_revision: u64,
}

/// Snapshot of one `Pending` entry, taken without holding the table lock
/// afterwards.
///
/// The `revision` identifies the exact record that was snapshotted: if the
/// event listener overwrites the entry in the meantime, operations keyed by
/// the stale revision are ignored.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct PendingEntry {
    pub tx_id: TxId,
    pub block_ref: u64,
    pub revision: u64,
    pub stalled: bool,
}

/// Map from transaction id to in-flight correlation record.
///
/// Listeners insert (last writer wins); the correlator resolves and removes;
/// the shutdown drain removes everything. A record leaves the table exactly
/// once, and the caller that removed it is the one that flushes it.
pub struct PendingTable {
    inner: Mutex<Inner>,
    changes: watch::Sender<u64>,
}

impl PendingTable {
    pub fn new() -> Self {
        let (changes, _) = watch::channel(0);
        Self {
            inner: Mutex::new(Inner {
                slots: HashMap::new(),
                next_revision: 0,
            }),
            changes,
        }
    }

    /// Insert a record keyed by its transaction id.
    ///
    /// Returns the record it replaced, if one existed.
    pub fn insert(&self, record: PendingRecord) -> Option<PendingRecord> {
        let previous = {
            let mut inner = lock(&self.inner);
            let revision = inner.next_revision;
            inner.next_revision += 1;
            inner
                .slots
                .insert(record.tx_id().clone(), Slot { record, revision })
                .map(|slot| slot.record)
        };
        self.changes.send_modify(|generation| *generation += 1);
        previous
    }

    /// Snapshot every entry that is still `Pending`.
    pub fn pending_entries(&self) -> Vec<PendingEntry> {
        lock(&self.inner)
            .slots
            .iter()
            .filter(|(_, slot)| slot.record.is_pending())
            .map(|(tx_id, slot)| PendingEntry {
                tx_id: tx_id.clone(),
                block_ref: slot.record.block_ref,
                revision: slot.revision,
                stalled: slot.record.stalled,
            })
            .collect()
    }

    /// Apply a status transition to the entry identified by `tx_id` and
    /// `revision`, removing and returning the record if it became terminal.
    ///
    /// `transition` returns whether it changed the record. Nothing happens if
    /// the entry is gone or has been overwritten since it was snapshotted.
    pub fn resolve<F>(&self, tx_id: &TxId, revision: u64, transition: F) -> Option<PendingRecord>
    where
        F: FnOnce(&mut PendingRecord) -> bool,
    {
        let mut inner = lock(&self.inner);
        let slot = inner.slots.get_mut(tx_id)?;
        if slot.revision != revision || !slot.record.is_pending() {
            return None;
        }
        if !transition(&mut slot.record) || !slot.record.status.is_terminal() {
            return None;
        }
        inner.slots.remove(tx_id).map(|slot| slot.record)
    }

    /// Flag a still-pending entry as stalled.
    ///
    /// Returns `true` only the first time the entry is flagged.
    pub fn mark_stalled(&self, tx_id: &TxId, revision: u64) -> bool {
        let mut inner = lock(&self.inner);
        match inner.slots.get_mut(tx_id) {
            Some(slot) if slot.revision == revision && !slot.record.stalled => {
                slot.record.stalled = true;
                true
            }
            _ => false,
        }
    }

    /// Remove and return every entry, whatever its status.
    pub fn drain(&self) -> Vec<PendingRecord> {
        let drained: Vec<PendingRecord> = lock(&self.inner)
            .slots
            .drain()
            .map(|(_, slot)| slot.record)
            .collect();
        if !drained.is_empty() {
            self.changes.send_modify(|generation| *generation += 1);
        }
        drained
    }

    /// Clone the record for `tx_id`, if present.
    pub fn get(&self, tx_id: &TxId) -> Option<PendingRecord> {
        lock(&self.inner).slots.get(tx_id).map(|slot| slot.record.clone())
    }

    pub fn len(&self) -> usize {
        lock(&self.inner).slots.len()
    }

    pub fn is_empty(&self) -> bool {
        lock(&self.inner).slots.is_empty()
    }

    /// Receive a notification after every insertion.
    pub fn subscribe(&self) -> watch::Receiver<u64> {
        self.changes.subscribe()
    }
}

impl Default for PendingTable {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for PendingTable {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PendingTable").field("len", &self.len()).finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use txconf_types::ConfirmStatus;

    fn record(tx: &str, block: u64) -> PendingRecord {
        PendingRecord::new(TxId::new(tx), "asset", block, Vec::new())
    }

    #[test]
    fn insert_and_snapshot() {
        let table = PendingTable::new();
        assert!(table.insert(record("a", 1)).is_none());
        assert!(table.insert(record("b", 2)).is_none());
        let mut entries = table.pending_entries();
        entries.sort_by(|x, y| x.tx_id.cmp(&y.tx_id));
        assert_eq!(entries.len(), 2);
        assert_eq!(entries[0].block_ref, 1);
        assert_eq!(entries[1].tx_id, TxId::new("b"));
    }

    #[test]
    fn same_tx_id_overwrites() {
        let table = PendingTable::new();
        table.insert(record("a", 1));
        let previous = table.insert(record("a", 2)).unwrap();
        assert_eq!(previous.block_ref, 1);
        assert_eq!(table.len(), 1);
        assert_eq!(table.get(&TxId::new("a")).unwrap().block_ref, 2);
    }

    #[test]
    fn resolve_removes_terminal_record() {
        let table = PendingTable::new();
        table.insert(record("a", 1));
        let entry = table.pending_entries().pop().unwrap();
        let done = table
            .resolve(&entry.tx_id, entry.revision, |r| r.confirm("{}".into()))
            .unwrap();
        assert_eq!(done.status, ConfirmStatus::Confirmed);
        assert!(table.is_empty());

        // A second resolution of the same entry finds nothing.
        assert!(table
            .resolve(&entry.tx_id, entry.revision, |r| r.confirm("{}".into()))
            .is_none());
    }

    #[test]
    fn resolve_ignores_stale_revision() {
        let table = PendingTable::new();
        table.insert(record("a", 1));
        let stale = table.pending_entries().pop().unwrap();
        table.insert(record("a", 2));
        assert!(table
            .resolve(&stale.tx_id, stale.revision, |r| r.confirm("{}".into()))
            .is_none());
        assert_eq!(table.len(), 1);
        assert!(table.get(&stale.tx_id).unwrap().is_pending());
    }

    #[test]
    fn non_transition_keeps_record() {
        let table = PendingTable::new();
        table.insert(record("a", 1));
        let entry = table.pending_entries().pop().unwrap();
        assert!(table.resolve(&entry.tx_id, entry.revision, |_| false).is_none());
        assert_eq!(table.len(), 1);
    }

    #[test]
    fn mark_stalled_once() {
        let table = PendingTable::new();
        table.insert(record("a", 1));
        let entry = table.pending_entries().pop().unwrap();
        assert!(table.mark_stalled(&entry.tx_id, entry.revision));
        assert!(!table.mark_stalled(&entry.tx_id, entry.revision));
        assert!(table.pending_entries()[0].stalled);
    }

    #[test]
    fn drain_empties_table_exactly_once() {
        let table = PendingTable::new();
        table.insert(record("a", 1));
        table.insert(record("b", 2));
        assert_eq!(table.drain().len(), 2);
        assert!(table.drain().is_empty());
        assert!(table.is_empty());
    }

    #[tokio::test]
    async fn insert_notifies_subscribers() {
        let table = PendingTable::new();
        let mut rx = table.subscribe();
        table.insert(record("a", 1));
        assert!(rx.has_changed().unwrap());
        rx.changed().await.unwrap();
    }
}
