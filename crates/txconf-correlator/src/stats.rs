use std::sync::atomic::{AtomicU64, Ordering};

use serde::Serialize;

/// Counters shared by all workers. Recoverable errors surface only here.
#[derive(Debug, Default)]
pub struct CorrelatorStats {
    pub blocks_received: AtomicU64,
    pub block_errors: AtomicU64,
    pub events_received: AtomicU64,
    pub event_errors: AtomicU64,
    pub overwritten: AtomicU64,
    pub confirmed: AtomicU64,
    pub error_txid: AtomicU64,
    pub error_header: AtomicU64,
    pub stalled: AtomicU64,
    pub evicted: AtomicU64,
    pub flushed_on_shutdown: AtomicU64,
}

/// Point-in-time copy of [`CorrelatorStats`] plus table sizes.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize)]
pub struct StatsSnapshot {
    pub blocks_received: u64,
    pub block_errors: u64,
    pub events_received: u64,
    pub event_errors: u64,
    pub overwritten: u64,
    pub confirmed: u64,
    pub error_txid: u64,
    pub error_header: u64,
    pub stalled: u64,
    pub evicted: u64,
    pub flushed_on_shutdown: u64,
    pub cached_headers: usize,
    pub pending_records: usize,
}

impl CorrelatorStats {
    pub fn incr(counter: &AtomicU64) {
        counter.fetch_add(1, Ordering::Relaxed);
    }

    pub fn add(counter: &AtomicU64, n: u64) {
        counter.fetch_add(n, Ordering::Relaxed);
    }

    /// Copy the counters; table sizes are supplied by the caller.
    pub fn snapshot(&self, cached_headers: usize, pending_records: usize) -> StatsSnapshot {
        let load = |c: &AtomicU64| c.load(Ordering::Relaxed);
        StatsSnapshot {
            blocks_received: load(&self.blocks_received),
            block_errors: load(&self.block_errors),
            events_received: load(&self.events_received),
            event_errors: load(&self.event_errors),
            overwritten: load(&self.overwritten),
            confirmed: load(&self.confirmed),
            error_txid: load(&self.error_txid),
            error_header: load(&self.error_header),
            stalled: load(&self.stalled),
            evicted: load(&self.evicted),
            flushed_on_shutdown: load(&self.flushed_on_shutdown),
            cached_headers,
            pending_records,
        }
    }
}
